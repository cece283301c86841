//! Drag payload codec and the reorder/copy protocol built on it

use crate::error::{QueueError, Result};
use crate::model::TrackEntry;
use crate::playlist::PlaylistStore;
use tracing::debug;

pub const FIELD_SEPARATOR: char = '\u{1f}';
pub const RECORD_SEPARATOR: char = '\u{1e}';

pub fn encode(entries: &[TrackEntry]) -> Vec<u8> {
    let separator = RECORD_SEPARATOR.to_string();
    entries
        .iter()
        .map(|entry| format!("{}{FIELD_SEPARATOR}{}", entry.source, entry.note))
        .collect::<Vec<_>>()
        .join(separator.as_str())
        .into_bytes()
}

pub fn decode(bytes: &[u8]) -> Result<Vec<TrackEntry>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| QueueError::MalformedPayload(format!("not utf-8: {err}")))?;
    if text.is_empty() {
        return Err(QueueError::MalformedPayload(String::from("empty payload")));
    }

    text.split(RECORD_SEPARATOR)
        .enumerate()
        .map(|(record, raw)| {
            let fields: Vec<&str> = raw.split(FIELD_SEPARATOR).collect();
            match fields.as_slice() {
                [source, note] => Ok(TrackEntry::with_note(*source, *note)),
                _ => Err(QueueError::MalformedPayload(format!(
                    "record {record} has {} fields",
                    fields.len()
                ))),
            }
        })
        .collect()
}

/// Collapses per-cell selection indices of a table with `columns` columns
/// into row indices. A two-column table reports every row twice.
pub fn rows_from_cells(cells: &[usize], columns: usize) -> Vec<usize> {
    let columns = columns.max(1);
    let mut rows: Vec<usize> = cells.iter().step_by(columns).copied().collect();
    rows.sort_unstable();
    rows.dedup();
    rows
}

/// Payload for the selected rows of `store`, in row order.
pub fn encode_rows(store: &PlaylistStore, rows: &[usize]) -> Result<Vec<u8>> {
    let mut rows = rows.to_vec();
    rows.sort_unstable();
    rows.dedup();
    let picked = rows
        .iter()
        .map(|row| {
            store.get(*row).cloned().ok_or(QueueError::IndexOutOfRange {
                index: *row,
                len: store.len(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(encode(&picked))
}

/// Moves a dragged run inside `store`.
///
/// `origin_rows` are the rows the drag started from, when the caller knows
/// them. Without them the run is located by value: it ends at the last entry
/// equal to the payload's last item, and every row of it must hold the
/// matching payload entry. Duplicates resolve to the last match. A payload
/// whose last item is not in the store at all is inserted without removing
/// anything.
///
/// `destination` is read in the index space left after removal and clamped.
/// Every check runs before the first mutation.
pub fn reorder(
    store: &mut PlaylistStore,
    payload: &[u8],
    origin_rows: Option<&[usize]>,
    destination: usize,
) -> Result<usize> {
    let items = decode(payload)?;

    let origin: Vec<usize> = match origin_rows {
        Some(rows) => {
            if rows.len() != items.len() {
                return Err(QueueError::MalformedPayload(format!(
                    "{} origin rows for {} items",
                    rows.len(),
                    items.len()
                )));
            }
            for (row, item) in rows.iter().zip(&items) {
                match store.get(*row) {
                    Some(entry) if entry == item => {}
                    Some(_) => {
                        return Err(QueueError::MalformedPayload(format!(
                            "row {row} does not hold the dragged entry"
                        )));
                    }
                    None => {
                        return Err(QueueError::IndexOutOfRange {
                            index: *row,
                            len: store.len(),
                        });
                    }
                }
            }
            rows.to_vec()
        }
        None => match items.last().and_then(|last| store.rposition(last)) {
            Some(position) => {
                let Some(start) = position.checked_sub(items.len() - 1) else {
                    return Err(QueueError::IndexOutOfRange {
                        index: position,
                        len: store.len(),
                    });
                };
                let run: Vec<usize> = (start..=position).collect();
                for (row, item) in run.iter().zip(&items) {
                    if store.get(*row) != Some(item) {
                        return Err(QueueError::MalformedPayload(format!(
                            "row {row} does not hold the dragged entry"
                        )));
                    }
                }
                run
            }
            None => Vec::new(),
        },
    };

    debug!(
        playlist = store.name(),
        moved = items.len(),
        from = ?origin,
        to = destination,
        "reordering rows"
    );
    store.remove_rows(&origin)?;
    Ok(store.insert(destination, items))
}

/// Drops a payload dragged from another playlist: decode and insert only.
pub fn copy_into(store: &mut PlaylistStore, payload: &[u8], destination: usize) -> Result<usize> {
    let items = decode(payload)?;
    Ok(store.insert(destination, items))
}
