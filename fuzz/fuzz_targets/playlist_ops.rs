#![no_main]

use libfuzzer_sys::fuzz_target;
use vaudio::cursor::{AutoAdvance, CursorState, PlaybackCursor};
use vaudio::model::TrackEntry;
use vaudio::playlist::PlaylistStore;
use vaudio::transfer;

fuzz_target!(|data: &[u8]| {
    let Some((split, rest)) = data.split_first() else {
        return;
    };
    let (ops, payload) = rest.split_at((*split as usize).min(rest.len()));

    let mut store = PlaylistStore::new("fuzz");
    store.append(
        (0..4)
            .map(|idx| TrackEntry::new(format!("track_{idx}.mp3")))
            .collect(),
    );
    let mut cursor = PlaybackCursor::new();
    cursor.resync(store.len());

    for pair in ops.chunks(2) {
        let op = pair[0];
        let arg = usize::from(pair.get(1).copied().unwrap_or(0));
        match op % 8 {
            0 => {
                let mut before: Vec<TrackEntry> = store.entries().to_vec();
                let moved = transfer::reorder(&mut store, payload, None, arg);
                if moved.is_ok() && store.len() == before.len() {
                    let mut after = store.entries().to_vec();
                    before.sort_by(|a, b| a.source.cmp(&b.source).then(a.note.cmp(&b.note)));
                    after.sort_by(|a, b| a.source.cmp(&b.source).then(a.note.cmp(&b.note)));
                    assert_eq!(before, after);
                }
            }
            1 => {
                let _ = transfer::copy_into(&mut store, payload, arg);
            }
            2 => {
                let _ = store.remove(arg % 8, usize::from(op >> 4));
            }
            3 => {
                store.insert(arg, vec![TrackEntry::new(format!("extra_{arg}"))]);
            }
            4 => {
                cursor.next(store.len());
            }
            5 => {
                cursor.previous(store.len());
            }
            6 => {
                let _ = cursor.on_end_of_media(
                    store.len(),
                    AutoAdvance {
                        auto_play: op & 0x10 != 0,
                        auto_load: op & 0x20 != 0,
                    },
                );
            }
            _ => {
                if let Ok(encoded) = transfer::encode_rows(&store, &[arg % 8]) {
                    let _ = transfer::reorder(&mut store, &encoded, Some(&[arg % 8]), op as usize);
                }
            }
        }
        cursor.resync(store.len());

        assert_eq!(store.len(), store.mirror().len());
        if let CursorState::Positioned(index) = cursor.state() {
            assert!(index < store.len());
        }
    }
});
