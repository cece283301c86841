use crate::audio::MediaPlayer;
use crate::session::Session;
use crate::waveform::MIN_LEVEL_DB;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap};

const APP_TITLE_WITH_VERSION: &str = concat!("Vaudio v", env!("CARGO_PKG_VERSION"), "  ");

#[derive(Clone, Copy)]
struct Palette {
    bg: Color,
    panel_bg: Color,
    panel_alt_bg: Color,
    border: Color,
    text: Color,
    muted: Color,
    accent: Color,
    alert: Color,
    current_row: Color,
    selected_bg: Color,
}

const PALETTE: Palette = Palette {
    bg: Color::Rgb(10, 15, 24),
    panel_bg: Color::Rgb(19, 29, 43),
    panel_alt_bg: Color::Rgb(24, 38, 58),
    border: Color::Rgb(69, 121, 176),
    text: Color::Rgb(214, 228, 248),
    muted: Color::Rgb(149, 173, 204),
    accent: Color::Rgb(100, 203, 184),
    alert: Color::Rgb(249, 174, 88),
    current_row: Color::Rgb(225, 120, 0),
    selected_bg: Color::Rgb(34, 55, 82),
};

pub fn draw(
    frame: &mut Frame,
    session: &Session,
    player: &dyn MediaPlayer,
    command_buffer: &str,
    command_mode: bool,
) {
    let colors = PALETTE;
    frame.render_widget(
        Block::default().style(Style::default().bg(colors.bg)),
        frame.area(),
    );

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(4),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let store = session.store();
    let playlist_label = if store.is_buffer() {
        String::from("Buffer mode")
    } else {
        format!("Playlist {}", store.name())
    };
    let flag = |label: &'static str, on: bool| {
        Span::styled(
            format!("{label} {}  ", if on { "@" } else { "-" }),
            Style::default().fg(if on { colors.accent } else { colors.muted }),
        )
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            APP_TITLE_WITH_VERSION,
            Style::default()
                .fg(colors.accent)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("{playlist_label}  "),
            Style::default().fg(colors.text),
        ),
        flag("Repeat", session.cursor().repeat_enabled()),
        flag("Auto play", session.state().auto_play),
        flag("Auto load", session.state().auto_load),
    ]))
    .block(panel_block("Vaudio", colors.panel_bg, colors.text, colors.border));
    frame.render_widget(header, vertical[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(66), Constraint::Percentage(34)])
        .split(vertical[1]);

    let current = (!store.is_empty()).then(|| session.cursor().current_index());
    let rows: Vec<Row> = store
        .entries()
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let style = if Some(index) == current {
                Style::default().fg(colors.current_row)
            } else {
                Style::default().fg(colors.text)
            };
            let name = if entry.note.is_empty() {
                entry.display_name()
            } else {
                format!("{}  ({})", entry.display_name(), entry.note)
            };
            Row::new(vec![Cell::from(format!("{}", index + 1)), Cell::from(name)]).style(style)
        })
        .collect();

    let mut state = TableState::default();
    state.select((!store.is_empty()).then_some(session.selected));

    let table = Table::new(rows, [Constraint::Length(5), Constraint::Min(10)])
        .header(
            Row::new(vec!["N", "Name"]).style(
                Style::default()
                    .fg(colors.muted)
                    .add_modifier(Modifier::BOLD),
            ),
        )
        .block(panel_block(
            &playlist_label,
            colors.panel_bg,
            colors.text,
            colors.border,
        ))
        .row_highlight_style(
            Style::default()
                .bg(colors.selected_bg)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("-> ");
    frame.render_stateful_widget(table, body[0], &mut state);

    let source = session.loaded_source().unwrap_or("-");
    let title = session
        .track_info()
        .map(|info| info.title.as_str())
        .unwrap_or("-");
    let artist = session
        .track_info()
        .and_then(|info| info.artist.as_deref())
        .unwrap_or("-");
    let info_text = vec![
        Line::from(vec![
            Span::styled(
                "Title",
                Style::default()
                    .fg(colors.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("  {title}"), Style::default().fg(colors.text)),
        ]),
        Line::from(Span::styled(
            format!("Artist  {artist}"),
            Style::default().fg(colors.muted),
        )),
        Line::from(Span::styled(
            format!("Source  {source}"),
            Style::default().fg(colors.muted),
        )),
        Line::from(Span::styled(
            format!("Track   {}", track_position(session)),
            Style::default().fg(colors.alert),
        )),
    ];
    let info_block = Paragraph::new(info_text)
        .block(panel_block(
            "Information",
            colors.panel_alt_bg,
            colors.text,
            colors.border,
        ))
        .wrap(Wrap { trim: true });
    frame.render_widget(info_block, body[1]);

    let progress = Paragraph::new(Span::styled(
        progress_line(session, player, 30),
        Style::default().fg(colors.text),
    ))
    .block(panel_block(
        "Progress",
        colors.panel_bg,
        colors.text,
        colors.border,
    ));
    frame.render_widget(progress, vertical[2]);

    let (left, right) = session.meter_levels();
    let meter = Paragraph::new(vec![
        Line::from(Span::styled(
            meter_line("L", left, 40),
            Style::default().fg(colors.accent),
        )),
        Line::from(Span::styled(
            meter_line("R", right, 40),
            Style::default().fg(colors.accent),
        )),
    ])
    .block(panel_block(
        "Levels",
        colors.panel_bg,
        colors.text,
        colors.border,
    ));
    frame.render_widget(meter, vertical[3]);

    let footer_line = if command_mode {
        Line::from(vec![
            Span::styled(":", Style::default().fg(colors.alert)),
            Span::styled(command_buffer, Style::default().fg(colors.text)),
        ])
    } else {
        Line::from(vec![
            Span::styled(
                "Keys: Enter play, n/p next/prev, space pause, s stop, r repeat, x remove, K/J move, : command, q quit",
                Style::default().fg(colors.muted),
            ),
            Span::styled("  |  ", Style::default().fg(colors.muted)),
            Span::styled(session.status.as_str(), Style::default().fg(colors.text)),
        ])
    };
    let footer = Paragraph::new(footer_line).block(panel_block(
        "Message",
        colors.panel_bg,
        colors.text,
        colors.border,
    ));
    frame.render_widget(footer, vertical[4]);
}

fn panel_block(title: &str, bg: Color, text: Color, border: Color) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(text).add_modifier(Modifier::BOLD),
        ))
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(bg))
}

fn track_position(session: &Session) -> String {
    let len = session.store().len();
    if len == 0 {
        return String::from("-/0");
    }
    format!("{}/{len}", session.cursor().current_index() + 1)
}

/// `hh:mm:ss` once an hour is reached, `mm:ss` below that.
pub fn format_position(milliseconds: u64) -> String {
    let total_seconds = milliseconds / 1_000;
    let hours = total_seconds / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

fn progress_bar(ratio: Option<f64>, width: usize) -> String {
    let clamped = ratio.unwrap_or(0.0).clamp(0.0, 1.0);
    let filled = (clamped * width as f64).round() as usize;
    let mut bar = String::with_capacity(width + 2);
    bar.push('[');
    bar.push_str(&"#".repeat(filled));
    bar.push_str(&"-".repeat(width.saturating_sub(filled)));
    bar.push(']');
    bar
}

fn progress_line(session: &Session, player: &dyn MediaPlayer, bar_width: usize) -> String {
    let elapsed = session.position_ms;
    let total = session.duration_ms;
    let ratio = (total > 0).then(|| elapsed as f64 / total as f64);
    let state = match player.current_source() {
        None => "Idle",
        Some(_) if player.is_paused() => "Paused",
        Some(_) => "Playing",
    };

    format!(
        "{} / {} {}  |  {state}  |  Vol {:>3}%",
        format_position(elapsed),
        if total > 0 {
            format_position(total)
        } else {
            String::from("--:--")
        },
        progress_bar(ratio, bar_width),
        session.volume()
    )
}

/// Position of a dB level on a bar, floor at 0 and full scale at 1.
pub fn meter_ratio(level_db: f32) -> f64 {
    f64::from((level_db - MIN_LEVEL_DB) / -MIN_LEVEL_DB).clamp(0.0, 1.0)
}

fn meter_line(label: &str, level_db: f32, width: usize) -> String {
    format!(
        "{label} {} {:>6.1} dB",
        progress_bar(Some(meter_ratio(level_db)), width),
        level_db
    )
}
