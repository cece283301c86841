use crate::audio::{MediaPlayer, NullPlayer, PlayerWatch, RodioPlayer};
use crate::cache::LevelCache;
use crate::config::{self, JsonStateFile};
use crate::session::Session;
use crate::waveform::LevelPipeline;
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::stdout;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const SEEK_STEP_MS: i64 = 5_000;

#[derive(Debug, Clone, Default)]
pub struct AppStartupOptions {
    pub config_dir: Option<PathBuf>,
    pub playlist: Option<String>,
    pub null_audio: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyOutcome {
    Continue,
    EnterCommand,
    Quit,
}

pub fn run_with_startup(options: AppStartupOptions, config_root: &Path) -> Result<()> {
    let port = JsonStateFile::in_dir(config_root);
    info!(path = %port.path().display(), "using state file");
    let pipeline = LevelPipeline::with_symphonia(Arc::new(LevelCache::new()));
    let mut session = Session::open(Box::new(port), pipeline)?;

    let mut player: Box<dyn MediaPlayer> = if options.null_audio {
        Box::new(NullPlayer::new())
    } else {
        match RodioPlayer::new() {
            Ok(player) => Box::new(player),
            Err(err) => {
                warn!("audio output unavailable, using null player: {err:#}");
                Box::new(NullPlayer::new())
            }
        }
    };
    session.apply_volume(&mut *player);

    if let Some(name) = options.playlist.or_else(|| session.startup_playlist()) {
        let _ = session.open_playlist(&name, &mut *player);
    }

    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(out);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut watch = PlayerWatch::new();
    let mut command_mode = false;
    let mut command_buffer = String::new();
    let mut last_tick = Instant::now();

    let result: Result<()> = loop {
        for player_event in watch.poll(&*player) {
            session.handle_player_event(player_event, &mut *player);
        }

        if session.dirty || last_tick.elapsed() > Duration::from_millis(100) {
            terminal.draw(|frame| {
                crate::ui::draw(frame, &session, &*player, &command_buffer, command_mode)
            })?;
            session.dirty = false;
            last_tick = Instant::now();
        }

        if !event::poll(Duration::from_millis(20))? {
            continue;
        }

        let Event::Key(key) = event::read()? else {
            continue;
        };

        if key.kind != KeyEventKind::Press {
            continue;
        }

        if command_mode {
            match key.code {
                KeyCode::Esc => {
                    command_mode = false;
                    command_buffer.clear();
                    session.dirty = true;
                }
                KeyCode::Enter => {
                    run_command(&mut session, &mut *player, &command_buffer);
                    command_mode = false;
                    command_buffer.clear();
                }
                KeyCode::Backspace => {
                    command_buffer.pop();
                    session.dirty = true;
                }
                KeyCode::Char(ch) => {
                    command_buffer.push(ch);
                    session.dirty = true;
                }
                _ => {}
            }
            continue;
        }

        match handle_key(&mut session, &mut *player, key) {
            KeyOutcome::Continue => {}
            KeyOutcome::EnterCommand => {
                command_mode = true;
                session.dirty = true;
            }
            KeyOutcome::Quit => break Ok(()),
        }
    };

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    let save_result = session.save();
    result?;
    save_result?;
    Ok(())
}

pub fn default_config_root(options: &AppStartupOptions) -> Result<PathBuf> {
    match &options.config_dir {
        Some(dir) => Ok(dir.clone()),
        None => config::config_root(),
    }
}

fn handle_key(session: &mut Session, player: &mut dyn MediaPlayer, key: KeyEvent) -> KeyOutcome {
    let control = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') if control => return KeyOutcome::Quit,
        KeyCode::Char('s') if control => {
            if let Err(err) = session.save() {
                session.status = format!("save error: {err:#}");
                session.dirty = true;
            }
        }
        KeyCode::Char('q') => return KeyOutcome::Quit,
        KeyCode::Char(':') => return KeyOutcome::EnterCommand,
        KeyCode::Down => session.select_next(),
        KeyCode::Up => session.select_prev(),
        KeyCode::Enter => {
            let _ = session.activate_selected(player);
        }
        KeyCode::Left => session.seek_by(-SEEK_STEP_MS, player),
        KeyCode::Right => session.seek_by(SEEK_STEP_MS, player),
        KeyCode::Char(' ') => session.play_toggle(player),
        KeyCode::Char('n') => session.next_song(player),
        KeyCode::Char('p') => session.previous_song(player),
        KeyCode::Char('s') => session.stop(player),
        KeyCode::Char('r') => {
            session.toggle_repeat();
        }
        KeyCode::Char('+') | KeyCode::Char('=') => session.volume_up(player),
        KeyCode::Char('-') => session.volume_down(player),
        KeyCode::Delete | KeyCode::Char('x') => {
            let _ = session.remove_selected();
        }
        KeyCode::Char('K') => {
            let _ = session.move_selected_up();
        }
        KeyCode::Char('J') => {
            let _ = session.move_selected_down();
        }
        _ => {}
    }
    KeyOutcome::Continue
}

fn run_command(session: &mut Session, player: &mut dyn MediaPlayer, raw: &str) {
    let input = raw.trim();
    if input.is_empty() {
        session.status = String::from("No command");
        session.dirty = true;
        return;
    }

    let mut command_split = input.splitn(2, char::is_whitespace);
    let command = command_split.next().unwrap_or_default();
    let rest = command_split.next().unwrap_or("").trim();

    match command {
        "help" => {
            session.status = String::from(
                "Commands: add <path> | new <name> | open <name> | close | delete | save | note <text> | autoload on|off | autoplay on|off | list",
            );
            session.dirty = true;
        }
        "add" => {
            if rest.is_empty() {
                session.status = String::from("Usage: add <path>");
                session.dirty = true;
            } else {
                session.add_path(Path::new(rest));
            }
        }
        "new" => {
            let _ = session.new_playlist(rest, player);
        }
        "open" => {
            if rest.is_empty() {
                session.status = String::from("Usage: open <name>");
                session.dirty = true;
            } else {
                let _ = session.open_playlist(rest, player);
            }
        }
        "close" => session.close_playlist(player),
        "delete" => {
            let _ = session.delete_playlist(player);
        }
        "save" => {
            if let Err(err) = session.save() {
                session.status = format!("save error: {err:#}");
                session.dirty = true;
            }
        }
        "note" => {
            let row = session.selected;
            let _ = session.set_note(row, rest);
        }
        "autoload" | "autoplay" => {
            let enabled = match rest {
                "on" => true,
                "off" => false,
                _ => {
                    session.status = format!("Usage: {command} on|off");
                    session.dirty = true;
                    return;
                }
            };
            if command == "autoload" {
                session.set_auto_load(enabled);
            } else {
                session.set_auto_play(enabled);
            }
        }
        "list" => {
            let names = session.playlist_names();
            session.status = if names.is_empty() {
                String::from("No playlists")
            } else {
                format!("Playlists: {}", names.join(", "))
            };
            session.dirty = true;
        }
        _ => {
            session.status = String::from("Unknown command. Use :help");
            session.dirty = true;
        }
    }
}
