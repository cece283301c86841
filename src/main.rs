use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use vaudio::app::{self, AppStartupOptions};
use vaudio::config;

fn main() -> anyhow::Result<()> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    let root = app::default_config_root(&options)?;
    config::ensure_dir(&root)?;
    init_logging(&root)?;
    app::run_with_startup(options, &root)
}

/// Logs go to a file next to the state; the terminal belongs to the UI.
fn init_logging(root: &std::path::Path) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config::log_path(root))?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vaudio=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn parse_args(args: Vec<String>) -> anyhow::Result<AppStartupOptions> {
    let mut out = AppStartupOptions::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--config" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--config requires a directory");
                };
                if value.trim().is_empty() {
                    anyhow::bail!("--config cannot be empty");
                }
                out.config_dir = Some(PathBuf::from(value.trim()));
            }
            "--playlist" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--playlist requires a name");
                };
                out.playlist = Some(value.clone());
            }
            "--null-audio" => out.null_audio = true,
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument {other}"),
        }
        index += 1;
    }
    Ok(out)
}

fn print_help() {
    println!("Vaudio");
    println!("  --config <dir>     Config directory (default ~/.config/vaudio)");
    println!("  --playlist <name>  Playlist to open at startup");
    println!("  --null-audio       Run without an audio output device");
}
