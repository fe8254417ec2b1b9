use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;
use std::io::{IsTerminal, Read};
use std::path::Path;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use voxread::app::{ReadOptions, run_read_command};
use voxread::cli::{Cli, Commands};
use voxread::config::Config;
use voxread::text::TextChunker;
use voxread::tts::list_voices;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);
    tracing::info!("voxread {}", voxread::version_string());

    match cli.command {
        Commands::Read {
            file,
            mode,
            voice,
            speed,
            output,
            device,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let text = read_input(file.as_deref())?;
            run_read_command(
                config,
                text,
                ReadOptions {
                    mode,
                    voice,
                    speed,
                    output,
                    device,
                    quiet: cli.quiet,
                },
            )
            .await?;
        }
        Commands::Voices { language } => {
            print_voices(language.as_deref());
        }
        Commands::Chunk { file, max_chars } => {
            let text = read_input(file.as_deref())?;
            print_chunks(&text, max_chars);
        }
        #[cfg(feature = "cpal-audio")]
        Commands::Devices => {
            let devices = voxread::audio::cpal_output::list_output_devices()?;
            if devices.is_empty() {
                eprintln!("No audio output devices found");
                std::process::exit(1);
            }
            println!("Available audio output devices:");
            for (idx, device) in devices.iter().enumerate() {
                println!("  [{}] {}", idx, device);
            }
        }
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` wins over the `-v` count.
fn setup_tracing(verbose: u8) {
    use tracing_subscriber::fmt;

    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("voxread={}", level)));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose >= 2),
        )
        .with(filter)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/voxread/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => {
            let default_path = Config::default_path()?;
            Config::load_or_default(&default_path)?
        }
    };

    let config = config.with_env_overrides()?;
    config.validate()?;
    Ok(config)
}

/// Text from `file`, or from stdin when no file is given.
fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e)),
        None => {
            if std::io::stdin().is_terminal() {
                eprintln!("{}", "Reading text from stdin (Ctrl-D to finish)...".dimmed());
            }
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

fn print_voices(language: Option<&str>) {
    let voices: Vec<_> = list_voices()
        .iter()
        .filter(|v| language.is_none_or(|lang| v.language.eq_ignore_ascii_case(lang)))
        .collect();

    if voices.is_empty() {
        eprintln!("No voices for that language");
        return;
    }

    println!("Available voices:");
    for voice in voices {
        println!(
            "  {:<12} {:<12} {:<6} {:<7} {}",
            voice.id.bold(),
            voice.name,
            voice.language,
            voice.gender.to_string(),
            voice.quality.dimmed()
        );
    }
}

fn print_chunks(text: &str, max_chars: usize) {
    let chunks = TextChunker::with_max_chars(max_chars).chunk(text);
    for chunk in &chunks {
        println!(
            "{} {}",
            format!("[{}]", chunk.sequence).cyan(),
            chunk.content
        );
    }
    eprintln!(
        "{}",
        format!("{} chunks, max {} chars", chunks.len(), max_chars).dimmed()
    );
}
