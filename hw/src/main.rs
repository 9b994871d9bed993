//! hw - windowed binary file editor
//!
//! CLI entry point over the hexwindow library.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info};

use hexwindow::cli::{Cli, Command, OutputFormat, WindowArgs};
use hexwindow::config::Config;
use hexwindow::{HexEditor, printable_representation};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hexwindow")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let log_file = fs::File::create(log_dir.join("hw.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

async fn open_window(config: &Config, file: &Path, window: WindowArgs) -> Result<HexEditor> {
    let mut editor = HexEditor::new(config.editor.clone());
    editor
        .load(file, window.start, window.length)
        .await
        .context(format!("Failed to load {}", file.display()))?;
    editor.wait_loaded().await?;
    Ok(editor)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate()?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Info { file, window } => {
            let editor = open_window(&config, &file, window).await?;
            let info = editor.window_info().await;
            println!("File:   {}", file.display().to_string().cyan());
            println!("  Size:   {}", info.file_size);
            println!("  Window: {}..{}", info.start, info.start + info.len);
            println!("  Length: {}", info.len);
        }
        Command::Dump { file, window, width } => {
            let editor = open_window(&config, &file, window).await?;
            let info = editor.window_info().await;
            let width = width.max(1) as u64;
            let mut offset = 0;
            while offset < info.len {
                let len = width.min(info.len - offset);
                let bytes = editor.read_range(offset, len).await?;
                let hex: Vec<String> = bytes.iter().map(|b| format!("{:02x}", b)).collect();
                println!(
                    "{}  {:<pad$}  {}",
                    format!("{:08x}", info.start + offset).dimmed(),
                    hex.join(" "),
                    printable_representation(&bytes),
                    pad = width as usize * 3 - 1
                );
                offset += len;
            }
        }
        Command::Set {
            file,
            offset,
            value,
            window,
            output,
        } => {
            let editor = open_window(&config, &file, window).await?;
            editor.set_byte(offset, value).await?;
            let written = editor.save(output.as_deref()).await.context("Failed to save")?;
            println!(
                "{} Set byte {} to {:#04x} in {}",
                "✓".green(),
                window.start + offset,
                value,
                written.display().to_string().cyan()
            );
        }
        Command::Diff { left, right, format } => {
            let left_editor = open_window(&config, &left, WindowArgs::default()).await?;
            let right_editor = open_window(&config, &right, WindowArgs::default()).await?;
            let summary = left_editor.diff_summary(&right_editor).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
                OutputFormat::Text => {
                    for record in &summary.records {
                        println!("{:08x}: {:02x}", record.offset, record.new_byte);
                    }
                    if summary.length_mismatch() {
                        println!(
                            "{} lengths differ ({} vs {}), compared first {} bytes",
                            "!".yellow(),
                            summary.left_len,
                            summary.right_len,
                            summary.compared_len()
                        );
                    }
                    println!("{} differing bytes", summary.records.len());
                }
            }
        }
        Command::Find { file, patterns } => {
            let mut config = config;
            if let Some(path) = patterns {
                config.patterns.patterns_file = Some(path);
            }
            if config.patterns.patterns_file.is_none() {
                return Err(eyre::eyre!(
                    "No patterns file given (use --patterns or patterns.patterns-file)"
                ));
            }
            let mut editor = HexEditor::from_config(&config)?;
            editor
                .load(&file, 0, 0)
                .await
                .context(format!("Failed to load {}", file.display()))?;
            editor.wait_loaded().await?;

            let matches = editor.find_patterns().await?;
            if matches.is_empty() {
                println!("No matches found");
            }
            for m in matches {
                println!("{} {} ({} bytes)", format!("{:08x}", m.offset).yellow(), m.name, m.length);
            }
        }
    }

    Ok(())
}
