use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use folio::asset_store::{BinaryAssetStore, FileType};
use folio::config::FolioConfig;
use folio::legacy::{self, LegacyAssetStore, MigrationOutcome};
use folio::pdf_reader::ZoomChange;
use folio::progress::ProgressUpdate;
use folio::session::ReaderSession;
use folio::settings::{FontSize, ReaderSettingsStore, Theme};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{sleep_until, Instant};
use tracing::info;

use crate::cli::{Cli, Command};

pub async fn run(cli: Cli) -> Result<()> {
    let config = FolioConfig::load(cli.config.as_deref(), cli.data_dir.as_deref())?;

    match cli.command {
        Command::Attach {
            book_id,
            file,
            file_type,
        } => attach(&config, &book_id, &file, file_type),
        Command::Detach { book_id } => detach(&config, &book_id),
        Command::List => list(&config),
        Command::Usage => usage(&config),
        Command::Migrate { legacy } => {
            let path = legacy.unwrap_or_else(|| config.legacy_store_path());
            let assets = BinaryAssetStore::from_config(&config)
                .context("Failed to open asset database")?;
            migrate_from(&config, &path, &assets, true)
        }
        Command::Toc { book_id } => toc(&config, &book_id).await,
        Command::Read { book_id } => read(&config, &book_id).await,
        Command::Settings {
            theme,
            font_size,
            font_family,
        } => settings(&config, theme, font_size, font_family),
    }
}

/// Open the asset database, draining the default legacy store into it first
/// if that still holds books.
fn open_assets(config: &FolioConfig) -> Result<BinaryAssetStore> {
    let assets =
        BinaryAssetStore::from_config(config).context("Failed to open asset database")?;
    migrate_from(config, &config.legacy_store_path(), &assets, false)?;
    Ok(assets)
}

fn open_settings(config: &FolioConfig) -> Result<ReaderSettingsStore> {
    ReaderSettingsStore::from_config(config).context("Failed to open reader database")
}

fn migrate_from(
    config: &FolioConfig,
    path: &Path,
    assets: &BinaryAssetStore,
    verbose: bool,
) -> Result<()> {
    let legacy = LegacyAssetStore::new(path, config.legacy_capacity_bytes);
    if legacy.is_empty()? {
        if verbose {
            eprintln!("Nothing to migrate in {}", path.display());
        }
        return Ok(());
    }

    let report = legacy::migrate(&legacy, assets)
        .with_context(|| format!("Failed to migrate legacy store: {}", path.display()))?;
    for entry in &report.entries {
        match &entry.outcome {
            MigrationOutcome::Migrated { size_bytes } => {
                eprintln!("  migrated {} ({})", entry.book_id, format_bytes(*size_bytes))
            }
            MigrationOutcome::Skipped { reason } => {
                eprintln!("  skipped {}: {}", entry.book_id, reason)
            }
        }
    }
    eprintln!(
        "Migrated {} books, {} left in {}",
        report.migrated(),
        report.skipped(),
        path.display()
    );
    Ok(())
}

fn attach(
    config: &FolioConfig,
    book_id: &str,
    file: &Path,
    file_type: Option<FileType>,
) -> Result<()> {
    let file_type = match file_type {
        Some(file_type) => file_type,
        None => guess_file_type(file)?,
    };
    let data =
        fs::read(file).with_context(|| format!("Failed to read book file: {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| book_id.to_string());

    let assets = open_assets(config)?;
    match assets.save(book_id, &file_name, file_type, &data) {
        Ok(summary) => {
            eprintln!(
                "Attached {} as {} ({}, {})",
                file.display(),
                summary.book_id,
                summary.file_type,
                format_bytes(summary.size_bytes)
            );
            Ok(())
        }
        // Not enough room is a warning, not a failure.
        Err(e) if e.is_capacity() => {
            eprintln!("Warning: {} was not attached: {}", file.display(), e);
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to attach {}", file.display())),
    }
}

fn guess_file_type(file: &Path) -> Result<FileType> {
    let extension = file
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    match extension.as_deref() {
        Some("epub") => Ok(FileType::Reflowable),
        Some("pdf") => Ok(FileType::Paged),
        _ => bail!(
            "Cannot tell the format of {}; pass --type reflowable or --type paged",
            file.display()
        ),
    }
}

fn detach(config: &FolioConfig, book_id: &str) -> Result<()> {
    let assets = open_assets(config)?;
    assets.delete(book_id)?;
    open_settings(config)?.clear_positions(book_id)?;
    eprintln!("Detached {}", book_id);
    Ok(())
}

fn list(config: &FolioConfig) -> Result<()> {
    let assets = open_assets(config)?;
    let summaries = assets.list()?;
    if summaries.is_empty() {
        eprintln!("No books stored");
        return Ok(());
    }
    for summary in summaries {
        println!(
            "{:<20} {:<10} {:>10}  {}  {}",
            summary.book_id,
            summary.file_type,
            format_bytes(summary.size_bytes),
            summary.stored_at.format("%Y-%m-%d %H:%M"),
            summary.file_name
        );
    }
    Ok(())
}

fn usage(config: &FolioConfig) -> Result<()> {
    let assets = open_assets(config)?;
    let used = assets.storage_used()?;
    let count = assets.list()?.len();
    match assets.limits().quota_bytes {
        Some(quota) => println!(
            "{} books, {} of {} used",
            count,
            format_bytes(used),
            format_bytes(quota)
        ),
        None => println!("{} books, {} used", count, format_bytes(used)),
    }
    Ok(())
}

fn settings(
    config: &FolioConfig,
    theme: Option<Theme>,
    font_size: Option<u8>,
    font_family: Option<String>,
) -> Result<()> {
    let store = open_settings(config)?;
    let mut settings = store.load_settings()?;
    let changed = theme.is_some() || font_size.is_some() || font_family.is_some();

    if let Some(theme) = theme {
        settings.theme = theme;
    }
    if let Some(percent) = font_size {
        settings.font_size = FontSize::new(percent);
    }
    if let Some(family) = font_family {
        settings.font_family = family;
    }
    if changed {
        store.save_settings(&settings)?;
    }

    println!("theme:       {}", settings.theme);
    println!("font size:   {}%", settings.font_size.percent());
    println!("font family: {}", settings.font_family);
    Ok(())
}

fn new_session(config: &FolioConfig) -> Result<ReaderSession> {
    let assets = Arc::new(open_assets(config)?);
    let settings = Arc::new(open_settings(config)?);
    let sink = |book_id: &str, update: ProgressUpdate| {
        info!(
            book_id,
            current = update.current_unit,
            total = update.total_units,
            percentage = update.percentage,
            "reading progress"
        );
    };
    Ok(ReaderSession::new(assets, settings, config, Box::new(sink))?)
}

async fn toc(config: &FolioConfig, book_id: &str) -> Result<()> {
    let mut session = new_session(config)?;
    session
        .open(book_id)
        .await
        .with_context(|| format!("Failed to open book `{}`", book_id))?;

    let entries = session.table_of_contents();
    if entries.is_empty() {
        eprintln!("{} has no outline", book_id);
    }
    for (i, entry) in entries.iter().enumerate() {
        println!("{:>3}  {:<40} {}", i, entry.label, entry.location_token);
    }
    session.close()?;
    Ok(())
}

/// One line typed at the reading prompt
#[derive(Debug, PartialEq)]
enum ReadInput {
    Next,
    Prev,
    Goto(String),
    Entry(usize),
    Toc,
    ZoomIn,
    ZoomOut,
    ZoomReset,
    Theme(Option<String>),
    Font(String),
    Family(String),
    Quit,
    Help,
}

impl ReadInput {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let input = match (word, rest) {
            ("" | "n", "") => Self::Next,
            ("p", "") => Self::Prev,
            ("g", token) if !token.is_empty() => Self::Goto(token.to_string()),
            ("e", index) => Self::Entry(index.parse().ok()?),
            ("toc", "") => Self::Toc,
            ("+", "") => Self::ZoomIn,
            ("-", "") => Self::ZoomOut,
            ("0", "") => Self::ZoomReset,
            ("theme", "") => Self::Theme(None),
            ("theme", name) => Self::Theme(Some(name.to_string())),
            ("font", percent) if !percent.is_empty() => Self::Font(percent.to_string()),
            ("family", name) if !name.is_empty() => Self::Family(name.to_string()),
            ("q", "") => Self::Quit,
            ("?" | "help", "") => Self::Help,
            _ => return None,
        };
        Some(input)
    }
}

const READ_HELP: &str = "n/enter next, p prev, g <token> go to, e <n> outline entry, toc outline, \
+/-/0 zoom, theme [name], font <pct>, family <name>, q quit";

async fn read(config: &FolioConfig, book_id: &str) -> Result<()> {
    let mut session = new_session(config)?;
    session
        .open(book_id)
        .await
        .with_context(|| format!("Failed to open book `{}`", book_id))?;
    print_view(&session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let deadline = session.next_deadline();
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = wait_until(deadline) => {
                session.poll(Instant::now())?;
                continue;
            }
        };
        // End of input closes the book like `q`.
        let Some(line) = line else { break };

        let Some(input) = ReadInput::parse(&line) else {
            eprintln!("Unknown command: {} ({})", line.trim(), READ_HELP);
            continue;
        };
        let now = Instant::now();
        match input {
            ReadInput::Next => {
                session.next(now)?;
            }
            ReadInput::Prev => {
                session.prev(now)?;
            }
            ReadInput::Goto(token) => {
                if !session.display(&token, now)? {
                    eprintln!("No location {} in this book; showing the start", token);
                }
            }
            ReadInput::Entry(index) => {
                if !session.goto_entry(index, now)? {
                    eprintln!("No outline entry {}", index);
                }
            }
            ReadInput::Toc => {
                for (i, entry) in session.table_of_contents().iter().enumerate() {
                    println!("{:>3}  {}", i, entry.label);
                }
                continue;
            }
            ReadInput::ZoomIn => {
                if !zoom(&mut session, ZoomChange::In)? {
                    continue;
                }
            }
            ReadInput::ZoomOut => {
                if !zoom(&mut session, ZoomChange::Out)? {
                    continue;
                }
            }
            ReadInput::ZoomReset => {
                if !zoom(&mut session, ZoomChange::Reset)? {
                    continue;
                }
            }
            ReadInput::Theme(name) => {
                let theme = match name {
                    Some(name) => match Theme::from_str(&name, true) {
                        Ok(theme) => theme,
                        Err(_) => {
                            eprintln!("Unknown theme: {} (light, dark, sepia)", name);
                            continue;
                        }
                    },
                    None => session.settings().theme.cycle(),
                };
                session.update_settings(|s| s.theme = theme)?;
            }
            ReadInput::Font(percent) => {
                let Ok(percent) = percent.parse::<u8>() else {
                    eprintln!("Font size is a percentage, e.g. `font 120`");
                    continue;
                };
                session.update_settings(|s| s.font_size = FontSize::new(percent))?;
            }
            ReadInput::Family(name) => {
                session.update_settings(|s| s.font_family = name)?;
            }
            ReadInput::Help => {
                eprintln!("{}", READ_HELP);
                continue;
            }
            ReadInput::Quit => break,
        }
        print_view(&session);
    }

    session.close()?;
    Ok(())
}

fn zoom(session: &mut ReaderSession, change: ZoomChange) -> Result<bool> {
    if session.set_zoom(change)?.is_none() {
        eprintln!("Zoom applies to paged books; use `font <pct>` instead");
        return Ok(false);
    }
    Ok(true)
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn print_view(session: &ReaderSession) {
    let Some(rendered) = session.view() else {
        return;
    };
    let view = &rendered.view;

    println!();
    if let Some(heading) = &view.heading {
        println!("== {} ==", heading);
    }
    for line in &view.lines {
        println!("{}", line);
    }
    let zoom = rendered
        .zoom
        .map(|z| format!(", zoom {:.2}x", z))
        .unwrap_or_default();
    println!(
        "-- [{}] {}% | {} {}% {}{} --",
        view.location_token,
        view.percentage,
        rendered.font_family,
        rendered.font_size_percent,
        session.settings().theme,
        zoom
    );
}

fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let bytes_f = bytes as f64;
    if bytes_f >= KIB * KIB {
        format!("{:.1} MiB", bytes_f / (KIB * KIB))
    } else if bytes_f >= KIB {
        format!("{:.1} KiB", bytes_f / KIB)
    } else {
        format!("{} B", bytes)
    }
}
