//! keikai - headless application launcher
//!
//! Lists, filters, launches and pins desktop applications and follows
//! package changes while running.

mod config;
mod launcher;

use clap::{Parser, Subcommand};
use config::LauncherSettings;
use keikai_apps::{AppEntry, DesktopPlatform, JsonMetadataStore, RegistryEvent, get_settings_path};
use keikai_monitor::{EventReconciler, PackageWatcher};
use launcher::Launcher;
use log::{debug, info};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Path to settings file to use (overrides default).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List applications, optionally only those matching a query
    List {
        query: Option<String>,

        /// Skip icon resolution.
        #[arg(long)]
        no_icons: bool,
    },
    /// Launch the best match for a query
    Launch { query: String },
    /// Pin or unpin the best match for a query
    Pin { query: String },
    /// Follow application changes until interrupted
    Watch,
    /// Forget usage and pin of the best match for a query
    Forget { query: String },
}

type AppLauncher = Launcher<DesktopPlatform>;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let settings_path = cli.config.unwrap_or_else(get_settings_path);
    let settings = LauncherSettings::load(&settings_path);
    debug!("Settings from {}: {:?}", settings_path.display(), settings);

    let platform = Arc::new(DesktopPlatform::new(settings.enumeration.resolve()));
    platform.refresh();
    let store = Arc::new(JsonMetadataStore::open_default()?);
    let launcher = Arc::new(Launcher::new(Arc::clone(&platform), store, settings));
    launcher.load();

    match cli.command {
        Command::List { query, no_icons } => list(&launcher, query.as_deref(), no_icons),
        Command::Launch { query } => {
            let entry = find(&launcher, &query)?;
            launcher.launch(&entry)?;
            println!("Launched {}", entry);
        }
        Command::Pin { query } => {
            let entry = find(&launcher, &query)?;
            let pinned = launcher.toggle_pin(&entry)?;
            println!("{} {}", if pinned { "Pinned" } else { "Unpinned" }, entry);
        }
        Command::Forget { query } => {
            let entry = find(&launcher, &query)?;
            launcher.forget(&entry)?;
            println!("Forgot {}", entry);
        }
        Command::Watch => watch(&launcher, &platform)?,
    }

    Ok(())
}

fn find(launcher: &AppLauncher, query: &str) -> Result<Arc<AppEntry>, Box<dyn Error>> {
    launcher
        .find(query)
        .ok_or_else(|| format!("No application matches \"{query}\"").into())
}

fn format_last_launch(timestamp: i64) -> String {
    if timestamp == 0 {
        return "never".to_string();
    }
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|| "?".to_string())
}

fn list(launcher: &AppLauncher, query: Option<&str>, no_icons: bool) {
    let registry = launcher.registry();
    if let Some(query) = query {
        registry.filter(query);
    }

    let entries = registry.snapshot();
    if entries.is_empty() {
        println!("No applications");
        return;
    }

    let slots = if no_icons {
        Vec::new()
    } else {
        launcher.load_icons(&entries)
    };

    for (index, entry) in entries.iter().enumerate() {
        let icon = slots
            .get(index)
            .and_then(|slot| slot.image())
            .map(|image| format!("{}x{}", image.width(), image.height()))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{} {:<40} {:<7} {:>5}  {:<16}  {}",
            if entry.is_pinned() { "*" } else { " " },
            entry.label(),
            icon,
            entry.usage_count(),
            format_last_launch(entry.last_launch()),
            entry.identity(),
        );
    }
}

fn watch(launcher: &Arc<AppLauncher>, platform: &DesktopPlatform) -> Result<(), Box<dyn Error>> {
    let reconciler = EventReconciler::new();
    let _watcher = PackageWatcher::spawn(platform.application_directories(), reconciler.clone())?;

    let mut events = launcher.registry().subscribe();
    reconciler.attach(launcher.clone());
    info!("Watching for application changes, press Ctrl-C to stop");

    let mut known = launcher.registry().len();
    println!("{} applications", known);

    loop {
        match events.blocking_recv() {
            Ok(RegistryEvent::Changed) => {
                let count = launcher.registry().len();
                if count != known {
                    println!("{} applications", count);
                    known = count;
                }
            }
            Ok(RegistryEvent::Invalidated) => {}
            Err(RecvError::Lagged(skipped)) => debug!("Skipped {} registry events", skipped),
            Err(RecvError::Closed) => break,
        }
    }

    Ok(())
}
