use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tidy_downloads::backends::{
    DirectoryHost, DownloadHost, FileSystem, InferenceApi, LocalFileSystem, MistralClient,
};
use tidy_downloads::events::EventPayload;
use tidy_downloads::services::{
    IdentityResolver, RenameOutcome, RenamePipeline, RenameRequest, RenameStage,
};
use tidy_downloads::{SessionWorker, Settings};

#[derive(Debug, Parser)]
#[command(name = "tidy-downloads", version, about = "Tidy up finished downloads")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Give recent downloads in a folder descriptive names
    Tidy {
        /// Folder to tidy, the user's download folder by default
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Only files modified within this many hours
        #[arg(long)]
        hours: Option<u64>,
        /// List what would be sent for renaming without touching anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Run a pod session over a folder and print its events
    Watch {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let prefs = Settings::load_preferences()?;
    let settings = Settings::from_prefs(&prefs);

    let default_level = if settings.general.debug_logging {
        "tidy_downloads=debug"
    } else {
        "tidy_downloads=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Command::Tidy {
            dir,
            hours,
            dry_run,
        } => tidy(settings, downloads_dir(dir)?, hours, dry_run).await,
        Command::Watch { dir } => watch(settings, downloads_dir(dir)?).await,
        Command::Config => {
            println!("# {}", Settings::config_path()?.display());
            print!("{}", settings.to_toml()?);
            Ok(())
        }
    }
}

fn downloads_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => dirs::download_dir().context("Failed to find the download directory"),
    }
}

fn inference_client(settings: &Settings) -> Result<Option<Arc<dyn InferenceApi>>> {
    if !settings.ai_renaming_configured() {
        return Ok(None);
    }
    let client = MistralClient::from_settings(&settings.renaming)
        .context("Failed to create inference client")?;
    Ok(Some(Arc::new(client)))
}

async fn tidy(settings: Settings, dir: PathBuf, hours: Option<u64>, dry_run: bool) -> Result<()> {
    let host = DirectoryHost::new(&dir);
    let hours = hours.unwrap_or(settings.pods.reshow_window_hours);
    let cutoff = Utc::now() - chrono::Duration::hours(hours.min(i64::MAX as u64 / 3600) as i64);

    let records: Vec<_> = host
        .list_all()
        .await
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .into_iter()
        .filter(|record| record.started_at >= cutoff)
        .collect();
    info!("{} downloads from the last {}h in {}", records.len(), hours, dir.display());

    if dry_run {
        for record in &records {
            println!("{}", record.display_name());
        }
        return Ok(());
    }

    let Some(inference) = inference_client(&settings)? else {
        anyhow::bail!("AI renaming is not configured, set renaming.api_key in the config file");
    };
    inference
        .verify()
        .await
        .context("Inference API check failed")?;

    let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new());
    let pipeline = RenamePipeline::new(fs, inference, settings.renaming.clone());
    let report = |stage: RenameStage| info!("{}", stage.status_text());

    for record in records {
        let Some(path) = record.path.clone() else {
            continue;
        };
        let request = RenameRequest {
            key: IdentityResolver::resolve(&record),
            path,
            original_name: record.display_name(),
            source_url: record.source_url.clone(),
        };

        match pipeline.run(request, &report).await {
            RenameOutcome::Renamed {
                old_path,
                new_path,
                new_name,
            } => {
                println!("{} -> {}", old_path.display(), new_name);
                if let Err(e) = host.update_target(&record, &new_path).await {
                    warn!("Failed to record new name: {}", e);
                }
            }
            RenameOutcome::RateLimited => {
                warn!("API rate limit reached, stopping");
                break;
            }
            outcome => {
                if let Some(status) = outcome.status_text() {
                    info!("{}: {}", record.display_name(), status);
                }
            }
        }
    }
    Ok(())
}

async fn watch(settings: Settings, dir: PathBuf) -> Result<()> {
    let host: Arc<dyn DownloadHost> = Arc::new(DirectoryHost::new(&dir));
    let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new());
    let inference = inference_client(&settings)?;

    let (handle, worker) = SessionWorker::spawn(settings, host, fs, inference);
    let mut events = handle.subscribe();
    info!("Watching {}, Ctrl-C to stop", dir.display());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                let event = event?;
                match &event.payload {
                    EventPayload::Layout { .. } => {}
                    EventPayload::Pod { key, snapshot } => {
                        println!("{:<20} {} ({})", event.event_type.as_str(), key, snapshot.status_text)
                    }
                    _ => println!("{:<20} {:?}", event.event_type.as_str(), event.pod_key()),
                }
            }
        }
    }

    handle.shutdown()?;
    worker.await.context("Session worker panicked")?;
    Ok(())
}
