use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::DateTime;
use tracing::{info, warn};
use vigia_client::{
    ClientConfig, Dashboard, DashboardChannels, FeedPhase, FileTokenStore, TokenStore,
};

use crate::cli::{Args, Commands};

fn store_path(args: &Args) -> Result<PathBuf> {
    if let Some(path) = &args.store {
        return Ok(path.clone());
    }
    let base = dirs::config_dir().context("no user configuration directory available")?;
    Ok(base.join("vigia").join("session.json"))
}

pub async fn run(args: Args) -> Result<()> {
    let base_url = ClientConfig::parse_base_url(&args.server)?;
    let config = ClientConfig::new(base_url);
    let store: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(store_path(&args)?));

    let (mut dashboard, channels) = Dashboard::open(&config, store, 16).await?;

    let needs_session = !matches!(args.command, Commands::Login { .. } | Commands::Logout);
    if needs_session && !dashboard.is_authenticated() {
        bail!("not logged in; run `vigia login` first");
    }

    match args.command {
        Commands::Login { username, password } => {
            dashboard.login(&username, &password).await?;
            println!("Logged in to {}", args.server);
        }
        Commands::Logout => {
            dashboard.logout().await?;
            println!("Session dropped");
        }
        Commands::Start => {
            dashboard.start_monitoring().await?;
            println!("Monitoring started");
        }
        Commands::Stop => {
            dashboard.stop_monitoring().await?;
            println!("Monitoring stopped");
        }
        Commands::Pause => {
            dashboard.pause_monitoring().await?;
            println!("Monitoring paused");
        }
        Commands::Resume => {
            dashboard.resume_monitoring().await?;
            println!("Monitoring resumed");
        }
        Commands::Threshold { value } => {
            let applied = dashboard.set_threshold(value).await?;
            println!("Detection threshold set to {applied}%");
        }
        Commands::Watch {
            frames_dir,
            hide_feed,
        } => {
            dashboard.start_monitoring().await?;
            dashboard.set_feed_visible(!hide_feed).await;

            let result = watch(&mut dashboard, channels, frames_dir).await;

            if let Err(err) = dashboard.stop_monitoring().await {
                warn!(error = %err, "failed to stop monitoring on exit");
            }
            dashboard.shutdown().await;
            result?;
        }
    }

    Ok(())
}

async fn watch(
    dashboard: &mut Dashboard,
    mut channels: DashboardChannels,
    frames_dir: Option<PathBuf>,
) -> Result<()> {
    if let Some(dir) = &frames_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("cannot create {}", dir.display()))?;
    }

    let alerts = dashboard.alerts();
    let mut newest_alert = i64::MIN;
    let mut alert_ticker = tokio::time::interval(Duration::from_secs(1));
    let mut frame_count: u64 = 0;

    info!("watching; press Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            changed = channels.session_expired.changed() => {
                if changed.is_ok() && *channels.session_expired.borrow_and_update() {
                    bail!("session expired; run `vigia login` again");
                }
            }
            changed = channels.feed_phase.changed() => {
                if changed.is_err() {
                    break;
                }
                match channels.feed_phase.borrow_and_update().clone() {
                    FeedPhase::Active => info!("video feed active"),
                    FeedPhase::Idle => info!("video feed idle"),
                    FeedPhase::Error(message) => {
                        warn!(%message, "video feed failed; restart to reconnect");
                        break;
                    }
                }
            }
            frame = channels.frames.recv() => {
                let Some(frame) = frame else { break };
                frame_count += 1;
                if let Some(dir) = &frames_dir {
                    let path = dir.join(format!("frame-{:06}.jpg", frame.sequence));
                    tokio::fs::write(&path, &frame.payload)
                        .await
                        .with_context(|| format!("cannot write {}", path.display()))?;
                }
                if frame_count % 100 == 0 {
                    info!(frames = frame_count, "live feed progressing");
                }
            }
            _ = alert_ticker.tick() => {
                // Log entries are newest first; print the ones not yet seen,
                // oldest first. Snapshot so the read guard is not held while
                // printing.
                let snapshot = alerts.read().snapshot();
                let fresh: Vec<_> = snapshot
                    .into_iter()
                    .take_while(|event| event.timestamp > newest_alert)
                    .collect();
                for event in fresh.into_iter().rev() {
                    newest_alert = newest_alert.max(event.timestamp);
                    let when = DateTime::from_timestamp_millis(event.timestamp)
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| event.timestamp.to_string());
                    println!("[{when}] motion alert, score {:.1}%", event.score);
                }
            }
        }
    }

    info!(frames = frame_count, "watch ended");
    Ok(())
}
