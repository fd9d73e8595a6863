use anyhow::{Context, Result};
use clap::{crate_version, App, AppSettings, Arg};
use std::{path::Path, sync::Arc, time::Duration};
use tracing_subscriber::EnvFilter;

use voxload_core::services::{ChunkStore, FilenameLocks};

mod backends;
mod config;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = app().get_matches();

    let settings = config::load(matches.value_of("config").map(Path::new))?;

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_new(&settings.log_level).context("parsing log_level")?)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match matches.subcommand() {
        Some(("server", _matches)) => command_server(settings).await?,
        Some(("sweep", matches)) => {
            let ttl = match matches.value_of("ttl-secs") {
                Some(ttl) => Duration::from_secs(ttl.parse().context("parsing --ttl-secs")?),
                None => settings.fragment_ttl(),
            };

            let store = ChunkStore::open(&settings.upload_dir, FilenameLocks::new()).await?;
            let report = store.sweep_orphans(ttl).await?;

            println!(
                "Removed {} files ({} bytes)",
                report.removed_files, report.removed_bytes
            );
        }
        _ => unreachable!("clap requires a subcommand"),
    }

    Ok(())
}

fn app() -> App<'static> {
    App::new("voxload")
        .version(crate_version!())
        .about("Chunked upload server for voice conversion models.")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("path")
                .takes_value(true)
                .help("Read settings from this file instead of ./voxload.toml"),
        )
        .subcommand(App::new("server").about("Start the server"))
        .subcommand(
            App::new("sweep")
                .about("Remove stale chunk fragments from the upload directory")
                .long_about(
                    "Remove stale chunk fragments from the upload directory.\n\n\
                     This command cannot see the filename locks of a running server, so a \
                     fragment that is being uploaded or concatenated right now may still be \
                     removed if it is older than the TTL. While the server runs, rely on its \
                     periodic sweep (sweep_interval_secs) instead.",
                )
                .arg(
                    Arg::new("ttl-secs")
                        .long("ttl-secs")
                        .value_name("seconds")
                        .takes_value(true)
                        .help("Override fragment_ttl_secs from the settings"),
                ),
        )
}

async fn command_server(settings: config::Settings) -> Result<()> {
    let addr = settings.listen_addr;
    let sweep_interval = settings.sweep_interval();
    let fragment_ttl = settings.fragment_ttl();

    let engine = Box::new(backends::MemoryEngine::new());
    let state = Arc::new(server::State::open(settings, engine).await?);

    if let Some(interval) = sweep_interval {
        tokio::spawn(sweep_periodically(state.store.clone(), interval, fragment_ttl));
    }

    tracing::info!("starting server");

    server::serve(state, addr).await
}

async fn sweep_periodically(store: ChunkStore, interval: Duration, ttl: Duration) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        match store.sweep_orphans(ttl).await {
            Ok(report) if report.removed_files > 0 => tracing::info!(
                files = report.removed_files,
                bytes = report.removed_bytes,
                "swept stale fragments"
            ),
            Ok(_) => (),
            Err(err) => tracing::warn!("sweep failed: {:?}", err),
        }
    }
}
