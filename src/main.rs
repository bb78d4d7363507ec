// SPDX-License-Identifier: MPL-2.0
//! Command-line demo: watch one thread and print notification payloads.

use std::sync::Arc;
use std::time::Duration;
use threadwatch::config;
use threadwatch::error::{Error, Result};
use threadwatch::fetch::HttpThreadFetcher;
use threadwatch::model::Loadable;
use threadwatch::notify;
use threadwatch::watch::{PinManager, WatchCoordinator, WatchFlags};
use tracing::info;

const DEFAULT_API_ENDPOINT: &str = "https://a.4cdn.org";
const DEFAULT_MEDIA_ENDPOINT: &str = "https://i.4cdn.org";

struct Args {
    site: String,
    board: String,
    thread_no: u64,
    api_endpoint: String,
    media_endpoint: String,
    interval_secs: Option<u64>,
}

fn parse_args() -> Result<Args> {
    let mut args = pico_args::Arguments::from_env();

    let board: String = args
        .value_from_str("--board")
        .map_err(|e| Error::Config(format!("--board: {e}")))?;
    let thread_no: u64 = args
        .value_from_str("--thread")
        .map_err(|e| Error::Config(format!("--thread: {e}")))?;
    let api_endpoint = args
        .opt_value_from_str("--api")
        .map_err(|e| Error::Config(format!("--api: {e}")))?
        .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string());
    let media_endpoint = args
        .opt_value_from_str("--media")
        .map_err(|e| Error::Config(format!("--media: {e}")))?
        .unwrap_or_else(|| DEFAULT_MEDIA_ENDPOINT.to_string());
    let site = args
        .opt_value_from_str("--site")
        .map_err(|e| Error::Config(format!("--site: {e}")))?
        .unwrap_or_else(|| "4chan".to_string());
    let interval_secs = args
        .opt_value_from_str("--interval")
        .map_err(|e| Error::Config(format!("--interval: {e}")))?;

    Ok(Args {
        site,
        board,
        thread_no,
        api_endpoint,
        media_endpoint,
        interval_secs,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = parse_args()?;
    let settings = config::load()?;
    let interval_secs = args.interval_secs.unwrap_or(settings.poll_interval_secs);

    let fetcher = HttpThreadFetcher::new(args.api_endpoint, args.media_endpoint)?;
    let loadable = Loadable::new(
        args.site,
        args.board.clone(),
        args.thread_no,
        format!("/{}/{}", args.board, args.thread_no),
    );

    let mut manager = PinManager::new();
    let pin_id = manager.create_pin(loadable, WatchFlags::default());
    let mut coordinator = WatchCoordinator::new(manager, Arc::new(fetcher));

    info!(interval_secs, "watching; ctrl-c to stop");
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        ticker.tick().await;
        coordinator.poll_all().await;

        let manager = coordinator.manager_mut();
        let payload = notify::aggregate(manager, &settings, false);
        println!("== {}", payload.title);
        if !payload.body.is_empty() {
            println!("{}", payload.body);
        }
        for line in &payload.expanded_lines {
            println!("  {line}");
        }

        if let Some(pin) = manager.pin(pin_id) {
            if pin.is_error {
                info!("thread is gone; stopping");
                break;
            }
        } else {
            break;
        }
    }

    Ok(())
}
