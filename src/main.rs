use anyhow::{Context, Result};
use futures::future::join_all;
use std::{env, sync::Arc, time::Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

use token_bucket::{metrics, BucketConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = BucketConfig::from_env("BUCKET");
    config.validate().context("invalid BUCKET_* settings")?;
    metrics::init_exporter()?;

    let workers = env::var("WORKERS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(4);
    let takes = env::var("TAKES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(5);

    let bucket = Arc::new(config.build()?);
    info!(?config, workers, takes, "throttling workers");

    let start = Instant::now();
    let handles = (0..workers).map(|worker| {
        let bucket = bucket.clone();
        tokio::spawn(async move {
            for n in 0..takes {
                bucket.take(1).await?;
                info!(worker, n, elapsed = ?start.elapsed(), "token granted");
            }
            Ok::<_, token_bucket::BucketError>(())
        })
    });

    for result in join_all(handles).await {
        result.context("worker panicked")??;
    }

    info!(
        available = bucket.available(),
        elapsed = ?start.elapsed(),
        "all workers done"
    );
    Ok(())
}
