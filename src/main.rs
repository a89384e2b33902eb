use std::time::Duration;

use anyhow::Result;
use metar_core::CacheConfig;
use metar_feed::MetarCache;

#[tokio::main]
async fn main() -> Result<()> {
    metar_core::init()?;

    let station = std::env::args().nth(1).unwrap_or_else(|| "EDDF".to_string());
    let (config, _) = CacheConfig::load_validated()?;

    let cache = MetarCache::new(config).map_err(|e| {
        tracing::error!("{}", e.user_message());
        e
    })?;
    tracing::info!("METAR sandbox started, waiting for first refresh");

    tokio::time::sleep(Duration::from_secs(3)).await;

    match cache.get_airport_data(&station) {
        Some(airport) => println!("{}", serde_json::to_string_pretty(&airport)?),
        None => println!("{} not found ({} stations cached)", station, cache.len()),
    }

    cache.shutdown().await;
    Ok(())
}
