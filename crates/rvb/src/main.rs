use std::sync::Arc;

use tokio::task::LocalSet;

use rvb_core::config::Config;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), rvb_core::Error> {
    let cfg = Arc::new(Config::load()?);
    rvb_core::logging::init("revoltbot", &cfg.log_file)?;
    tracing::info!("Starting revoltbot (prefix {:?})", cfg.prefix);

    let local = LocalSet::new();
    let outcome = local.run_until(rvb_revolt::router::run(cfg.clone())).await;

    // Let in-flight HTTP requests settle before the runtime goes away.
    tokio::time::sleep(cfg.shutdown_grace).await;

    outcome.map_err(|e| rvb_core::Error::External(format!("revolt bot failed: {e:#}")))
}
