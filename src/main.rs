use growatt_bridge::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let options = Options::new();

    let config = match ConfigWrapper::new(options.config_file.clone()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load config {}: {:?}", options.config_file, err);
            std::process::exit(255);
        }
    };

    growatt_bridge::init_logging(&config.loglevel())?;
    info!("Configuration loaded from {}", options.config_file);
    config.log_summary();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    // Handle Ctrl+C
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        let _ = shutdown_tx_clone.send(());
    });

    if let Some(secs) = options.runtime {
        let shutdown_tx_clone = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
            info!("runtime limit of {}s reached", secs);
            let _ = shutdown_tx_clone.send(());
        });
    }

    growatt_bridge::app(shutdown_rx, config).await
}
