use clap::Parser;
use imagegate::config::{GatewayConfig, setup_logging};
use imagegate::gateway::Gateway;
use imagegate::store::ImageStore;
use tracing::{error, info};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = imagegate::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return;
    }

    let store = ImageStore::new(&cli.image_dir);
    if let Err(err) = store.init().await {
        error!(
            "Failed to create image directory {}: {}",
            cli.image_dir.display(),
            err
        );
        return;
    }
    info!("Storing images in {}", store.root().display());

    let config = GatewayConfig::from(&cli);
    info!("Forwarding to {}", config.api_base_url);
    let gateway = Gateway::new(config, store);

    if let Err(err) =
        imagegate::web::setup_server(&cli.listen_address, cli.port, gateway).await
    {
        error!("Application error: {}", err);
    }
}
