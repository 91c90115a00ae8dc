//! Config handling

use std::fmt;

use tracing::log::LevelFilter;
use url::Url;

use crate::cli::CliOptions;

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// Connection settings for the upstream image API.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Bearer token sent with every upstream request.
    pub api_key: String,
    /// Base URL that endpoint paths are joined onto.
    pub api_base_url: Url,
}

impl GatewayConfig {
    /// Builds a config, making sure the base URL ends in a slash so joins keep its path.
    pub fn new(api_key: impl Into<String>, mut api_base_url: Url) -> Self {
        if !api_base_url.path().ends_with('/') {
            let path = format!("{}/", api_base_url.path());
            api_base_url.set_path(&path);
        }
        Self {
            api_key: api_key.into(),
            api_base_url,
        }
    }
}

impl From<&CliOptions> for GatewayConfig {
    fn from(cli: &CliOptions) -> Self {
        Self::new(cli.api_key.clone(), cli.api_base_url.clone())
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_key", &"<redacted>")
            .field("api_base_url", &self.api_base_url.as_str())
            .finish()
    }
}
