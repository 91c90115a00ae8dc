//! CLI parser
use clap::Parser;
use std::num::NonZeroU16;
use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "imagegate")]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "IMAGEGATE_DEBUG")]
    /// Enable debug logging. Env: IMAGEGATE_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "3000", env = "IMAGEGATE_PORT")]
    /// http listener, defaults to `3000`.
    /// Env: IMAGEGATE_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "IMAGEGATE_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: IMAGEGATE_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(long, default_value = "./public/images", env = "IMAGEGATE_IMAGE_DIR")]
    /// Where generated images are written and served from.
    /// Env: IMAGEGATE_IMAGE_DIR
    pub image_dir: PathBuf,

    #[clap(
        long,
        default_value = "https://api.stability.ai/",
        env = "IMAGEGATE_API_BASE_URL"
    )]
    /// Base URL of the Stability API.
    /// Env: IMAGEGATE_API_BASE_URL
    pub api_base_url: Url,

    #[clap(long, env = "STABILITY_API_KEY", hide_env_values = true)]
    /// Stability API key, sent as a bearer token.
    /// Env: STABILITY_API_KEY
    pub api_key: String,
}
