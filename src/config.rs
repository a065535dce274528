use clap::Args;
use std::path::PathBuf;

/// Options of the `serve` subcommand
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Host address to bind to
    #[arg(long, env = "CAPTCHA_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "CAPTCHA_PORT", default_value = "9393")]
    pub port: u16,

    /// Maximum upload size in bytes (default: 5MB)
    #[arg(long, env = "CAPTCHA_MAX_FILE_SIZE", default_value = "5242880")]
    pub max_file_size: usize,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_file_size: usize,
    pub styles_dir: PathBuf,
}

impl Config {
    pub fn new(args: ServeArgs, styles_dir: PathBuf) -> Self {
        Self {
            host: args.host,
            port: args.port,
            max_file_size: args.max_file_size,
            styles_dir,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
