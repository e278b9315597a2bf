use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "synccheck")]
#[command(about = "Relay gateway node sync checker", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config.toml",
        env = "SYNCCHECK_CONFIG"
    )]
    pub config: PathBuf,

    /// Path to the application/chain catalog, overriding the config file
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Run a single batch and exit
    #[arg(long)]
    pub once: bool,

    /// Force debug logging
    #[arg(short, long)]
    pub debug: bool,
}
