use anyhow::Result;
use clap::Parser;
use hp_vendor::cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    hp_vendor::commands::run(cli)
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_env("HP_VENDOR_LOG").unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}
