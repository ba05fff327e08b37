use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "hp-vendor",
    about = "HP Dev One platform support - EC fan speed and battery CT number",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output as JSON instead of formatted text
    #[arg(long, global = true)]
    pub json: bool,

    /// Read configuration from this file only
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Resolve /sys, /dev and /proc under this directory
    #[arg(long, global = true, hide = true, default_value = "/")]
    pub root: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show firmware identity and whether this machine is supported
    Detect,

    /// Read the CPU fan speed from the embedded controller
    Fan,

    /// Read the battery CT number from the embedded controller
    Battery,

    /// Register the driver and read every attribute it exposes
    Sensors,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for (auto-detected if omitted)
        shell: Option<Shell>,
    },
}

/// Print shell completions to stdout.
pub fn print_completions(shell: Option<Shell>) {
    let shell = shell.or_else(Shell::from_env).unwrap_or_else(|| {
        eprintln!(
            "Could not detect shell. Specify one: hp-vendor completions bash|zsh|fish|elvish|powershell"
        );
        std::process::exit(1);
    });
    clap_complete::generate(
        shell,
        &mut Cli::command(),
        "hp-vendor",
        &mut std::io::stdout(),
    );
}
