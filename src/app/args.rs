//! Command-line arguments for the daemon

use clap::Parser;
use std::path::PathBuf;

/// Background job queue manager
#[derive(Debug, Parser)]
#[command(name = "jobq", version, about)]
pub struct Args {
    /// Path to a TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Broker host (overrides BROKER_HOST and the config file)
    #[arg(long)]
    pub host: Option<String>,

    /// Broker port (overrides BROKER_PORT and the config file)
    #[arg(long)]
    pub port: Option<u16>,

    /// Log level: error, warn, info, debug or trace
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format: text, ext or json
    #[arg(long)]
    pub log_format: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Disable coloured log output
    #[arg(long)]
    pub no_color: bool,

    /// Increase verbosity (repeatable)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Decrease verbosity (repeatable)
    #[arg(short = 'q', long, action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Args {
    /// Net verbosity delta from repeated -v/-q flags
    pub fn verbosity(&self) -> i8 {
        self.verbose as i8 - self.quiet as i8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["jobq"]);

        assert!(args.config.is_none());
        assert!(args.host.is_none());
        assert_eq!(args.verbosity(), 0);
    }

    #[test]
    fn test_overrides_and_verbosity() {
        let args = Args::parse_from([
            "jobq", "--host", "broker1", "--port", "6380", "-v", "-v", "-q",
        ]);

        assert_eq!(args.host.as_deref(), Some("broker1"));
        assert_eq!(args.port, Some(6380));
        assert_eq!(args.verbosity(), 1);
    }
}
