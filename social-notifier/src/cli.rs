//! Command line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "NOTIFIER_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Poll the configured accounts until interrupted (default)
    Run {
        /// Run a single poll cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Validate the configuration and list tracked accounts
    CheckConfig,
    /// Print the persisted dedup state
    State,
    /// Forget delivered items so they are announced again
    Reset {
        /// Key to forget, e.g. `youtube:@goose:live`. Forgets everything when omitted.
        key: Option<String>,
    },
}

impl Args {
    /// Filter directive implied by `-v` / `-q`.
    pub fn log_directive(&self) -> Option<&'static str> {
        if self.verbose {
            Some("social_notifier=debug,platforms_feed=debug")
        } else if self.quiet {
            Some("social_notifier=warn,platforms_feed=warn")
        } else {
            None
        }
    }

    pub fn command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or(Commands::Run { once: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_run() {
        let args = Args::try_parse_from(["social-notifier"]).unwrap();
        assert_eq!(args.command(), Commands::Run { once: false });
        assert_eq!(args.log_directive(), None);
    }

    #[test]
    fn test_reset_with_key() {
        let args = Args::try_parse_from([
            "social-notifier",
            "--config",
            "/etc/notifier.toml",
            "-v",
            "reset",
            "youtube:@goose:live",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/notifier.toml"));
        assert!(args.log_directive().unwrap().contains("debug"));
        assert_eq!(
            args.command(),
            Commands::Reset {
                key: Some("youtube:@goose:live".into())
            }
        );
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Args::try_parse_from(["social-notifier", "-v", "-q"]).is_err());
    }
}
