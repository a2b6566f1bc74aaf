use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "todd")]
#[command(about = "TODD - trigger and watch test workflows in plain English", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (without extension)
    #[arg(long, env = "TODD_CONFIG")]
    pub config: Option<String>,

    /// GitHub token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a command, trigger its workflows and watch them finish
    Run {
        /// What to run, e.g. "run ios tests in prod"
        command: String,

        /// Return as soon as the workflows are triggered
        #[arg(long)]
        no_watch: bool,
    },

    /// Show which workflows a command would trigger
    Preview {
        command: String,
    },

    /// Refresh and show the tracked runs
    Status,

    /// Cancel a tracked run
    Cancel {
        run_id: u64,
    },

    /// List the workflows of a repository
    Workflows {
        /// Repository as owner/name
        repository: String,
    },

    /// Extract a test summary from a saved job log
    Summarize {
        log_file: String,
    },

    /// Forget tracked runs and chat history
    Clear,

    /// Start API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "3000")]
        port: u16,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from(["todd", "run", "run ios tests in prod", "--no-watch"]).unwrap();
        match cli.command {
            Commands::Run { command, no_watch } => {
                assert_eq!(command, "run ios tests in prod");
                assert!(no_watch);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_cancel_requires_numeric_id() {
        assert!(Cli::try_parse_from(["todd", "cancel", "abc"]).is_err());
        let cli = Cli::try_parse_from(["todd", "cancel", "42"]).unwrap();
        assert!(matches!(cli.command, Commands::Cancel { run_id: 42 }));
    }

    #[test]
    fn test_serve_default_port() {
        let cli = Cli::try_parse_from(["todd", "serve"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { port: 3000 }));
    }
}
