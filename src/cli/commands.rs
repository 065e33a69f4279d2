use clap::{Parser, Subcommand};
use conductor::capabilities::Prefer;
use std::path::PathBuf;

/// `conductor` - drives a reasoning model to locate and extract media manifests.
#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(version)]
#[command(about = "Coordinates reasoning sessions that locate media manifests.", long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a run and wait until it is done or failed
    Run {
        /// Page the manifest should be found on
        #[arg(long)]
        url: String,

        /// Use this HTML instead of fetching the page
        #[arg(long)]
        html_file: Option<PathBuf>,

        /// Name to store the finalized algorithm under
        #[arg(long)]
        name: Option<String>,

        /// Free-form notes passed to the coordinator
        #[arg(long)]
        notes: Option<String>,

        /// Preferred strategy (static, dynamic, auto)
        #[arg(long, default_value = "auto")]
        prefer: Prefer,

        /// Step budget for this run
        #[arg(long)]
        max_steps: Option<i64>,
    },

    /// Print audit entries as JSON lines
    Audit {
        /// Read the raw mirror instead of the working log
        #[arg(long)]
        raw: bool,

        /// Only entries written by this agent (repeatable)
        #[arg(long)]
        agent: Vec<String>,

        /// Only entries of this type (repeatable)
        #[arg(long = "type")]
        kind: Vec<String>,

        /// Only entries after this id
        #[arg(long)]
        since: Option<String>,
    },

    /// Compact the working log now, regardless of its size
    Compact,

    /// Show the working log's size and token estimate
    Measure,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accepts_all_task_fields() {
        let cli = Cli::try_parse_from([
            "conductor",
            "run",
            "--url",
            "https://x.test/watch",
            "--name",
            "site_a",
            "--prefer",
            "dynamic",
            "--max-steps",
            "12",
        ])
        .unwrap();
        let Commands::Run {
            url,
            name,
            prefer,
            max_steps,
            html_file,
            ..
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(url, "https://x.test/watch");
        assert_eq!(name.as_deref(), Some("site_a"));
        assert_eq!(prefer, Prefer::Dynamic);
        assert_eq!(max_steps, Some(12));
        assert!(html_file.is_none());
    }

    #[test]
    fn audit_filters_repeat() {
        let cli = Cli::try_parse_from([
            "conductor", "audit", "--raw", "--agent", "a", "--agent", "b", "--type", "error",
        ])
        .unwrap();
        let Commands::Audit { raw, agent, kind, since } = cli.command else {
            panic!("expected audit");
        };
        assert!(raw);
        assert_eq!(agent, vec!["a", "b"]);
        assert_eq!(kind, vec!["error"]);
        assert!(since.is_none());
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        assert!(Cli::try_parse_from(["conductor", "run", "--url", "u", "--prefer", "magic"]).is_err());
    }
}
