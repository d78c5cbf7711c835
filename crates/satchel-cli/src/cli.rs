use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use satchel_core::models::ResolutionStrategy;

#[derive(Parser)]
#[command(name = "satchel")]
#[command(about = "Offline-first task reminders from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile a local and a remote snapshot and report conflicts
    Resolve {
        /// Path to the local snapshot (JSON array of tasks)
        #[arg(long, value_name = "PATH")]
        local: PathBuf,
        /// Path to the remote snapshot (JSON array of tasks)
        #[arg(long, value_name = "PATH")]
        remote: PathBuf,
        /// Apply this strategy to every detected conflict
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Preview the merged display list for two snapshots
    Merge {
        /// Path to the local snapshot (JSON array of tasks)
        #[arg(long, value_name = "PATH")]
        local: PathBuf,
        /// Path to the remote snapshot (JSON array of tasks)
        #[arg(long, value_name = "PATH")]
        remote: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a scripted divergence scenario against in-memory stores
    Simulate,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StrategyArg {
    PreferLocal,
    PreferRemote,
    PreferNewest,
    MergeContent,
}

impl From<StrategyArg> for ResolutionStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::PreferLocal => Self::PreferLocal,
            StrategyArg::PreferRemote => Self::PreferRemote,
            StrategyArg::PreferNewest => Self::PreferNewest,
            StrategyArg::MergeContent => Self::MergeContent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_arg_maps_onto_core_strategy() {
        assert_eq!(
            ResolutionStrategy::from(StrategyArg::MergeContent),
            ResolutionStrategy::MergeContent
        );
        assert_eq!(
            ResolutionStrategy::from(StrategyArg::PreferNewest),
            ResolutionStrategy::PreferNewest
        );
    }
}
