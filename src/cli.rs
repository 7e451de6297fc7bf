// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;
use crate::types::CyclePolicy;

/// Command-line arguments for `infraflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "infraflow",
    version,
    about = "Apply the infrastructure modules affected by a change, in dependency order.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML). A missing file means defaults.
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Repository checkout to operate on.
    #[arg(long, value_name = "PATH", default_value = ".")]
    pub repo: PathBuf,

    /// Stack to apply (directory under `infra_dir`). Overrides `[config].stack`.
    #[arg(long, value_name = "NAME")]
    pub stack: Option<String>,

    /// Base revision; modules changed between it and HEAD are applied.
    #[arg(long, value_name = "REV", default_value = "HEAD~1")]
    pub base: String,

    /// Treat this module as changed instead of asking git (repeatable).
    #[arg(long = "changed", value_name = "MODULE")]
    pub changed: Vec<String>,

    /// Read the dependency graph from a file instead of running the planner.
    #[arg(long, value_name = "PATH")]
    pub graph_file: Option<PathBuf>,

    /// Fail on dependency cycles instead of applying them as one level.
    #[arg(long)]
    pub strict_cycles: bool,

    /// Print the pruned graph and its levels, but apply nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `INFRAFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

impl CliArgs {
    /// `--strict-cycles` forces strict mode; otherwise the config decides.
    pub fn cycle_policy(&self, configured: CyclePolicy) -> CyclePolicy {
        if self.strict_cycles {
            CyclePolicy::Strict
        } else {
            configured
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changed_flag_is_repeatable() {
        let args = CliArgs::try_parse_from([
            "infraflow",
            "--stack",
            "local",
            "--changed",
            "db",
            "--changed",
            "pes/keyvault",
            "--dry-run",
        ])
        .expect("valid args");

        assert_eq!(args.changed, vec!["db", "pes/keyvault"]);
        assert_eq!(args.stack.as_deref(), Some("local"));
        assert_eq!(args.base, "HEAD~1");
        assert!(args.dry_run);
    }

    #[test]
    fn strict_flag_overrides_configured_policy() {
        let args = CliArgs::try_parse_from(["infraflow", "--strict-cycles"]).expect("valid args");
        assert_eq!(args.cycle_policy(CyclePolicy::BestEffort), CyclePolicy::Strict);

        let args = CliArgs::try_parse_from(["infraflow"]).expect("valid args");
        assert_eq!(args.cycle_policy(CyclePolicy::Strict), CyclePolicy::Strict);
        assert_eq!(args.config, PathBuf::from("Infraflow.toml"));
    }
}
