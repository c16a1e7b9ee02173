use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use impscope::InspectConfig;

/// impscope - import table inspection of PE images
#[derive(Debug, Parser)]
#[command(name = "impscope", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Route pass records through the logger instead of the console renderer.
    #[arg(long, global = true)]
    pub log: bool,

    /// Maximum number of import descriptors walked per pass.
    #[arg(long, global = true, value_name = "N")]
    pub max_modules: Option<usize>,

    /// Maximum number of thunks decoded per module.
    #[arg(long, global = true, value_name = "N")]
    pub max_thunks: Option<usize>,
}

impl GlobalOptions {
    /// Default caps with the command line overrides applied.
    pub fn inspect_config(&self) -> InspectConfig {
        let mut config = InspectConfig::default();
        if let Some(max_modules) = self.max_modules {
            config = config.with_max_modules(max_modules);
        }
        if let Some(max_thunks) = self.max_thunks {
            config = config.with_max_thunks(max_thunks);
        }
        config
    }
}

/// Pacing of the refresh loop.
#[derive(Debug, Parser)]
pub struct RefreshOptions {
    /// Pause between two passes, in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub interval_ms: u64,

    /// Stop after this many passes instead of waiting for Ctrl+C.
    #[arg(long, value_name = "N")]
    pub passes: Option<usize>,
}

impl RefreshOptions {
    /// Applies the pacing to `config`.
    pub fn apply(&self, config: InspectConfig) -> InspectConfig {
        let config = config.with_refresh_interval(Duration::from_millis(self.interval_ms));
        match self.passes {
            Some(passes) => config.with_max_passes(passes),
            None => config,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Display the header chain and the directory table of a PE file.
    Headers {
        /// Path to the PE file.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Run one import pass over the in-memory layout of a PE file.
    Imports {
        /// Path to the PE file.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Repeat import passes over a PE file until interrupted, reloading it before every pass.
    Watch {
        /// Path to the PE file.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        #[command(flatten)]
        refresh: RefreshOptions,
    },

    /// Repeat import passes over the image of this process (Windows only).
    #[command(name = "self")]
    SelfImage {
        #[command(flatten)]
        refresh: RefreshOptions,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_watch() {
        let cli = Cli::parse_from([
            "impscope",
            "--max-thunks",
            "16",
            "watch",
            "a.exe",
            "--interval-ms",
            "250",
            "--passes",
            "2",
        ]);

        let Command::Watch { path, refresh } = &cli.command else {
            panic!("expected watch");
        };
        assert_eq!(path, &PathBuf::from("a.exe"));

        let config = refresh.apply(cli.global.inspect_config());
        assert_eq!(config.max_thunks, 16);
        assert_eq!(config.max_modules, InspectConfig::default().max_modules);
        assert_eq!(config.refresh_interval, Duration::from_millis(250));
        assert_eq!(config.max_passes, Some(2));
    }

    #[test]
    fn parses_self() {
        let cli = Cli::parse_from(["impscope", "self", "--json"]);
        assert!(cli.global.json);
        assert!(matches!(cli.command, Command::SelfImage { .. }));
    }
}
