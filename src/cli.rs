//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;

/// cms-transform - Import content into a directory-backed CMS repository
#[derive(Parser, Debug)]
#[command(name = "cms-transform")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import a URL or a local file into a repository folder
    Import(commands::import::ImportArgs),

    /// Validate a transform configuration or import request file
    Validate(commands::validate::ValidateArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        env_logger::Builder::new()
            .parse_filters(&self.log_level)
            .format_timestamp(None)
            .try_init()?;

        match self.command {
            Commands::Import(args) => commands::import::execute(args, &self.color),
            Commands::Validate(args) => commands::validate::execute(args, &self.color),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_import() {
        let cli = Cli::try_parse_from([
            "cms-transform",
            "--log-level",
            "debug",
            "import",
            "--repo",
            "/tmp/repo",
            "--target",
            "/import",
            "--file",
            "doc.xml",
            "--pathext",
            "xml",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Import(_)));
    }

    #[test]
    fn test_import_requires_a_source() {
        let result = Cli::try_parse_from([
            "cms-transform",
            "import",
            "--repo",
            "/tmp/repo",
            "--target",
            "/import",
            "--pathext",
            "xml",
        ]);
        assert!(result.is_err());
    }
}
