//! # Terminal Output
//!
//! Status labels for CLI output. Colors are used when the `--color` flag
//! asks for them, or in `auto` mode when the environment allows:
//!
//! - `NO_COLOR` set (any value) disables colors
//! - `CLICOLOR=0` disables colors
//! - `CLICOLOR_FORCE=1` forces colors even when stdout is not a terminal
//! - `TERM=dumb` disables colors
//!
//! Without colors, labels fall back to bracketed plain text such as `[OK]`,
//! which keeps the output stable for scripts and tests.

use console::style;
use std::env;

/// Whether CLI output may use colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    pub use_color: bool,
}

impl OutputConfig {
    /// Resolve the `--color` flag (`always`, `never` or `auto`).
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };
        Self { use_color }
    }

    fn detect_color_support() -> bool {
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }
        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }
        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }
        console::Term::stdout().features().colors_supported()
    }
}

/// Kind of a reported line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Info,
    Warn,
    Error,
}

impl Status {
    fn plain(self) -> &'static str {
        match self {
            Status::Ok => "[OK]",
            Status::Info => "[INFO]",
            Status::Warn => "[WARN]",
            Status::Error => "[ERR]",
        }
    }
}

/// Label printed in front of a status line.
pub fn label(config: &OutputConfig, status: Status) -> String {
    let plain = status.plain();
    if !config.use_color {
        return plain.to_string();
    }
    let styled = match status {
        Status::Ok => style(plain).green().bold(),
        Status::Info => style(plain).cyan(),
        Status::Warn => style(plain).yellow().bold(),
        Status::Error => style(plain).red().bold(),
    };
    styled.force_styling(true).to_string()
}
