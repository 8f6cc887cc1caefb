//! # CLI Command Implementations
//!
//! Each subcommand of `cms-transform` lives in its own file with:
//! - An `Args` struct deriving `clap::Args`.
//! - An `execute` function taking the parsed args and the global `--color`
//!   flag, calling into the `cms_transform` library.

pub mod import;
pub mod validate;
