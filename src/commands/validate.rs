//! # Validate Command Implementation
//!
//! Checks a transform configuration or an import request, given as a JSON
//! file, without touching any repository. Reports the parameters the
//! orchestrators would use.

use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::PathBuf;

use cms_transform::config::{ImportOptions, ImportSource, TransformConfig};
use cms_transform::output::{OutputConfig, Status, label};

/// Validate a transform configuration or import request file
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// JSON file to validate.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Validate an import request instead of a transform configuration.
    #[arg(long)]
    pub import: bool,

    /// Name of the transform configuration. Defaults to the file stem.
    #[arg(long)]
    pub name: Option<String>,
}

/// Execute the `validate` command.
pub fn execute(args: ValidateArgs, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let json = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let result = if args.import {
        validate_import(&out, &json)
    } else {
        let name = args.name.clone().unwrap_or_else(|| {
            args.file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        validate_transform(&out, &name, &json)
    };

    if let Err(e) = result {
        println!("{} {}", label(&out, Status::Error), e);
        return Err(anyhow::anyhow!(
            "Validation failed for {}: {}",
            args.file.display(),
            e
        ));
    }
    Ok(())
}

fn validate_transform(out: &OutputConfig, name: &str, json: &str) -> cms_transform::Result<()> {
    let config = TransformConfig::from_json(name, json)?;
    let params = config.validate()?;
    println!(
        "{} Transform configuration '{}' is valid",
        label(out, Status::Ok),
        config.name
    );
    println!("   active: {}", config.active);
    println!("   stylesheet: {}", params.stylesheet);
    println!(
        "   output: {}",
        params.output.as_deref().unwrap_or("(source folder)")
    );
    println!("   overwrite: {}", params.overwrite);
    if params.suppress_properties {
        println!(
            "{} Provenance properties are suppressed, generated files may trigger transforms",
            label(out, Status::Warn)
        );
    }
    Ok(())
}

fn validate_import(out: &OutputConfig, json: &str) -> cms_transform::Result<()> {
    let params = ImportOptions::from_json(json)?.validate()?;
    println!("{} Import request is valid", label(out, Status::Ok));
    match &params.source {
        ImportSource::Url(url) => println!("   url: {}", url),
        ImportSource::Content(content) => println!("   content: {} bytes", content.len()),
    }
    println!("   pathext: {}", params.pathext);
    println!(
        "   pathnamebase: {}",
        params.pathnamebase.as_deref().unwrap_or("(generated)")
    );
    Ok(())
}
