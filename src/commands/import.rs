//! # Import Command Implementation
//!
//! Imports a URL or a local file into a folder of a directory-backed
//! repository. The directory is loaded into memory, the import runs as one
//! commit, and the result is written back to the directory.
//!
//! Folder naming (`.cms-naming.yaml`) decides whether the imported file gets
//! a generated name or the one given with `--pathnamebase`.

use anyhow::{Context, Result};
use clap::{ArgGroup, Args};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cms_transform::config::ImportOptions;
use cms_transform::fetch::HttpFetchClient;
use cms_transform::flows::ImportOrchestrator;
use cms_transform::item::{ItemPath, Repository};
use cms_transform::memory::MemoryRepository;
use cms_transform::output::{OutputConfig, Status, label};
use cms_transform::repository::FetchTimeouts;

/// Import a URL or a local file into a repository folder
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("source").required(true).args(["url", "file"])))]
pub struct ImportArgs {
    /// Directory holding the repository.
    #[arg(long, value_name = "DIR", env = "CMS_TRANSFORM_REPO")]
    pub repo: PathBuf,

    /// URL identifying the repository in item ids.
    #[arg(long, value_name = "URL", default_value = "x-svn:///svn/local")]
    pub repo_url: String,

    /// Existing folder to import into, e.g. /import.
    #[arg(long, value_name = "FOLDER")]
    pub target: String,

    /// http(s) URL to download.
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Local file to import.
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Extension of the imported file, without dot.
    #[arg(long, value_name = "EXT")]
    pub pathext: String,

    /// Name of the imported file, without extension. Not allowed for folders
    /// that generate names.
    #[arg(long, value_name = "NAME")]
    pub pathnamebase: Option<String>,

    /// History message of the commit.
    #[arg(long)]
    pub comment: Option<String>,

    /// Property to set on the imported file. Can be repeated.
    #[arg(long = "property", value_name = "KEY=VALUE", value_parser = parse_property)]
    pub properties: Vec<(String, String)>,

    /// Connect timeout for downloads, in seconds.
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub connect_timeout: u64,

    /// Read timeout for downloads, in seconds.
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub read_timeout: u64,
}

fn parse_property(value: &str) -> std::result::Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", value)),
    }
}

/// Execute the `import` command.
pub fn execute(args: ImportArgs, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let repository = Repository::new(&args.repo_url)?;
    let repo = Arc::new(
        MemoryRepository::load_dir(&args.repo, repository.clone())
            .with_context(|| format!("Failed to load repository from {}", args.repo.display()))?,
    );

    let content = match &args.file {
        Some(file) => Some(
            fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?,
        ),
        None => None,
    };

    let mut params = BTreeMap::new();
    params.insert("pathext".to_string(), args.pathext.clone());
    if let Some(base) = &args.pathnamebase {
        params.insert("pathnamebase".to_string(), base.clone());
    }
    if let Some(comment) = &args.comment {
        params.insert("comment".to_string(), comment.clone());
    }
    let options = ImportOptions {
        url: args.url.clone(),
        content,
        params,
        properties: args.properties.iter().cloned().collect(),
    };

    let fetch = HttpFetchClient::with_user_agent(concat!("cms-transform/", env!("CARGO_PKG_VERSION")));
    let orchestrator =
        ImportOrchestrator::new(repo.clone(), repo.clone(), repo.clone(), Arc::new(fetch))
            .with_timeouts(FetchTimeouts {
                connect: Duration::from_secs(args.connect_timeout),
                read: Duration::from_secs(args.read_timeout),
            });

    let target = repository.item_id(ItemPath::new(&args.target)?);
    let outcome = match orchestrator.import(&target, &options) {
        Ok(outcome) => outcome,
        Err(e) => {
            println!("{} Import failed: {}", label(&out, Status::Error), e);
            return Err(e.into());
        }
    };

    repo.write_dir(&args.repo)
        .with_context(|| format!("Failed to write repository to {}", args.repo.display()))?;

    println!(
        "{} Imported in revision {}",
        label(&out, Status::Ok),
        outcome.revision
    );
    for item in &outcome.items {
        println!("   {}", item.path());
    }
    Ok(())
}
