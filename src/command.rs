//! External command handlers
//!
//! Request-boundary entry points for transform and import commands. They
//! route a request to the orchestrator registered for the item's
//! repository, check what must be checked before the core runs, and map
//! failures onto a small set of command error codes.

use crate::config::{ImportOptions, TransformConfig, TRANSFORM_TYPE_XSL};
use crate::error::{Error, ErrorKind};
use crate::flows::{ImportOrchestrator, TransformOrchestrator, TransformOutcome};
use crate::item::{ItemId, Repository};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Largest inline import payload, in MiB.
pub const MAX_CONTENT_SIZE_MB: usize = 5;

/// Error codes reported to command callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandErrorCode {
    /// The request itself is invalid. Retrying it unchanged is pointless.
    BadRequest,
    TransformFailed,
    ImportFailed,
}

impl fmt::Display for CommandErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            CommandErrorCode::BadRequest => "BadRequest",
            CommandErrorCode::TransformFailed => "TransformFailed",
            CommandErrorCode::ImportFailed => "ImportFailed",
        };
        f.write_str(code)
    }
}

/// Failure of a command.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct CommandError {
    pub code: CommandErrorCode,
    pub message: String,
    /// Whether the caller may retry the same request.
    pub retryable: bool,
}

impl CommandError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: CommandErrorCode::BadRequest,
            message: message.into(),
            retryable: false,
        }
    }

    fn failed(code: CommandErrorCode, error: &Error) -> Self {
        Self {
            code,
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// Response body of an import command.
#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub items: Vec<ItemId>,
}

/// Routes commands to per-repository orchestrators.
#[derive(Default)]
pub struct CommandHandler {
    transforms: HashMap<Repository, Arc<TransformOrchestrator>>,
    imports: HashMap<Repository, Arc<ImportOrchestrator>>,
}

impl CommandHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_transform(
        &mut self,
        repository: Repository,
        orchestrator: Arc<TransformOrchestrator>,
    ) {
        self.transforms.insert(repository, orchestrator);
    }

    pub fn register_import(&mut self, repository: Repository, orchestrator: Arc<ImportOrchestrator>) {
        self.imports.insert(repository, orchestrator);
    }

    /// Run a transform command for `item`.
    pub fn handle_transform(
        &self,
        item: &ItemId,
        config: &TransformConfig,
    ) -> Result<TransformOutcome, CommandError> {
        let options = config.options.as_ref().ok_or_else(|| {
            CommandError::bad_request("TransformConfig / TransformConfigOptions must not be null.")
        })?;
        if options.kind != TRANSFORM_TYPE_XSL {
            return Err(CommandError::bad_request(format!(
                "Transform is not a supported type: {}",
                options.kind
            )));
        }
        let orchestrator = self.transforms.get(item.repository()).ok_or_else(|| {
            CommandError::bad_request(format!("Unknown repository: {}", item.repository()))
        })?;

        match orchestrator.transform(item, config) {
            Ok(outcome) => {
                debug!("Transformed with config: '{}'", config.name);
                Ok(outcome)
            }
            Err(e) => {
                error!("Transform failed '{}': {}", config.name, e);
                Err(CommandError::failed(CommandErrorCode::TransformFailed, &e))
            }
        }
    }

    /// Run an import command for the folder `item`, with a JSON request
    /// body. Returns the JSON response body.
    pub fn handle_import(&self, item: &ItemId, body: &str) -> Result<String, CommandError> {
        let options: ImportOptions = serde_json::from_str(body).map_err(|e| {
            warn!("Request with invalid JSON body for item {}: {}", item, e);
            CommandError::bad_request(format!("Failed to parse request body: {}", e))
        })?;

        match (&options.url, &options.content) {
            (Some(_), None) => {}
            (None, Some(content)) if content.len() <= MAX_CONTENT_SIZE_MB * 1024 * 1024 => {}
            (None, Some(_)) => {
                return Err(CommandError::bad_request(format!(
                    "Largest allowed content size is {} MBs.",
                    MAX_CONTENT_SIZE_MB
                )));
            }
            _ => {
                return Err(CommandError::bad_request(
                    "Import requires either a valid URL or content.",
                ));
            }
        }

        let orchestrator = self.imports.get(item.repository()).ok_or_else(|| {
            CommandError::bad_request(format!("Unknown repository: {}", item.repository()))
        })?;

        info!(
            "Starting import for item: {} from {}",
            item,
            options.url.as_deref().unwrap_or("inline content")
        );
        let outcome = orchestrator.import(item, &options).map_err(|e| {
            let message = format!("Import failed for item: {} - {}", item, e);
            match e.kind() {
                ErrorKind::Configuration | ErrorKind::Precondition | ErrorKind::Conflict => {
                    warn!("{}", message);
                    CommandError::bad_request(message)
                }
                ErrorKind::Transient | ErrorKind::Internal => {
                    error!("{}", message);
                    CommandError {
                        code: CommandErrorCode::ImportFailed,
                        message,
                        retryable: e.is_retryable(),
                    }
                }
            }
        })?;
        info!("Import completed successfully for item: {}", item);

        serde_json::to_string(&ImportResponse {
            items: outcome.items,
        })
        .map_err(|e| CommandError::failed(CommandErrorCode::ImportFailed, &Error::from(e)))
    }
}
