//! Trusted issuer directory.
//!
//! An optional allow-list of issuer URLs, loaded at most once per context.

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{ErrorCode, ValidationError};
use crate::fetch::JsonFetcher;
use crate::log::Log;
use crate::schema::{validate_schema, Schema};

/// Well-known location of the VCI participating issuers list.
pub const VCI_DIRECTORY_URL: &str =
    "https://raw.githubusercontent.com/the-commons-project/vci-directory/main/vci-issuers.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedIssuer {
    pub iss: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustedIssuers {
    pub participating_issuers: Vec<TrustedIssuer>,
}

impl TrustedIssuers {
    pub fn find(&self, iss: &str) -> Option<&TrustedIssuer> {
        self.participating_issuers.iter().find(|p| p.iss == iss)
    }
}

/// Where a directory document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectorySource {
    Vci,
    Url(String),
    File(PathBuf),
}

impl DirectorySource {
    /// `VCI` (any case) names the VCI directory; `http(s)://` values are URLs;
    /// anything else is a file path.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("vci") {
            Self::Vci
        } else if value.starts_with("https://") || value.starts_with("http://") {
            Self::Url(value.to_string())
        } else {
            Self::File(PathBuf::from(value))
        }
    }

    async fn load(&self, fetcher: &dyn JsonFetcher) -> Result<Value, ValidationError> {
        match self {
            Self::Vci => fetcher.fetch_json(VCI_DIRECTORY_URL).await,
            Self::Url(url) => fetcher.fetch_json(url).await,
            Self::File(path) => {
                let text = tokio::fs::read_to_string(path).await?;
                Ok(serde_json::from_str(&text)?)
            }
        }
    }
}

impl fmt::Display for DirectorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vci => f.write_str("VCI"),
            Self::Url(url) => f.write_str(url),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug)]
struct LoadedDirectory {
    name: String,
    issuers: TrustedIssuers,
}

/// Directory state for one run: never requested, requested but unavailable,
/// or loaded.
#[derive(Debug, Default)]
pub struct TrustedIssuerDirectory {
    state: OnceLock<Option<LoadedDirectory>>,
}

impl TrustedIssuerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a directory was configured, even if loading it failed.
    pub fn is_requested(&self) -> bool {
        self.state.get().is_some()
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state.get(), Some(Some(_)))
    }

    /// Installs an already parsed directory. Returns `false` if a directory
    /// was set before.
    pub fn set(&self, name: impl Into<String>, issuers: TrustedIssuers) -> bool {
        self.state
            .set(Some(LoadedDirectory {
                name: name.into(),
                issuers,
            }))
            .is_ok()
    }

    /// Loads the directory from `source`. A failed load still counts as the
    /// one allowed configuration, so later checks report it as unavailable.
    pub async fn load(&self, source: &DirectorySource, fetcher: &dyn JsonFetcher) -> Log {
        let mut log = Log::new("Trusted issuer directory");
        if self.is_requested() {
            log.debug(format!(
                "Trusted issuer directory already configured; ignoring {}",
                source
            ));
            return log;
        }

        let loaded = match source.load(fetcher).await {
            Ok(document) => parse_directory(document, &mut log),
            Err(e) => {
                warn!(source = %source, error = %e, "Trusted issuer directory unavailable");
                log.error(
                    format!("Failed to load trusted issuer directory {}: {}", source, e),
                    ErrorCode::IssuerDirectoryNotSet,
                );
                None
            }
        };

        if let Some(issuers) = &loaded {
            info!(
                source = %source,
                issuers = issuers.participating_issuers.len(),
                "Trusted issuer directory loaded"
            );
            log.info(format!(
                "Loaded {} trusted issuers from {}",
                issuers.participating_issuers.len(),
                source
            ));
        }

        let state = loaded.map(|issuers| LoadedDirectory {
            name: source.to_string(),
            issuers,
        });
        // a concurrent load may have won; its state stands
        let _ = self.state.set(state);
        log
    }

    /// Logs whether `iss` is a participant of the configured directory.
    pub fn check(&self, iss: &str, log: &mut Log) {
        match self.state.get() {
            Some(Some(directory)) => match directory.issuers.find(iss) {
                Some(issuer) => log.debug(format!(
                    "Issuer found in trusted directory '{}' (name: {})",
                    directory.name, issuer.name
                )),
                None => log.error(
                    format!(
                        "Issuer '{}' is not part of the trusted directory '{}'",
                        iss, directory.name
                    ),
                    ErrorCode::IssuerNotTrusted,
                ),
            },
            _ => log.error(
                "Trusted issuer directory is not available",
                ErrorCode::IssuerDirectoryNotSet,
            ),
        }
    }
}

fn parse_directory(document: Value, log: &mut Log) -> Option<TrustedIssuers> {
    if !validate_schema(Schema::TrustedIssuers, &document, ErrorCode::SchemaError, log) {
        log.error(
            "Trusted issuer directory does not match the expected structure",
            ErrorCode::IssuerDirectoryNotSet,
        );
        return None;
    }
    match serde_json::from_value(document) {
        Ok(issuers) => Some(issuers),
        Err(e) => {
            log.error(
                format!("Failed to parse trusted issuer directory: {}", e),
                ErrorCode::IssuerDirectoryNotSet,
            );
            None
        }
    }
}
