//! Shared state of one validation run.

use std::sync::Arc;

use crate::config::ValidatorConfig;
use crate::error::Result;
use crate::fetch::{HttpFetcher, JsonFetcher};
use crate::keys::KeyStore;
use crate::log::Log;
use crate::trusted::{DirectorySource, TrustedIssuerDirectory};

/// Everything a validation stage may consult besides its input: the key
/// store, the trusted issuer directory, and the document fetcher.
///
/// Independent contexts never share keys, so parallel runs (and tests) do
/// not observe each other.
pub struct ValidationContext {
    pub config: ValidatorConfig,
    pub keys: KeyStore,
    pub directory: TrustedIssuerDirectory,
    fetcher: Arc<dyn JsonFetcher>,
}

impl ValidationContext {
    /// Context that downloads keys and directories over HTTPS.
    pub fn new(config: ValidatorConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.http_timeout)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    pub fn with_fetcher(config: ValidatorConfig, fetcher: Arc<dyn JsonFetcher>) -> Self {
        Self {
            config,
            keys: KeyStore::new(),
            directory: TrustedIssuerDirectory::new(),
            fetcher,
        }
    }

    pub fn fetcher(&self) -> &dyn JsonFetcher {
        self.fetcher.as_ref()
    }

    /// Loads the trusted issuer directory named in the configuration, if any.
    pub async fn load_trusted_directory(&self) -> Option<Log> {
        let source = DirectorySource::parse(self.config.trusted_directory.as_deref()?);
        Some(self.directory.load(&source, self.fetcher()).await)
    }
}
