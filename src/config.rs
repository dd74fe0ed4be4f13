//! Configuration for a validation run.

use std::time::Duration;

/// Configuration for the validator.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Timeout for issuer key and directory downloads.
    pub http_timeout: Duration,
    /// Trusted issuer directory: `VCI`, an URL, or a path to a local file.
    pub trusted_directory: Option<String>,
    /// Longest side, in pixels, SVG images are rasterized to before QR decoding.
    pub svg_raster_size: u32,
    /// Highest QR version accepted for a single health card chunk.
    pub max_qr_version: usize,
    /// Unix time used for `nbf`/`exp` checks; the system clock when unset.
    pub now: Option<i64>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(10),
            trusted_directory: None,
            svg_raster_size: 800,
            max_qr_version: 22,
            now: None,
        }
    }
}

impl ValidatorConfig {
    pub(crate) fn now(&self) -> i64 {
        self.now.unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0)
        })
    }
}
