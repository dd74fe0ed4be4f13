//! Error types for the SMART Health Card validator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of the I/O and decoding primitives the pipeline is built on.
///
/// Validation stages never surface these directly; they are folded into the
/// diagnostic [`Log`](crate::log::Log) with a matching [`ErrorCode`].
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Failed to read file: {0}")]
    FileReadError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParseError(#[from] serde_json::Error),

    #[error("Failed to build HTTP client: {0}")]
    HttpClientError(String),

    #[error("Failed to fetch {url}: {reason}")]
    FetchError { url: String, reason: String },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Signature verification failed: {0}")]
    SignatureError(String),

    #[error("Failed to decode image: {0}")]
    ImageDecodeError(String),

    #[error("Failed to convert image: {0}")]
    ImageConversionError(String),

    #[error("Invalid schema: {0}")]
    SchemaCompileError(String),

    #[error("Unknown file type: {0}")]
    UnknownFileType(String),
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Class of problem attached to a log entry.
///
/// Tests assert on these rather than on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    JsonParseError,
    SchemaError,
    FhirSchemaError,
    CriticalDataMissing,
    UnknownFileType,
    DataFileNotFound,
    InvalidBase64,
    InflationError,
    JwsHeaderError,
    JwsTooLong,
    JwsVerificationError,
    TrailingCharacters,
    NotYetValid,
    Expiration,
    IssuerKeyDownloadError,
    InvalidIssuerUrl,
    IssuerNotTrusted,
    IssuerDirectoryNotSet,
    InvalidKeySchema,
    InvalidKeyWrongKty,
    InvalidKeyWrongAlg,
    InvalidKeyWrongUse,
    InvalidKeyWrongCrv,
    InvalidKeyWrongKid,
    InvalidKeyPrivate,
    InvalidKeyUnknown,
    InvalidNumericQr,
    InvalidNumericQrHeader,
    MissingQrChunk,
    UnbalancedQrChunks,
    InvalidQrVersion,
    QrDecodeError,
    ImageConversionError,
}

impl ErrorCode {
    /// Stable numeric identifier, as printed by the CLI.
    pub fn number(self) -> u16 {
        match self {
            Self::JsonParseError => 100,
            Self::SchemaError => 101,
            Self::FhirSchemaError => 102,
            Self::CriticalDataMissing => 103,
            Self::UnknownFileType => 104,
            Self::DataFileNotFound => 105,
            Self::InvalidBase64 => 200,
            Self::InflationError => 201,
            Self::JwsHeaderError => 202,
            Self::JwsTooLong => 203,
            Self::JwsVerificationError => 204,
            Self::TrailingCharacters => 205,
            Self::NotYetValid => 206,
            Self::Expiration => 207,
            Self::IssuerKeyDownloadError => 300,
            Self::InvalidIssuerUrl => 301,
            Self::IssuerNotTrusted => 302,
            Self::IssuerDirectoryNotSet => 303,
            Self::InvalidKeySchema => 400,
            Self::InvalidKeyWrongKty => 401,
            Self::InvalidKeyWrongAlg => 402,
            Self::InvalidKeyWrongUse => 403,
            Self::InvalidKeyWrongCrv => 404,
            Self::InvalidKeyWrongKid => 405,
            Self::InvalidKeyPrivate => 406,
            Self::InvalidKeyUnknown => 407,
            Self::InvalidNumericQr => 500,
            Self::InvalidNumericQrHeader => 501,
            Self::MissingQrChunk => 502,
            Self::UnbalancedQrChunks => 503,
            Self::InvalidQrVersion => 504,
            Self::QrDecodeError => 505,
            Self::ImageConversionError => 506,
        }
    }
}
