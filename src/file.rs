//! Input artefacts and their types.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Result, ValidationError};

/// What kind of artefact an input file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Numeric QR text, `shc:/...`, one chunk per file.
    QrNumeric,
    /// QR code image: PNG, JPEG, BMP or SVG.
    Qr,
    Jws,
    JwsPayload,
    FhirBundle,
    HealthCard,
    /// FHIR `Parameters` resource returned by a `$health-cards-issue` operation.
    FhirHealthCard,
    JwkSet,
}

impl FileType {
    pub const ALL: [FileType; 8] = [
        FileType::QrNumeric,
        FileType::Qr,
        FileType::Jws,
        FileType::JwsPayload,
        FileType::FhirBundle,
        FileType::HealthCard,
        FileType::FhirHealthCard,
        FileType::JwkSet,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FileType::QrNumeric => "qrnumeric",
            FileType::Qr => "qr",
            FileType::Jws => "jws",
            FileType::JwsPayload => "jwspayload",
            FileType::FhirBundle => "fhirbundle",
            FileType::HealthCard => "healthcard",
            FileType::FhirHealthCard => "fhirhealthcard",
            FileType::JwkSet => "jwkset",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FileType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.to_ascii_lowercase();
        FileType::ALL
            .into_iter()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| ValidationError::UnknownFileType(s.to_string()))
    }
}

/// Image encodings the QR decoder accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Png,
    Jpeg,
    Bmp,
    Svg,
}

impl ImageKind {
    /// Detects the encoding from the leading bytes, falling back to the
    /// file extension.
    pub fn sniff(buffer: &[u8], name: &str) -> Option<Self> {
        if buffer.starts_with(b"\x89PNG\r\n\x1a\n") {
            return Some(ImageKind::Png);
        }
        if buffer.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ImageKind::Jpeg);
        }
        if buffer.starts_with(b"BM") {
            return Some(ImageKind::Bmp);
        }
        let head = &buffer[..buffer.len().min(1024)];
        if String::from_utf8_lossy(head).contains("<svg") {
            return Some(ImageKind::Svg);
        }

        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)?;
        match extension.as_str() {
            "png" => Some(ImageKind::Png),
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            "bmp" => Some(ImageKind::Bmp),
            "svg" => Some(ImageKind::Svg),
            _ => None,
        }
    }
}

/// One input artefact.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub name: String,
    pub path: Option<PathBuf>,
    pub buffer: Vec<u8>,
    /// Set when the buffer looks like an image.
    pub image: Option<ImageKind>,
}

impl FileInfo {
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let buffer = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mut info = Self::from_bytes(name, buffer);
        info.path = Some(path.to_path_buf());
        Ok(info)
    }

    pub fn from_bytes(name: impl Into<String>, buffer: Vec<u8>) -> Self {
        let name = name.into();
        let image = ImageKind::sniff(&buffer, &name);
        Self {
            name,
            path: None,
            buffer,
            image,
        }
    }

    pub fn from_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::from_bytes(name, text.into().into_bytes())
    }

    /// The buffer as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }
}
