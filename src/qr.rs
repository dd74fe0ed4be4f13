//! Numeric QR payloads: `shc:/` followed by digit pairs.
//!
//! A token too long for one QR code is split into chunks carrying
//! `shc:/<index>/<total>/` headers. Chunks are reassembled in index order
//! before the digits are turned back into the compact token.

use std::collections::BTreeMap;

use tracing::debug;

use crate::context::ValidationContext;
use crate::error::ErrorCode;
use crate::jws::{self, CompactToken};
use crate::log::{Log, ValidationResult};

pub const NUMERIC_QR_PREFIX: &str = "shc:/";

/// Each character is encoded as its code point minus this offset.
pub const CHAR_OFFSET: u8 = 45;

/// Largest digit pair that maps into the base64url alphabet (`z`).
pub const MAX_PAIR_VALUE: u8 = b'z' - CHAR_OFFSET;

/// Chunk lengths may differ by this many digits before they count as unbalanced.
const BALANCE_TOLERANCE: usize = 2;

/// Missing chunk indices named in a log message before the rest are counted.
const MAX_LISTED_MISSING: usize = 10;

struct Chunk<'a> {
    index: usize,
    total: usize,
    digits: &'a str,
}

/// Decodes one or more numeric QR chunks into the token they carry and
/// validates that token.
pub async fn validate(chunks: &[String], ctx: &ValidationContext) -> ValidationResult<CompactToken> {
    let mut log = Log::new("QR numeric");

    let Some(jws) = decode(chunks, &mut log) else {
        return ValidationResult::failed(log);
    };

    let result = jws::validate(&jws, ctx).await;
    log.add_child(result.log);
    ValidationResult::new(result.result, log)
}

/// Reassembles `chunks` and decodes the digits. Returns `None` after logging
/// a fatal entry when the chunks cannot be turned into text.
pub fn decode(chunks: &[String], log: &mut Log) -> Option<String> {
    if chunks.is_empty() {
        log.fatal("No numeric QR data", ErrorCode::InvalidNumericQr);
        return None;
    }

    let mut parsed = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let trimmed = chunk.trim();
        if trimmed.len() != chunk.len() {
            log.warn(
                "Numeric QR data has leading or trailing whitespace",
                ErrorCode::TrailingCharacters,
            );
        }
        parsed.push(parse_header(trimmed, log)?);
    }

    let digits = if parsed.len() == 1 {
        let chunk = &parsed[0];
        match chunk.total {
            1 if chunk.index == 0 => chunk.digits.to_string(),
            1 => {
                log.fatal(
                    "Single numeric QR code must not use a chunked 'shc:/1/1/' header",
                    ErrorCode::InvalidNumericQrHeader,
                );
                return None;
            }
            total => {
                log.fatal(
                    format!("Numeric QR chunk 1 of {} found, other chunks are missing", total),
                    ErrorCode::MissingQrChunk,
                );
                return None;
            }
        }
    } else {
        reassemble(&parsed, log)?
    };

    decode_digits(&digits, log)
}

fn parse_header<'a>(chunk: &'a str, log: &mut Log) -> Option<Chunk<'a>> {
    let Some(body) = chunk.strip_prefix(NUMERIC_QR_PREFIX) else {
        log.fatal(
            format!("Numeric QR data must start with '{}'", NUMERIC_QR_PREFIX),
            ErrorCode::InvalidNumericQrHeader,
        );
        return None;
    };

    let mut fields = body.splitn(3, '/');
    match (fields.next(), fields.next(), fields.next()) {
        (Some(digits), None, None) => Some(Chunk {
            index: 0,
            total: 1,
            digits,
        }),
        (Some(index), Some(total), Some(digits)) => {
            match (index.parse::<usize>(), total.parse::<usize>()) {
                (Ok(index), Ok(total)) if index >= 1 && index <= total => Some(Chunk {
                    index,
                    total,
                    digits,
                }),
                _ => {
                    log.fatal(
                        format!("Invalid numeric QR chunk header 'shc:/{}/{}/'", index, total),
                        ErrorCode::InvalidNumericQrHeader,
                    );
                    None
                }
            }
        }
        _ => {
            log.fatal(
                "Numeric QR chunk header must be 'shc:/<index>/<total>/'",
                ErrorCode::InvalidNumericQrHeader,
            );
            None
        }
    }
}

fn reassemble(chunks: &[Chunk<'_>], log: &mut Log) -> Option<String> {
    let total = chunks[0].total;
    if chunks.iter().any(|c| c.index == 0) {
        log.fatal(
            "Every numeric QR code of a split token needs a 'shc:/<index>/<total>/' header",
            ErrorCode::InvalidNumericQrHeader,
        );
        return None;
    }
    if chunks.iter().any(|c| c.total != total) {
        log.fatal(
            "Numeric QR chunks disagree on the number of chunks",
            ErrorCode::InvalidNumericQrHeader,
        );
        return None;
    }

    // `total` comes from the input; only the chunks actually present are stored.
    let mut slots: BTreeMap<usize, &str> = BTreeMap::new();
    for chunk in chunks {
        if slots.contains_key(&chunk.index) {
            log.error(
                format!("Numeric QR chunk {} appears more than once", chunk.index),
                ErrorCode::InvalidNumericQrHeader,
            );
            continue;
        }
        slots.insert(chunk.index, chunk.digits);
    }

    let missing_count = total - slots.len();
    if missing_count > 0 {
        let listed: Vec<String> = (1..=total)
            .filter(|i| !slots.contains_key(i))
            .take(MAX_LISTED_MISSING)
            .map(|i| i.to_string())
            .collect();
        let missing = if missing_count > listed.len() {
            format!("{}, ... ({} in all)", listed.join(", "), missing_count)
        } else {
            listed.join(", ")
        };
        log.fatal(
            format!("Missing numeric QR chunk(s) {} of {}", missing, total),
            ErrorCode::MissingQrChunk,
        );
        return None;
    }

    let ordered: Vec<&str> = slots.into_values().collect();
    let longest = ordered.iter().map(|d| d.len()).max().unwrap_or(0);
    let shortest = ordered.iter().map(|d| d.len()).min().unwrap_or(0);
    if longest - shortest > BALANCE_TOLERANCE {
        log.warn(
            format!(
                "Numeric QR chunks are unbalanced: {} to {} digits",
                shortest, longest
            ),
            ErrorCode::UnbalancedQrChunks,
        );
    }

    debug!(chunks = total, "Numeric QR chunks reassembled");
    Some(ordered.concat())
}

fn decode_digits(digits: &str, log: &mut Log) -> Option<String> {
    if digits.is_empty() {
        log.fatal("Numeric QR data is empty", ErrorCode::InvalidNumericQr);
        return None;
    }
    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_digit()) {
        log.fatal(
            format!("Numeric QR data contains non-digit character '{}'", bad),
            ErrorCode::InvalidNumericQr,
        );
        return None;
    }
    if digits.len() % 2 != 0 {
        log.fatal(
            format!(
                "Numeric QR data has an odd number of digits ({}), expected pairs",
                digits.len()
            ),
            ErrorCode::InvalidNumericQr,
        );
        return None;
    }

    let mut out = String::with_capacity(digits.len() / 2);
    let mut out_of_range = 0usize;
    for pair in digits.as_bytes().chunks_exact(2) {
        let value = (pair[0] - b'0') * 10 + (pair[1] - b'0');
        if value > MAX_PAIR_VALUE {
            out_of_range += 1;
        }
        out.push(char::from(value + CHAR_OFFSET));
    }
    if out_of_range > 0 {
        log.error(
            format!(
                "{} digit pair(s) exceed {} and do not map to base64url characters",
                out_of_range, MAX_PAIR_VALUE
            ),
            ErrorCode::InvalidNumericQr,
        );
    }
    Some(out)
}
