//! Self-describing binary layout for sequence columns.
//!
//! # Layout
//! `[kind: u8][count: u32 LE][payload]`
//! - kind `f`: `count` little-endian `f64` values.
//! - kind `l`: `count` tagged axis labels, `0` + `i64` LE for integer points,
//!   `1` + `u32` LE byte length + UTF-8 bytes for text points.
//!
//! # Invariants
//! - Decoding consumes the whole buffer; trailing bytes are an error.
//! - The element count always matches the decoded sequence length.

use crate::model::axis::AxisLabel;
use std::error::Error;
use std::fmt::{Display, Formatter};

const KIND_FLOATS: u8 = b'f';
const KIND_LABELS: u8 = b'l';
const LABEL_INTEGER: u8 = 0;
const LABEL_TEXT: u8 = 1;

/// Errors raised while encoding or decoding a sequence column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Sequence or text element does not fit a `u32` length prefix.
    TooLong(usize),
    /// Buffer header declares a different sequence kind.
    WrongKind { expected: u8, found: u8 },
    /// Buffer ended before the declared payload was read.
    Truncated,
    /// Buffer has bytes left after the declared payload.
    TrailingBytes(usize),
    UnknownLabelTag(u8),
    InvalidUtf8,
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLong(len) => write!(f, "sequence length {len} exceeds u32 prefix"),
            Self::WrongKind { expected, found } => write!(
                f,
                "expected sequence kind `{}`, found `{}`",
                char::from(*expected),
                char::from(*found)
            ),
            Self::Truncated => write!(f, "sequence payload is truncated"),
            Self::TrailingBytes(count) => write!(f, "{count} trailing bytes after sequence"),
            Self::UnknownLabelTag(tag) => write!(f, "unknown axis label tag {tag}"),
            Self::InvalidUtf8 => write!(f, "axis label text is not valid UTF-8"),
        }
    }
}

impl Error for CodecError {}

pub fn encode_floats(values: &[f64]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(5 + values.len() * 8);
    write_header(&mut out, KIND_FLOATS, values.len())?;
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    Ok(out)
}

pub fn decode_floats(bytes: &[u8]) -> Result<Vec<f64>, CodecError> {
    let mut reader = Reader::new(bytes);
    let count = reader.header(KIND_FLOATS)?;
    let mut values = Vec::with_capacity(count.min(bytes.len() / 8));
    for _ in 0..count {
        values.push(f64::from_le_bytes(reader.array::<8>()?));
    }
    reader.finish()?;
    Ok(values)
}

pub fn encode_labels(labels: &[AxisLabel]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(5 + labels.len() * 9);
    write_header(&mut out, KIND_LABELS, labels.len())?;
    for label in labels {
        match label {
            AxisLabel::Integer(value) => {
                out.push(LABEL_INTEGER);
                out.extend_from_slice(&value.to_le_bytes());
            }
            AxisLabel::Text(text) => {
                out.push(LABEL_TEXT);
                out.extend_from_slice(&length_prefix(text.len())?);
                out.extend_from_slice(text.as_bytes());
            }
        }
    }
    Ok(out)
}

pub fn decode_labels(bytes: &[u8]) -> Result<Vec<AxisLabel>, CodecError> {
    let mut reader = Reader::new(bytes);
    let count = reader.header(KIND_LABELS)?;
    let mut labels = Vec::with_capacity(count.min(bytes.len()));
    for _ in 0..count {
        let label = match reader.byte()? {
            LABEL_INTEGER => AxisLabel::Integer(i64::from_le_bytes(reader.array::<8>()?)),
            LABEL_TEXT => {
                let len = u32::from_le_bytes(reader.array::<4>()?) as usize;
                let raw = reader.take(len)?;
                let text = std::str::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)?;
                AxisLabel::Text(text.to_string())
            }
            other => return Err(CodecError::UnknownLabelTag(other)),
        };
        labels.push(label);
    }
    reader.finish()?;
    Ok(labels)
}

fn write_header(out: &mut Vec<u8>, kind: u8, len: usize) -> Result<(), CodecError> {
    out.push(kind);
    out.extend_from_slice(&length_prefix(len)?);
    Ok(())
}

fn length_prefix(len: usize) -> Result<[u8; 4], CodecError> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| CodecError::TooLong(len))
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn header(&mut self, expected: u8) -> Result<usize, CodecError> {
        let found = self.byte()?;
        if found != expected {
            return Err(CodecError::WrongKind { expected, found });
        }
        Ok(u32::from_le_bytes(self.array::<4>()?) as usize)
    }

    fn byte(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(len).ok_or(CodecError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(CodecError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn finish(self) -> Result<(), CodecError> {
        match self.bytes.len() - self.pos {
            0 => Ok(()),
            rest => Err(CodecError::TrailingBytes(rest)),
        }
    }
}
