//! Streaming, callback-driven walker over one plugin file.
//!
//! The [`Reader`] never builds a tree. It reports groups, forms and chunks to
//! a [`ReaderHandler`] as it meets them, and the handler's answers decide
//! whether the reader descends into an element or skips its declared span.
//!
//! Every size field is checked against the bytes that remain in its enclosing
//! span before anything is read, so malformed input ends in a
//! [`DecodeError`] rather than a panic.

use crate::cursor::Cursor;
use crate::format::{FormData, FormatEra, GroupData, GroupKind};
use crate::type_code::TypeCode;
use flate2::read::ZlibDecoder;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Upper bound on the buffer reserved up front for a decompressed body.
const MAX_PREALLOCATION: usize = 16 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure to decode a single plugin file.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Truncated header, size field overrunning its span, unknown group kind.
    #[error("malformed plugin data at offset {offset:#x}: {reason}")]
    Malformed { offset: u64, reason: String },

    /// A compressed form body could not be inflated.
    #[error("failed to decompress form body at offset {offset:#x}")]
    Decompression {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// The first record is neither `TES4` nor `TES3`.
    #[error("unsupported file header '{0}'")]
    UnsupportedHeader(TypeCode),

    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Receives structural events from a [`Reader`].
///
/// `end_group` / `end_form` are only called for elements the handler accepted.
pub trait ReaderHandler {
    /// Return `true` to descend into the group.
    fn group(&mut self, group: &GroupData) -> bool;

    fn end_group(&mut self) {}

    /// Return `true` to have the form body decoded into chunks.
    fn form(&mut self, form: &FormData) -> bool;

    fn end_form(&mut self) {}

    /// Return `true` to receive the chunk's bytes.
    fn chunk(&mut self, chunk_type: TypeCode) -> bool;

    /// Called after an accepted chunk; `data` covers exactly the chunk body.
    fn chunk_data(&mut self, chunk_type: TypeCode, data: &mut Cursor<'_>)
    -> Result<(), DecodeError>;

    /// Return `true` to stop the walk early.
    fn finished(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Walks a plugin's bytes. The era is auto-detected unless one is declared.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reader {
    era: Option<FormatEra>,
}

impl Reader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_era(era: Option<FormatEra>) -> Self {
        Self { era }
    }

    /// Read a file from disk and walk it.
    pub fn parse_file<H: ReaderHandler>(
        &self,
        path: &Path,
        handler: &mut H,
    ) -> Result<FormatEra, DecodeError> {
        let bytes = std::fs::read(path).map_err(|source| DecodeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse(&bytes, handler)
    }

    /// Walk `bytes`, returning the era that was used.
    pub fn parse<H: ReaderHandler>(
        &self,
        bytes: &[u8],
        handler: &mut H,
    ) -> Result<FormatEra, DecodeError> {
        let detected = FormatEra::detect(bytes)?;
        let era = self.era.unwrap_or(detected);
        let walk = Walk { era };
        let mut cursor = Cursor::new(bytes);
        while !cursor.is_empty() && !handler.finished() {
            walk.record(&mut cursor, handler)?;
        }
        Ok(era)
    }
}

struct Walk {
    era: FormatEra,
}

impl Walk {
    fn record<H: ReaderHandler>(
        &self,
        cursor: &mut Cursor<'_>,
        handler: &mut H,
    ) -> Result<(), DecodeError> {
        let header_size = self.era.header_size();
        if cursor.remaining() < header_size {
            return Err(DecodeError::Malformed {
                offset: cursor.offset(),
                reason: format!(
                    "truncated record header ({} of {header_size} bytes)",
                    cursor.remaining()
                ),
            });
        }
        let mut header = cursor.take(header_size)?;
        let record_type = header.read_type_code()?;
        let size = header.read_u32()?;

        if record_type == TypeCode::GRUP && self.era.has_groups() {
            self.group(header, size, cursor, handler)
        } else {
            self.form(record_type, header, size, cursor, handler)
        }
    }

    fn group<H: ReaderHandler>(
        &self,
        mut header: Cursor<'_>,
        size: u32,
        cursor: &mut Cursor<'_>,
        handler: &mut H,
    ) -> Result<(), DecodeError> {
        let start = header.offset() - 8;
        let label = header.read_u32()?;
        let raw_kind = header.read_i32()?;
        let kind = GroupKind::try_from(raw_kind).map_err(|kind| DecodeError::Malformed {
            offset: start,
            reason: format!("unknown group kind {kind}"),
        })?;

        // A group's size includes its own header.
        let header_size = self.era.header_size();
        let body_len = (size as usize)
            .checked_sub(header_size)
            .ok_or_else(|| DecodeError::Malformed {
                offset: start,
                reason: format!("group size {size} is smaller than its header"),
            })?;
        let mut body = cursor.take(body_len)?;

        let group = GroupData::new(label, kind);
        if handler.group(&group) {
            while !body.is_empty() && !handler.finished() {
                self.record(&mut body, handler)?;
            }
            handler.end_group();
        }
        Ok(())
    }

    fn form<H: ReaderHandler>(
        &self,
        form_type: TypeCode,
        mut header: Cursor<'_>,
        size: u32,
        cursor: &mut Cursor<'_>,
        handler: &mut H,
    ) -> Result<(), DecodeError> {
        let (flags, form_id) = match self.era {
            FormatEra::Morrowind => {
                header.skip(4)?;
                (header.read_u32()?, 0)
            }
            _ => (header.read_u32()?, header.read_u32()?),
        };
        let mut body = cursor.take(size as usize)?;

        let form = FormData {
            form_type,
            flags,
            form_id,
            data_size: size,
        };
        if !handler.form(&form) {
            return Ok(());
        }

        if form.is_compressed() && self.era != FormatEra::Morrowind {
            let base = body.offset();
            let inflated = inflate(&mut body)?;
            self.chunks(Cursor::with_base(&inflated, base), handler)?;
        } else {
            self.chunks(body, handler)?;
        }
        handler.end_form();
        Ok(())
    }

    fn chunks<H: ReaderHandler>(
        &self,
        mut body: Cursor<'_>,
        handler: &mut H,
    ) -> Result<(), DecodeError> {
        let header_size = self.era.chunk_header_size();
        let wide = self.era == FormatEra::Morrowind;
        let mut oversized: Option<u32> = None;

        while !body.is_empty() {
            if body.remaining() < header_size {
                return Err(DecodeError::Malformed {
                    offset: body.offset(),
                    reason: format!(
                        "truncated chunk header ({} of {header_size} bytes)",
                        body.remaining()
                    ),
                });
            }
            let chunk_type = body.read_type_code()?;
            let declared = if wide {
                body.read_u32()?
            } else {
                u32::from(body.read_u16()?)
            };

            if chunk_type == TypeCode::XXXX && !wide && declared == 4 {
                oversized = Some(body.read_u32()?);
                continue;
            }

            let len = oversized.take().unwrap_or(declared);
            let mut data = body.take(len as usize)?;
            if handler.chunk(chunk_type) {
                handler.chunk_data(chunk_type, &mut data)?;
            }
        }
        Ok(())
    }
}

/// Inflate a compressed form body: a 32-bit decompressed length followed by
/// a zlib stream.
fn inflate(body: &mut Cursor<'_>) -> Result<Vec<u8>, DecodeError> {
    let offset = body.offset();
    let expected = body.read_u32()? as usize;
    let mut out = Vec::with_capacity(expected.min(MAX_PREALLOCATION));
    ZlibDecoder::new(body.rest())
        .take(expected as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|source| DecodeError::Decompression { offset, source })?;
    if out.len() != expected {
        return Err(DecodeError::Decompression {
            offset,
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("expected {expected} bytes, inflated {}", out.len()),
            ),
        });
    }
    Ok(out)
}
