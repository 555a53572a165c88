//! Body normalization: gzip layer peeling, XML charset sniffing and text decoding.
//!
//! All of these are explicit transforms applied by the client before a body is
//! classified or handed out, never hidden inside the transport.
//!
//! Some endpoints gzip an already gzipped payload. [`GzipLayers`] sniffs the
//! gzip magic at the start of the stream and again after the first layer,
//! and peels at most [`MAX_GZIP_LAYERS`] layers. Whatever comes out of the
//! last layer is final.

use std::io::{self, Write};
use std::mem;
use std::sync::LazyLock;

use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};
use flate2::write::GzDecoder;
use futures::stream::{self, StreamExt};
use regex::bytes::Regex;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE, HeaderMap};
use tracing::{debug, warn};

use crate::error::TransportErrorKind;
use crate::host::BodyStream;

/// The two leading bytes of every gzip member.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// The declared layer plus one extra.
pub const MAX_GZIP_LAYERS: u8 = 2;

/// How far into the body an XML declaration is looked for.
pub const XML_DECLARATION_WINDOW: usize = 128;

static XML_ENCODING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*<\?xml[^>]*?\sencoding\s*=\s*["']([A-Za-z][A-Za-z0-9._-]*)["']"#)
        .expect("Invalid regex")
});

// ============================================================================
// Gzip
// ============================================================================

/// Returns true if the headers announce gzip, directly or via octet-stream.
pub fn declares_gzip(headers: &HeaderMap) -> bool {
    let header_contains = |name, needle: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().contains(needle))
    };
    header_contains(CONTENT_ENCODING, "gzip")
        || header_contains(CONTENT_TYPE, "application/octet-stream")
}

/// Incremental gzip decoder that peels a bounded number of layers.
pub struct GzipLayers {
    stage: Stage,
    layers_left: u8,
}

enum Stage {
    /// Fewer than two bytes seen; not yet known whether this is gzip.
    Sniffing(Vec<u8>),
    /// Not gzip; bytes pass through.
    Plain,
    /// Decoding one layer and feeding the result to the next.
    Gzip {
        member: Member,
        inner: Box<GzipLayers>,
    },
}

/// Position within a gzip layer made of one or more members.
enum Member {
    /// Inside a member.
    Open(GzDecoder<Vec<u8>>),
    /// A member ended; fewer than two bytes seen since.
    Ended(Vec<u8>),
    /// Non-gzip bytes followed the last member; the rest is dropped.
    Trailing,
}

impl GzipLayers {
    /// Creates a decoder that peels at most `max_layers` layers.
    pub fn new(max_layers: u8) -> Self {
        Self {
            stage: Stage::Sniffing(Vec::new()),
            layers_left: max_layers,
        }
    }

    /// Feeds a chunk and returns whatever output is ready.
    pub fn push(&mut self, chunk: &[u8]) -> io::Result<Vec<u8>> {
        match &mut self.stage {
            Stage::Plain => Ok(chunk.to_vec()),
            Stage::Gzip { member, inner } => push_member(member, inner, chunk),
            Stage::Sniffing(pending) => {
                pending.extend_from_slice(chunk);
                if pending.len() < GZIP_MAGIC.len() {
                    return Ok(Vec::new());
                }
                let pending = mem::take(pending);
                if self.layers_left > 0 && pending.starts_with(&GZIP_MAGIC) {
                    debug!(layers_left = self.layers_left, "Peeling gzip layer");
                    self.stage = Stage::Gzip {
                        member: Member::Open(GzDecoder::new(Vec::new())),
                        inner: Box::new(GzipLayers::new(self.layers_left - 1)),
                    };
                    self.push(&pending)
                } else {
                    self.stage = Stage::Plain;
                    Ok(pending)
                }
            }
        }
    }

    /// Flushes at end of input.
    pub fn finish(&mut self) -> io::Result<Vec<u8>> {
        match mem::replace(&mut self.stage, Stage::Plain) {
            Stage::Plain => Ok(Vec::new()),
            Stage::Sniffing(pending) => Ok(pending),
            Stage::Gzip { member, mut inner } => {
                let mut out = match member {
                    Member::Open(mut decoder) => {
                        decoder.try_finish()?;
                        inner.push(&mem::take(decoder.get_mut()))?
                    }
                    Member::Ended(_) | Member::Trailing => Vec::new(),
                };
                out.extend(inner.finish()?);
                Ok(out)
            }
        }
    }
}

/// Feeds a chunk to one gzip layer.
///
/// A decoder that has seen the member trailer accepts no more input. What
/// follows is either another member, decoded into the same layer, or junk
/// that is dropped.
fn push_member(member: &mut Member, inner: &mut GzipLayers, chunk: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut rest = chunk;
    while !rest.is_empty() {
        match member {
            Member::Open(decoder) => {
                let written = decoder.write(rest)?;
                if written == 0 {
                    decoder.try_finish()?;
                    out.extend(inner.push(&mem::take(decoder.get_mut()))?);
                    *member = Member::Ended(Vec::new());
                }
                rest = &rest[written..];
            }
            Member::Ended(pending) => {
                pending.extend_from_slice(rest);
                if pending.len() < GZIP_MAGIC.len() {
                    return Ok(out);
                }
                let pending = mem::take(pending);
                if pending.starts_with(&GZIP_MAGIC) {
                    debug!("Decoding concatenated gzip member");
                    *member = Member::Open(GzDecoder::new(Vec::new()));
                    out.extend(push_member(member, inner, &pending)?);
                } else {
                    debug!(bytes = pending.len(), "Ignoring bytes after gzip trailer");
                    *member = Member::Trailing;
                }
                return Ok(out);
            }
            Member::Trailing => return Ok(out),
        }
    }
    if let Member::Open(decoder) = member {
        out.extend(inner.push(&mem::take(decoder.get_mut()))?);
    }
    Ok(out)
}

/// Decompresses a whole buffer. Mostly useful for saved bodies and tests.
pub fn gunzip_bytes(body: &[u8]) -> io::Result<Vec<u8>> {
    let mut layers = GzipLayers::new(MAX_GZIP_LAYERS);
    let mut out = layers.push(body)?;
    out.extend(layers.finish()?);
    Ok(out)
}

/// Wraps a body stream with [`GzipLayers`].
pub fn decompress(body: BodyStream) -> BodyStream {
    let state = (body, Some(GzipLayers::new(MAX_GZIP_LAYERS)));
    stream::unfold(state, |(mut body, mut layers)| async move {
        let decoder = layers.as_mut()?;
        loop {
            match body.next().await {
                Some(Ok(chunk)) => match decoder.push(&chunk) {
                    Ok(out) if out.is_empty() => {}
                    Ok(out) => return Some((Ok(Bytes::from(out)), (body, layers))),
                    Err(e) => return Some((Err(decompression_error(&e)), (body, None))),
                },
                Some(Err(e)) => return Some((Err(e), (body, None))),
                None => {
                    return match decoder.finish() {
                        Ok(out) if out.is_empty() => None,
                        Ok(out) => Some((Ok(Bytes::from(out)), (body, None))),
                        Err(e) => Some((Err(decompression_error(&e)), (body, None))),
                    };
                }
            }
        }
    })
    .boxed()
}

fn decompression_error(err: &io::Error) -> TransportErrorKind {
    TransportErrorKind::Decompression(err.to_string())
}

// ============================================================================
// Charset sniffing
// ============================================================================

/// Extracts the `charset` parameter of a content type.
pub fn charset_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
            .filter(|v| !v.is_empty())
    })
}

fn is_xml(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.ends_with("/xml") || essence.ends_with("+xml")
}

/// Sniffs the encoding from a leading `<?xml ... encoding="..."?>` declaration.
pub fn sniff_xml_encoding(prefix: &[u8]) -> Option<String> {
    let window = &prefix[..prefix.len().min(XML_DECLARATION_WINDOW)];
    let window = window.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(window);
    let captures = XML_ENCODING.captures(window)?;
    let encoding = captures.get(1)?;
    Some(String::from_utf8_lossy(encoding.as_bytes()).into_owned())
}

/// Computes the content type a body should be decoded with.
///
/// An XML content type without a charset gets one from the body's XML
/// declaration, if it has one. Everything else is returned unchanged.
pub fn effective_content_type(prefix: &[u8], declared: Option<&str>) -> Option<String> {
    let declared = declared?;
    if !is_xml(declared) || charset_of(declared).is_some() {
        return Some(declared.to_string());
    }
    match sniff_xml_encoding(prefix) {
        Some(encoding) => {
            debug!(encoding = %encoding, "Charset sniffed from XML declaration");
            Some(format!("{declared}; charset={encoding}"))
        }
        None => Some(declared.to_string()),
    }
}

// ============================================================================
// Text decoding
// ============================================================================

/// Decodes a body with the given charset.
///
/// Labels are resolved the way browsers resolve them, so `ISO-8859-1` and
/// `US-ASCII` decode as windows-1252. A missing or unknown charset decodes as
/// UTF-8. Malformed sequences become U+FFFD.
pub fn decode_text(bytes: &[u8], charset: Option<&str>) -> String {
    let encoding = match charset {
        Some(label) => Encoding::for_label(label.trim().as_bytes()).unwrap_or_else(|| {
            warn!(charset = label, "Unsupported charset, decoding as UTF-8");
            UTF_8
        }),
        None => UTF_8,
    };
    let (text, _, malformed) = encoding.decode(bytes);
    if malformed {
        debug!(encoding = encoding.name(), "Malformed sequences replaced while decoding");
    }
    text.into_owned()
}

// ============================================================================
// Tests
// ============================================================================
