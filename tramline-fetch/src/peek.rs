//! Body peeks.
//!
//! A peek is a bounded prefix of the body, read ahead of delivery so the
//! classifier can look at it. The bytes are not consumed: the stream handed
//! back by [`BodyPeek::take`] replays them before the rest of the body.
//!
//! The text starts out decoded as UTF-8. Once the response charset is known,
//! [`BodyPeek::with_charset`] decodes it again so that non-UTF-8 pages match
//! the anomaly phrases.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt};

use crate::error::TransportErrorKind;
use crate::host::BodyStream;
use crate::normalize;

/// A size-bounded prefix of a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyPeek {
    bytes: Bytes,
    text: String,
    complete: bool,
}

impl BodyPeek {
    /// Reads up to `limit` bytes from `body`.
    ///
    /// Returns the peek and a stream yielding the entire body, peeked bytes
    /// included.
    pub async fn take(
        mut body: BodyStream,
        limit: usize,
    ) -> Result<(Self, BodyStream), TransportErrorKind> {
        let mut buffered: Vec<Bytes> = Vec::new();
        let mut len = 0;
        let mut complete = false;

        while len < limit {
            match body.next().await {
                Some(chunk) => {
                    let chunk = chunk?;
                    len += chunk.len();
                    buffered.push(chunk);
                }
                None => {
                    complete = true;
                    break;
                }
            }
        }

        let mut prefix = BytesMut::with_capacity(len.min(limit));
        for chunk in &buffered {
            let room = limit - prefix.len();
            if room == 0 {
                break;
            }
            prefix.extend_from_slice(&chunk[..chunk.len().min(room)]);
        }

        let peek = Self::from_bytes(prefix.freeze(), complete);
        let replay = stream::iter(buffered.into_iter().map(Ok));
        let rest: BodyStream = if complete {
            replay.boxed()
        } else {
            replay.chain(body).boxed()
        };

        Ok((peek, rest))
    }

    /// Builds a peek over bytes already in memory.
    pub fn from_bytes(bytes: Bytes, complete: bool) -> Self {
        let text = sanitize(&normalize::decode_text(&bytes, None));
        Self {
            bytes,
            text,
            complete,
        }
    }

    /// Decodes the text again with the response charset.
    #[must_use]
    pub fn with_charset(mut self, charset: Option<&str>) -> Self {
        if charset.is_some() {
            self.text = sanitize(&normalize::decode_text(&self.bytes, charset));
        }
        self
    }

    /// Raw prefix bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Prefix decoded as text, control characters removed.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns true if the whole body fit in the peek.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Returns true if the body has no bytes at all.
    pub fn is_empty_body(&self) -> bool {
        self.complete && self.bytes.is_empty()
    }
}

/// Strips control characters other than tab, line feed and carriage return.
fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
