//! Streaming archive decoder.
//!
//! The decoder never holds more than one part in memory. Each byte is hashed
//! at the moment it is handed out as part of a part, so the final digest
//! covers exactly what was uploaded.

use crate::error::PublishError;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use packyard_core::{ContentHash, ContentHasher};
use std::fmt::Display;
use std::pin::Pin;

/// Result of consuming an archive stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedPackage {
    /// SHA-256 of the uploaded bytes.
    pub content_hash: ContentHash,
    /// Total bytes read.
    pub size: u64,
}

/// Splits a request body into upload parts while hashing it.
pub struct PackageDecoder<S> {
    stream: Pin<Box<S>>,
    hasher: ContentHasher,
    buffer: BytesMut,
    part_size: usize,
    max_size: u64,
    size: u64,
    finished: bool,
}

impl<S, E> PackageDecoder<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    pub fn new(stream: S, part_size: usize, max_size: u64) -> Self {
        Self {
            stream: Box::pin(stream),
            hasher: ContentHasher::default(),
            buffer: BytesMut::new(),
            part_size: part_size.max(1),
            max_size,
            size: 0,
            finished: false,
        }
    }

    /// Bytes read from the stream so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read the next part of at most `part_size` bytes.
    ///
    /// Returns `Ok(None)` once the stream is exhausted. Only the last part
    /// may be shorter than `part_size`.
    ///
    /// Cancel safe: frames read before the future is dropped stay buffered.
    pub async fn next_part(&mut self) -> Result<Option<Bytes>, PublishError> {
        while !self.finished && self.buffer.len() < self.part_size {
            match self.stream.next().await {
                Some(Ok(frame)) => {
                    self.size += frame.len() as u64;
                    if self.size > self.max_size {
                        return Err(PublishError::payload_too_large(format!(
                            "archive exceeds {} bytes",
                            self.max_size
                        )));
                    }
                    self.buffer.extend_from_slice(&frame);
                }
                Some(Err(e)) => {
                    return Err(PublishError::malformed_package(format!(
                        "failed to read request body: {e}"
                    )));
                }
                None => {
                    self.finished = true;
                    if self.size == 0 {
                        return Err(PublishError::malformed_package("empty archive"));
                    }
                }
            }
        }

        if self.buffer.is_empty() {
            return Ok(None);
        }

        let take = self.buffer.len().min(self.part_size);
        let part = self.buffer.split_to(take).freeze();
        self.hasher.update(&part);
        Ok(Some(part))
    }

    /// Finish decoding, yielding the digest of every byte handed out.
    ///
    /// Fails if the stream has not been fully drained.
    pub fn into_decoded(self) -> Result<DecodedPackage, PublishError> {
        if !self.finished || !self.buffer.is_empty() {
            return Err(PublishError::uncaught("archive stream was not fully consumed"));
        }
        Ok(DecodedPackage {
            content_hash: self.hasher.finalize(),
            size: self.size,
        })
    }
}
