// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Digesting Body Stream
//!
//! Wraps an upload source so that every byte of the logical object passes
//! through a SHA-256 context, including a prefix the server already holds
//! and that is therefore hashed but not re-sent.

use std::io::{self, Read};
use std::sync::{Arc, OnceLock};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ring::digest::{Context, SHA256};

use crate::network::UploadCanceled;

/// Receives `(transmitted, total)` after each chunk. `transmitted` includes
/// any prefix skipped on resume.
pub type ProgressListener = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Polled before each chunk; `true` aborts the upload.
pub type CancelationSignal = Arc<dyn Fn() -> bool + Send + Sync>;

const SKIP_CHUNK: usize = 8192;

/// SHA-256 digest of a complete uploaded object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentDigest {
    digest: [u8; 32],
}

impl AttachmentDigest {
    pub fn new(digest: [u8; 32]) -> Self {
        AttachmentDigest { digest }
    }

    /// Digest of an in-memory object.
    pub fn of(data: &[u8]) -> Self {
        let hash = ring::digest::digest(&SHA256, data);
        let mut digest = [0u8; 32];
        digest.copy_from_slice(hash.as_ref());
        AttachmentDigest { digest }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.digest
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.digest)
    }
}

/// Where a [`DigestingReader`] publishes its final digest.
#[derive(Debug, Clone, Default)]
pub struct DigestSlot(Arc<OnceLock<AttachmentDigest>>);

impl DigestSlot {
    /// The digest, once the whole object has been consumed.
    pub fn get(&self) -> Option<AttachmentDigest> {
        self.0.get().copied()
    }
}

/// Hashing, progress-reporting, cancelable reader over the bytes
/// `[offset, total)` of a source that starts at byte 0.
pub struct DigestingReader<R> {
    inner: R,
    context: Option<Context>,
    offset: u64,
    consumed: u64,
    total: u64,
    listener: Option<ProgressListener>,
    cancel: Option<CancelationSignal>,
    slot: DigestSlot,
}

impl<R: Read> DigestingReader<R> {
    pub fn new(inner: R, total: u64, offset: u64) -> Self {
        DigestingReader {
            inner,
            context: Some(Context::new(&SHA256)),
            offset: offset.min(total),
            consumed: 0,
            total,
            listener: None,
            cancel: None,
            slot: DigestSlot::default(),
        }
    }

    pub fn with_listener(mut self, listener: Option<ProgressListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_cancel(mut self, cancel: Option<CancelationSignal>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle to the digest, readable after the reader is dropped.
    pub fn digest_slot(&self) -> DigestSlot {
        self.slot.clone()
    }

    fn check_canceled(&self) -> io::Result<()> {
        match &self.cancel {
            Some(cancel) if cancel() => Err(UploadCanceled.into_io()),
            _ => Ok(()),
        }
    }

    fn absorb(&mut self, bytes: &[u8]) {
        if let Some(context) = self.context.as_mut() {
            context.update(bytes);
        }
        self.consumed += bytes.len() as u64;
        if self.consumed == self.total {
            self.finish();
        }
    }

    fn finish(&mut self) {
        if let Some(context) = self.context.take() {
            let hash = context.finish();
            let mut digest = [0u8; 32];
            digest.copy_from_slice(hash.as_ref());
            let _ = self.slot.0.set(AttachmentDigest::new(digest));
        }
    }

    fn short_source(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("source ended at {} of {} bytes", self.consumed, self.total),
        )
    }

    fn report(&self) {
        if let Some(listener) = &self.listener {
            listener(self.consumed, self.total);
        }
    }

    /// Hashes the already-uploaded prefix without emitting it.
    fn skip_prefix(&mut self) -> io::Result<()> {
        if self.consumed >= self.offset {
            return Ok(());
        }
        let mut scratch = [0u8; SKIP_CHUNK];
        while self.consumed < self.offset {
            self.check_canceled()?;
            let want = (self.offset - self.consumed).min(SKIP_CHUNK as u64) as usize;
            let n = self.inner.read(&mut scratch[..want])?;
            if n == 0 {
                return Err(self.short_source());
            }
            self.absorb(&scratch[..n]);
        }
        self.report();
        Ok(())
    }
}

impl<R: Read> Read for DigestingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.skip_prefix()?;
        if self.consumed >= self.total {
            self.finish();
            return Ok(0);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        self.check_canceled()?;

        let want = (self.total - self.consumed).min(buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..want])?;
        if n == 0 {
            return Err(self.short_source());
        }
        self.absorb(&buf[..n]);
        self.report();
        Ok(n)
    }
}
