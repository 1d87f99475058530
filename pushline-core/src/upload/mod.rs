// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Attachment and avatar uploads.

pub mod digest;
pub mod form;
pub mod resumable;

use std::io::Read;

pub use digest::{
    AttachmentDigest, CancelationSignal, DigestSlot, DigestingReader, ProgressListener,
};
pub use form::{AttachmentUploadForm, UploadForm, ATTACHMENT_UPLOAD_PATH, AVATAR_UPLOAD_PATH};
pub use resumable::{
    content_range, content_range_probe, resume_offset_from_range, ResumableUploadSpec,
    CDN2_RESUMABLE_LINK_LIFETIME,
};

/// An object to upload: its bytes plus the caller's progress and cancel hooks.
pub struct AttachmentUpload {
    pub data: Box<dyn Read + Send>,
    pub length: u64,
    pub content_type: String,
    pub listener: Option<ProgressListener>,
    pub cancel: Option<CancelationSignal>,
}

impl AttachmentUpload {
    pub fn new(data: Box<dyn Read + Send>, length: u64, content_type: &str) -> Self {
        AttachmentUpload {
            data,
            length,
            content_type: content_type.to_string(),
            listener: None,
            cancel: None,
        }
    }

    /// Upload of an in-memory buffer.
    pub fn from_bytes(data: Vec<u8>, content_type: &str) -> Self {
        let length = data.len() as u64;
        Self::new(Box::new(std::io::Cursor::new(data)), length, content_type)
    }

    pub fn with_listener(mut self, listener: ProgressListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelationSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

impl std::fmt::Debug for AttachmentUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentUpload")
            .field("length", &self.length)
            .field("content_type", &self.content_type)
            .finish()
    }
}
