// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Form Uploads (CDN 0) and upload forms.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::digest::{AttachmentDigest, DigestingReader};
use super::AttachmentUpload;
use crate::credentials::AuthContext;
use crate::error::{ServiceError, ServiceResult};
use crate::network::{
    validate_cdn_response, EndpointPool, MultipartForm, NetworkError, OutgoingRequest,
    RequestBody, RequestDispatcher,
};

/// Path of attachment uploads on CDN 0.
pub const ATTACHMENT_UPLOAD_PATH: &str = "attachments/";

/// Path of avatar uploads on CDN 0.
pub const AVATAR_UPLOAD_PATH: &str = "";

/// Server-issued signed POST policy for a CDN 0 upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadForm {
    pub acl: String,
    pub key: String,
    pub policy: String,
    pub algorithm: String,
    pub credential: String,
    pub date: String,
    pub signature: String,
}

/// Server-issued form for a resumable upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentUploadForm {
    pub cdn: u32,
    pub key: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub signed_upload_location: String,
}

/// Multipart form in the order the CDN's policy check expects.
fn multipart_form(
    form: &UploadForm,
    content_type: &str,
    length: u64,
    reader: DigestingReader<Box<dyn std::io::Read + Send>>,
) -> MultipartForm {
    MultipartForm::new()
        .text("acl", &form.acl)
        .text("key", &form.key)
        .text("policy", &form.policy)
        .text("Content-Type", content_type)
        .text("x-amz-algorithm", &form.algorithm)
        .text("x-amz-credential", &form.credential)
        .text("x-amz-date", &form.date)
        .text("x-amz-signature", &form.signature)
        .stream("file", "file", content_type, length, Box::new(reader))
}

/// Single-shot multipart upload. A failed attempt restarts from scratch.
pub(crate) fn upload_to_cdn0(
    dispatcher: &RequestDispatcher,
    pool: &EndpointPool,
    path: &str,
    form: &UploadForm,
    upload: AttachmentUpload,
) -> ServiceResult<AttachmentDigest> {
    let AttachmentUpload {
        data,
        length,
        content_type,
        listener,
        cancel,
    } = upload;

    let reader = DigestingReader::new(data, length, 0)
        .with_listener(listener)
        .with_cancel(cancel);
    let slot = reader.digest_slot();

    debug!(length, "form upload");
    let request = OutgoingRequest::post(path).body(RequestBody::Multipart(multipart_form(
        form,
        &content_type,
        length,
        reader,
    )));
    let response = dispatcher.dispatch(pool, request, &AuthContext::None)?;
    validate_cdn_response(response)?;

    slot.get().ok_or_else(|| {
        ServiceError::Network(NetworkError::Interrupted(
            "form body ended before the digest was complete".to_string(),
        ))
    })
}
