// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Resumable Upload (CDN 2)
//!
//! One attempt runs: expiry check, offset probe, then either a digest-only
//! drain (server already has everything) or a PUT of the remaining range.
//! Probe and PUT each pick their CDN endpoint independently; the resumable
//! session lives behind the signed URL, not on a replica.

use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::digest::{AttachmentDigest, DigestingReader};
use super::AttachmentUpload;
use crate::credentials::AuthContext;
use crate::error::{ServiceError, ServiceResult};
use crate::network::{
    validate_cdn_response, EndpointPool, NetworkError, OutgoingRequest, RequestBody,
    RequestDispatcher, UploadCanceled,
};

/// How long a resumable upload link stays usable.
pub const CDN2_RESUMABLE_LINK_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// HTTP status reporting an incomplete resumable upload.
pub const RESUME_INCOMPLETE: u16 = 308;

/// Server-side state of one resumable upload.
#[serde_as]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct ResumableUploadSpec {
    #[serde_as(as = "Base64")]
    pub secret_key: [u8; 64],
    #[serde_as(as = "Base64")]
    pub iv: [u8; 16],
    pub cdn_key: String,
    pub cdn_number: u32,
    pub resume_location: String,
    pub expires_at_millis: i64,
}

impl ResumableUploadSpec {
    /// True once the link can no longer be used.
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expires_at_millis < now_millis
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Debug for ResumableUploadSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumableUploadSpec")
            .field("secret_key", &"[REDACTED]")
            .field("iv", &"[REDACTED]")
            .field("cdn_key", &self.cdn_key)
            .field("cdn_number", &self.cdn_number)
            .field("resume_location", &self.resume_location)
            .field("expires_at_millis", &self.expires_at_millis)
            .finish()
    }
}

/// `Content-Range` of the offset probe.
pub fn content_range_probe(total: u64) -> String {
    format!("bytes */{}", total)
}

/// `Content-Range` of a PUT covering `[offset, total)`.
pub fn content_range(offset: u64, total: u64) -> String {
    format!("bytes {}-{}/{}", offset, total.saturating_sub(1), total)
}

/// Resume offset from a 308 `Range` header (`bytes=0-999` resumes at 1000).
///
/// No header means nothing was stored yet.
pub fn resume_offset_from_range(range: Option<&str>) -> ServiceResult<u64> {
    let Some(range) = range else {
        return Ok(0);
    };
    range
        .rsplit('-')
        .next()
        .and_then(|end| end.trim().parse::<u64>().ok())
        .and_then(|end| end.checked_add(1))
        .filter(|_| range.contains('-'))
        .ok_or_else(|| ServiceError::MalformedResponse(format!("invalid Range header: {}", range)))
}

/// Asks the CDN how many bytes of the object it holds.
fn probe_offset(
    dispatcher: &RequestDispatcher,
    pool: &EndpointPool,
    spec: &ResumableUploadSpec,
    total: u64,
) -> ServiceResult<u64> {
    let request = OutgoingRequest::put(&spec.resume_location)
        .header("Content-Range", &content_range_probe(total));
    let response = dispatcher.dispatch(pool, request, &AuthContext::None)?;

    let offset = match response.status {
        200..=299 => total,
        RESUME_INCOMPLETE => resume_offset_from_range(response.header("Range"))?,
        404 => return Err(ServiceError::ResumeLocationInvalid),
        status => {
            return Err(ServiceError::UnsuccessfulResponse {
                status,
                message: response.reason,
            })
        }
    };

    if offset > total {
        return Err(ServiceError::MalformedResponse(format!(
            "resume offset {} beyond object length {}",
            offset, total
        )));
    }
    Ok(offset)
}

fn stream_error(err: io::Error) -> ServiceError {
    if UploadCanceled::is_in_chain(&err) {
        NetworkError::Canceled.into()
    } else {
        NetworkError::Interrupted(err.to_string()).into()
    }
}

/// Uploads (or finishes uploading) an object to its resume location.
pub(crate) fn upload_to_cdn2(
    dispatcher: &RequestDispatcher,
    pool: &EndpointPool,
    upload: AttachmentUpload,
    spec: &ResumableUploadSpec,
    now_millis: i64,
) -> ServiceResult<AttachmentDigest> {
    if spec.is_expired(now_millis) {
        debug!(cdn = spec.cdn_number, "resumable upload link expired");
        return Err(ServiceError::ResumeLocationInvalid);
    }

    let total = upload.length;
    let offset = probe_offset(dispatcher, pool, spec, total)?;

    let mut reader = DigestingReader::new(upload.data, total, offset)
        .with_listener(upload.listener)
        .with_cancel(upload.cancel);
    let slot = reader.digest_slot();

    if offset == total {
        warn!(total, "resume start point equals content length");
        io::copy(&mut reader, &mut io::sink()).map_err(stream_error)?;
    } else {
        debug!(offset, total, "resuming upload");
        let request = OutgoingRequest::put(&spec.resume_location)
            .header("Content-Range", &content_range(offset, total))
            .body(RequestBody::Stream {
                content_type: "application/octet-stream".to_string(),
                length: total - offset,
                reader: Box::new(reader),
            });
        let response = dispatcher.dispatch(pool, request, &AuthContext::None)?;
        validate_cdn_response(response)?;
    }

    slot.get().ok_or_else(|| {
        ServiceError::Network(NetworkError::Interrupted(
            "body stream ended before the digest was complete".to_string(),
        ))
    })
}
