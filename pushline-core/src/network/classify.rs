// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Response Classifier
//!
//! Maps HTTP statuses onto [`ServiceError`]. Each logical service has its
//! own table; all of them are strict switches with a generic fallback.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::warn;

use super::transport::HttpResponse;
use crate::error::{
    DeviceLimit, MismatchedDevices, ProofRequired, RegistrationLockFailure, ServiceError,
    ServiceResult, StaleDevices,
};

/// Per-operation check run before the generic table.
///
/// Returning `Some` short-circuits classification with that error.
pub type ResponseHandler<'a> = &'a dyn Fn(&HttpResponse) -> Option<ServiceError>;

/// Statuses the main API reports success with.
pub const SUCCESS_STATUSES: [u16; 4] = [200, 202, 204, 207];

/// Parses `Retry-After` (delay in seconds).
pub fn retry_after(response: &HttpResponse) -> Option<Duration> {
    response
        .header("Retry-After")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn unsuccessful(response: &HttpResponse) -> ServiceError {
    ServiceError::UnsuccessfulResponse {
        status: response.status,
        message: response.reason.clone(),
    }
}

/// Decodes a status-specific body, degrading to the generic error.
fn decode_body<T: DeserializeOwned>(
    response: &HttpResponse,
    wrap: impl FnOnce(T) -> ServiceError,
) -> ServiceError {
    match response.json::<T>() {
        Ok(body) => wrap(body),
        Err(e) => {
            warn!(
                status = response.status,
                error = %e,
                "undecodable error body, reporting generic failure"
            );
            unsuccessful(response)
        }
    }
}

/// Classifies a main API response.
pub fn validate_service_response(
    response: HttpResponse,
    handler: Option<ResponseHandler<'_>>,
) -> ServiceResult<HttpResponse> {
    if let Some(error) = handler.and_then(|h| h(&response)) {
        return Err(error);
    }

    let error = match response.status {
        status if SUCCESS_STATUSES.contains(&status) => return Ok(response),
        413 | 429 => ServiceError::RateLimited {
            status: response.status,
            retry_after: retry_after(&response),
        },
        401 | 403 => ServiceError::AuthorizationFailed {
            status: response.status,
        },
        404 => ServiceError::NotFound,
        409 => decode_body::<MismatchedDevices>(&response, ServiceError::ConflictMismatchedDevices),
        410 => decode_body::<StaleDevices>(&response, ServiceError::StaleDevices),
        411 => decode_body::<DeviceLimit>(&response, ServiceError::DeviceLimitExceeded),
        417 => ServiceError::ExpectationFailed,
        423 => decode_body::<RegistrationLockFailure>(&response, ServiceError::RegistrationLocked),
        428 => {
            let retry = retry_after(&response);
            decode_body::<ProofRequired>(&response, |proof| ServiceError::ProofRequired {
                proof,
                retry_after: retry,
            })
        }
        499 => ServiceError::DeprecatedVersion,
        508 => ServiceError::ServerRejected,
        _ => unsuccessful(&response),
    };
    Err(error)
}

/// Classifies an enclave (contact discovery, key backup) response.
pub fn validate_enclave_response(response: HttpResponse) -> ServiceResult<HttpResponse> {
    let error = match response.status {
        200..=299 => return Ok(response),
        401 | 403 => ServiceError::AuthorizationFailed {
            status: response.status,
        },
        409 => ServiceError::AttestationExpired,
        413 | 429 => ServiceError::RateLimited {
            status: response.status,
            retry_after: retry_after(&response),
        },
        _ => unsuccessful(&response),
    };
    Err(error)
}

/// Classifies a storage service response.
pub fn validate_storage_response(response: HttpResponse) -> ServiceResult<HttpResponse> {
    let error = match response.status {
        200..=299 => return Ok(response),
        401 | 403 => ServiceError::AuthorizationFailed {
            status: response.status,
        },
        404 => ServiceError::NotFound,
        409 => ServiceError::StorageConflict(response.body),
        413 | 429 => ServiceError::RateLimited {
            status: response.status,
            retry_after: retry_after(&response),
        },
        _ => unsuccessful(&response),
    };
    Err(error)
}

/// Classifies a CDN upload response. Anything but 2xx is generic.
pub fn validate_cdn_response(response: HttpResponse) -> ServiceResult<HttpResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(unsuccessful(&response))
    }
}
