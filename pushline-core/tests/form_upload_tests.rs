// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for CDN 0 form uploads

mod common;

use std::sync::{Arc, Mutex};

use common::*;
use pushline_core::network::Method;
use pushline_core::upload::UploadForm;
use pushline_core::{AttachmentDigest, AttachmentUpload, HttpResponse, ServiceError};
use serde_json::json;

fn form() -> UploadForm {
    UploadForm {
        acl: "private".into(),
        key: "attachments/1234".into(),
        policy: "cG9saWN5".into(),
        algorithm: "AWS4-HMAC-SHA256".into(),
        credential: "AKIA/20260101/us-east-1/s3/aws4_request".into(),
        date: "20260101T000000Z".into(),
        signature: "deadbeef".into(),
    }
}

#[test]
fn test_attachment_form_fields_in_order() {
    let h = harness();
    let data = vec![0x42u8; 3000];

    let digest = h
        .socket
        .upload_attachment_form(&form(), AttachmentUpload::from_bytes(data.clone(), "image/gif"))
        .unwrap();
    assert_eq!(digest, AttachmentDigest::of(&data));

    let request = h.transport.last_request().unwrap();
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.url, format!("{}/attachments/", CDN0));
    assert!(request.header("Authorization").is_none());

    let names: Vec<&str> = request.form.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "acl",
            "key",
            "policy",
            "Content-Type",
            "x-amz-algorithm",
            "x-amz-credential",
            "x-amz-date",
            "x-amz-signature",
            "file",
        ]
    );
    assert_eq!(request.form_field("Content-Type"), Some(&b"image/gif"[..]));
    assert_eq!(request.form_field("file"), Some(data.as_slice()));
}

#[test]
fn test_avatar_upload_goes_to_cdn_root() {
    let h = harness();
    h.transport
        .queue_response(HttpResponse::new(200).with_json(&json!({
            "acl": "private", "key": "profiles/abc", "policy": "p",
            "algorithm": "a", "credential": "c", "date": "d", "signature": "s"
        })));
    let avatar_form = h.socket.avatar_upload_form().unwrap();
    assert_eq!(avatar_form.key, "profiles/abc");
    assert_eq!(
        h.transport.last_request().unwrap().url,
        format!("{}/v1/profile/form/avatar", SERVICE)
    );

    h.socket
        .upload_avatar(&avatar_form, AttachmentUpload::from_bytes(vec![1, 2, 3], "image/jpeg"))
        .unwrap();
    let request = h.transport.last_request().unwrap();
    assert_eq!(request.url, CDN0);
    assert_eq!(request.form_field("key"), Some(&b"profiles/abc"[..]));
}

#[test]
fn test_progress_reaches_total() {
    let h = harness();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let upload = AttachmentUpload::from_bytes(vec![7; 10_000], "image/png")
        .with_listener(Arc::new(move |sent, total| sink.lock().unwrap().push((sent, total))));

    h.socket.upload_attachment_form(&form(), upload).unwrap();

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(seen.last(), Some(&(10_000, 10_000)));
}

#[test]
fn test_rejected_form_upload() {
    let h = harness();
    h.transport
        .queue_response(HttpResponse::new(403).with_reason("Forbidden"));
    let result = h
        .socket
        .upload_attachment_form(&form(), AttachmentUpload::from_bytes(vec![1; 10], "image/png"));
    match result {
        Err(ServiceError::UnsuccessfulResponse { status, message }) => {
            assert_eq!(status, 403);
            assert_eq!(message, "Forbidden");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_attachment_form_fetched_from_main_api() {
    let h = harness();
    h.transport.queue_response(HttpResponse::new(200).with_json(&json!({
        "cdn": 2,
        "key": "abc",
        "headers": {"x-goog-resumable": "start"},
        "signedUploadLocation": "https://storage.googleapis.com/upload/abc?sig=1"
    })));
    let form = h.socket.attachment_upload_form().unwrap();
    assert_eq!(form.cdn, 2);
    assert_eq!(form.headers["x-goog-resumable"], "start");
    assert_eq!(
        h.transport.last_request().unwrap().url,
        format!("{}/v4/attachments/form/upload", SERVICE)
    );
}
