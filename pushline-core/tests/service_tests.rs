// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for service operations on the main API and storage

mod common;

use common::*;
use pushline_core::network::Method;
use pushline_core::service::entities::{
    OutgoingPushMessage, OutgoingPushMessageList, PreKeyEntity, PreKeyState, SignedPreKeyEntity,
};
use pushline_core::service::AGENT_HEADER;
use pushline_core::{HttpResponse, ServiceError, UnidentifiedAccess};
use serde_json::{json, Value};

fn message_list() -> OutgoingPushMessageList {
    OutgoingPushMessageList {
        destination: "bob-uuid".into(),
        timestamp: 1_700_000_000_000,
        messages: vec![OutgoingPushMessage {
            kind: 1,
            destination_device_id: 1,
            destination_registration_id: 4242,
            content: "Y2lwaGVydGV4dA==".into(),
        }],
        online: false,
    }
}

#[test]
fn test_whoami_uses_account_credentials_and_agent() {
    let h = harness();
    h.transport
        .queue_response(HttpResponse::new(200).with_json(&json!({"uuid": "u-1", "number": "+1555"})));

    let me = h.socket.whoami().unwrap();
    assert_eq!(me.uuid, "u-1");

    let request = h.transport.last_request().unwrap();
    assert_eq!(request.url, format!("{}/v1/accounts/whoami", SERVICE));
    // linked device 2 logs in as "identifier.2"
    assert_eq!(
        request.header("Authorization"),
        Some("Basic KzE1NTUwMDAxMTExLjI6aHVudGVyMg==")
    );
    assert_eq!(request.header(AGENT_HEADER), Some("pushline-test"));
}

#[test]
fn test_undecodable_success_body_is_malformed() {
    let h = harness();
    h.transport
        .queue_response(HttpResponse::new(200).with_body("not json"));
    assert!(matches!(
        h.socket.whoami(),
        Err(ServiceError::MalformedResponse(_))
    ));
}

#[test]
fn test_prekey_count_and_registration() {
    let h = harness();
    h.transport
        .queue_response(HttpResponse::new(200).with_json(&json!({"count": 17})));
    assert_eq!(h.socket.available_prekeys().unwrap(), 17);

    let signed = SignedPreKeyEntity {
        key_id: 7,
        public_key: "BQ==".into(),
        signature: "c2ln".into(),
    };
    let state = PreKeyState {
        identity_key: "BQI=".into(),
        signed_pre_key: signed.clone(),
        pre_keys: vec![PreKeyEntity {
            key_id: 1,
            public_key: "BQM=".into(),
        }],
    };
    h.socket.register_prekeys(&state).unwrap();
    let request = h.transport.last_request().unwrap();
    assert_eq!(request.method, Method::Put);
    assert_eq!(request.url, format!("{}/v2/keys", SERVICE));
    let body: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["signedPreKey"]["keyId"], 7);
    assert_eq!(body["preKeys"][0]["publicKey"], "BQM=");

    h.socket.set_signed_prekey(&signed).unwrap();
    assert_eq!(
        h.transport.last_request().unwrap().url,
        format!("{}/v2/keys/signed", SERVICE)
    );
}

#[test]
fn test_prekeys_for_primary_device_use_wildcard() {
    let h = harness();
    h.transport.queue_response(HttpResponse::new(200).with_json(&json!({
        "identityKey": "BQ==",
        "devices": [{"deviceId": 1, "registrationId": 99}]
    })));
    let bundle = h.socket.prekeys("bob", 1, None).unwrap();
    assert_eq!(bundle.devices[0].registration_id, 99);
    assert_eq!(
        h.transport.last_request().unwrap().url,
        format!("{}/v2/keys/bob/*", SERVICE)
    );

    h.transport.queue_response(HttpResponse::new(404));
    assert!(matches!(
        h.socket.prekeys("carol", 3, None),
        Err(ServiceError::UnregisteredUser(ref who)) if who == "carol"
    ));
    assert!(h
        .transport
        .last_request()
        .unwrap()
        .url
        .ends_with("/v2/keys/carol/3"));
}

#[test]
fn test_send_message_unidentified() {
    let h = harness();
    h.transport
        .queue_response(HttpResponse::new(200).with_json(&json!({"needsSync": true})));
    let access = UnidentifiedAccess::new(vec![0x42; 16]);

    let response = h.socket.send_message(&message_list(), Some(&access)).unwrap();
    assert!(response.needs_sync);

    let request = h.transport.last_request().unwrap();
    assert_eq!(request.url, format!("{}/v1/messages/bob-uuid", SERVICE));
    assert!(request.header("Authorization").is_none());
    assert!(request.header("Unidentified-Access-Key").is_some());
    let body: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["messages"][0]["type"], 1);
    assert_eq!(body["messages"][0]["destinationRegistrationId"], 4242);
}

#[test]
fn test_send_message_errors() {
    let h = harness();
    h.transport.queue_response(HttpResponse::new(404));
    assert!(matches!(
        h.socket.send_message(&message_list(), None),
        Err(ServiceError::UnregisteredUser(_))
    ));

    h.transport.queue_response(
        HttpResponse::new(409).with_json(&json!({"missingDevices": [2], "extraDevices": [3]})),
    );
    match h.socket.send_message(&message_list(), None) {
        Err(ServiceError::ConflictMismatchedDevices(m)) => {
            assert_eq!(m.missing_devices, vec![2]);
            assert_eq!(m.extra_devices, vec![3]);
        }
        other => panic!("unexpected {:?}", other),
    }

    // an empty 204 body is a plain success
    h.transport.queue_response(HttpResponse::new(204));
    assert!(!h.socket.send_message(&message_list(), None).unwrap().needs_sync);
}

#[test]
fn test_profile_and_remote_config() {
    let h = harness();
    h.transport.queue_response(
        HttpResponse::new(200).with_json(&json!({"name": "Qm9i", "unrestrictedUnidentifiedAccess": true})),
    );
    let profile = h.socket.retrieve_profile("bob", None).unwrap();
    assert_eq!(profile.name.as_deref(), Some("Qm9i"));
    assert!(profile.unrestricted_unidentified_access);

    h.transport.queue_response(HttpResponse::new(200).with_json(&json!({
        "config": [{"name": "android.feature", "enabled": true}]
    })));
    let config = h.socket.remote_config().unwrap();
    assert_eq!(config.config[0].name, "android.feature");
}

#[test]
fn test_enclave_authorization_header() {
    let h = harness();
    h.transport.queue_response(
        HttpResponse::new(200).with_json(&json!({"username": "dir", "password": "pw"})),
    );
    let auth = h.socket.contact_discovery_authorization().unwrap();
    assert_eq!(auth, "Basic ZGlyOnB3");
    assert_eq!(
        h.transport.last_request().unwrap().url,
        format!("{}/v1/directory/auth", SERVICE)
    );

    h.transport.queue_response(
        HttpResponse::new(200).with_json(&json!({"username": "kbs", "password": "pw"})),
    );
    h.socket.key_backup_authorization().unwrap();
    assert!(h.transport.last_request().unwrap().url.ends_with("/v1/backup/auth"));
}

#[test]
fn test_key_backup_token() {
    let h = harness();
    h.transport.queue_response(
        HttpResponse::new(200).with_json(&json!({"backupId": "AQI=", "token": "AwQ=", "tries": 10})),
    );
    let token = h.socket.key_backup_token("kbs-enclave", "Basic a2JzOnB3").unwrap();
    assert_eq!(token.tries, 10);
    assert_eq!(token.backup_id, vec![1, 2]);
    assert!(!format!("{:?}", token).contains("[3, 4]"));

    let request = h.transport.last_request().unwrap();
    assert_eq!(request.url, format!("{}/v1/token/kbs-enclave", BACKUP));
    assert_eq!(request.header("Authorization"), Some("Basic a2JzOnB3"));
    assert!(request.header(AGENT_HEADER).is_none());
}

#[test]
fn test_storage_manifest_and_conflict() {
    let h = harness();
    let auth = "Basic c3RvcmFnZTpwdw==";

    h.transport
        .queue_response(HttpResponse::new(200).with_body(vec![8, 1]));
    assert_eq!(h.socket.storage_manifest(auth).unwrap(), vec![8, 1]);
    let request = h.transport.last_request().unwrap();
    assert_eq!(request.url, format!("{}/v1/storage/manifest", STORAGE));
    assert_eq!(request.header("Authorization"), Some(auth));

    h.transport.queue_response(HttpResponse::new(204));
    assert_eq!(h.socket.storage_manifest_if_different(auth, 12).unwrap(), None);
    assert!(h
        .transport
        .last_request()
        .unwrap()
        .url
        .ends_with("/v1/storage/manifest/version/12"));

    h.transport
        .queue_response(HttpResponse::new(409).with_body(vec![8, 2]));
    match h.socket.write_storage(auth, vec![1, 2, 3]) {
        Err(ServiceError::StorageConflict(manifest)) => assert_eq!(manifest, vec![8, 2]),
        other => panic!("unexpected {:?}", other),
    }
    let request = h.transport.last_request().unwrap();
    assert_eq!(request.content_type.as_deref(), Some("application/x-protobuf"));
    assert_eq!(request.body, vec![1, 2, 3]);

    h.transport.queue_response(HttpResponse::new(404));
    assert!(matches!(
        h.socket.read_storage_items(auth, vec![9]),
        Err(ServiceError::NotFound)
    ));
}

#[test]
fn test_storage_authorization_goes_to_main_api() {
    let h = harness();
    h.transport.queue_response(
        HttpResponse::new(200).with_json(&json!({"username": "s", "password": "p"})),
    );
    assert_eq!(h.socket.storage_authorization().unwrap(), "Basic czpw");
    assert_eq!(
        h.transport.last_request().unwrap().url,
        format!("{}/v1/storage/auth", SERVICE)
    );
}
