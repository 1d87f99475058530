// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Common Test Utilities
//!
//! A socket wired to one shared mock transport, plus configuration fixtures.

#![allow(dead_code)]

use std::sync::Arc;

use pushline_core::network::{MockHttpTransport, MockTransportFactory};
use pushline_core::{
    Clock, ServiceConfiguration, ServiceSocket, ServiceUrl, StaticCredentials, TrustStore,
};

pub const SERVICE: &str = "https://chat.pushline.test";
pub const CDN0: &str = "https://cdn0.pushline.test";
pub const CDN2: &str = "https://cdn2.pushline.test";
pub const DIRECTORY: &str = "https://directory.pushline.test";
pub const BACKUP: &str = "https://backup.pushline.test";
pub const STORAGE: &str = "https://storage.pushline.test";

/// Fixed wall clock.
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

pub fn url(base: &str) -> ServiceUrl {
    ServiceUrl::new(base, TrustStore::from_der(vec![vec![0x30, 0x00]]))
}

/// Configuration with every service present.
pub fn full_config() -> ServiceConfiguration {
    ServiceConfiguration::default()
        .with_service_url(url(SERVICE))
        .with_cdn_url(0, url(CDN0))
        .with_cdn_url(2, url(CDN2))
        .with_contact_discovery_url(url(DIRECTORY))
        .with_key_backup_url(url(BACKUP))
        .with_storage_url(url(STORAGE))
        .with_user_agent("pushline-test")
}

pub struct Harness {
    pub transport: Arc<MockHttpTransport>,
    pub factory: MockTransportFactory,
    pub socket: ServiceSocket,
}

pub fn harness_with(config: ServiceConfiguration) -> Harness {
    let transport = Arc::new(MockHttpTransport::new());
    let factory = MockTransportFactory::new(transport.clone());
    let credentials = Arc::new(StaticCredentials::new("+15550001111", 2, "hunter2"));
    let socket = ServiceSocket::with_transport_factory(&config, credentials, &factory)
        .expect("valid configuration");
    Harness {
        transport,
        factory,
        socket,
    }
}

pub fn harness() -> Harness {
    harness_with(full_config())
}
