// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for the pinned reqwest transport against local sockets

use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pushline_core::network::NetworkError;
use pushline_core::{
    ServiceConfiguration, ServiceError, ServiceSocket, ServiceUrl, StaticCredentials, TrustStore,
};

const PINNED_ROOT: &[u8] = include_bytes!("fixtures/pinned_root.der");

/// Accepts connections and never writes a byte back.
fn silent_listener() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => held.push(stream),
                Err(_) => break,
            }
        }
    });
    format!("https://{}", addr)
}

fn socket_against(base: &str) -> ServiceSocket {
    let url = || ServiceUrl::new(base, TrustStore::from_der(vec![PINNED_ROOT.to_vec()]));
    let mut config = ServiceConfiguration::default()
        .with_service_url(url())
        .with_cdn_url(0, url())
        .with_cdn_url(2, url());
    config.timeout_ms = 8_000;
    config.connect_timeout_ms = 8_000;

    ServiceSocket::new(
        &config,
        Arc::new(StaticCredentials::new("+15550001111", 1, "hunter2")),
    )
    .unwrap()
}

#[test]
fn test_bulk_cancel_aborts_call_waiting_on_response() {
    let socket = socket_against(&silent_listener());
    let in_flight = socket.in_flight();

    let canceler = {
        let in_flight = in_flight.clone();
        thread::spawn(move || {
            let waiting = Instant::now();
            while in_flight.is_empty() && waiting.elapsed() < Duration::from_secs(5) {
                thread::sleep(Duration::from_millis(10));
            }
            thread::sleep(Duration::from_millis(300));
            in_flight.cancel_all()
        })
    };

    let started = Instant::now();
    let result = socket.whoami();
    let elapsed = started.elapsed();

    assert_eq!(canceler.join().unwrap(), 1);
    assert!(
        matches!(result, Err(ServiceError::Network(NetworkError::Canceled))),
        "unexpected {:?}",
        result
    );
    assert!(elapsed < Duration::from_secs(3), "cancel took {:?}", elapsed);
    assert!(in_flight.is_empty());
}

#[test]
fn test_soft_timeout_bounds_silent_server() {
    let socket = socket_against(&silent_listener());
    socket.set_soft_timeout(Duration::from_millis(500));

    let started = Instant::now();
    let result = socket.whoami();

    assert!(
        matches!(result, Err(ServiceError::Network(NetworkError::Timeout))),
        "unexpected {:?}",
        result
    );
    assert!(started.elapsed() < Duration::from_secs(4));
}
