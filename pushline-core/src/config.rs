// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Service Configuration
//!
//! Describes every logical service the client talks to (main API, numbered
//! CDNs, contact discovery, key backup, storage), the trust anchors each
//! connection is pinned to, and the process-wide transport knobs.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use thiserror::Error;

/// CDN used for form (multipart) uploads.
pub const FORM_UPLOAD_CDN: u32 = 0;

/// CDN used for resumable PUT uploads.
pub const RESUMABLE_UPLOAD_CDN: u32 = 2;

/// Configuration errors. All of these surface at construction time.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("At least one URL is required for {0}")]
    EmptyPool(&'static str),

    #[error("Configuration must support CDN {0}")]
    MissingRequiredCdn(u32),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Trust store for {0} has no certificates")]
    EmptyTrustStore(String),

    #[error("Invalid trust anchor: {0}")]
    InvalidCertificate(String),

    #[error("TLS configuration failed: {0}")]
    Tls(String),

    #[error("HTTP client construction failed: {0}")]
    Client(String),
}

/// Root certificates a connection must chain to.
///
/// There is deliberately no way to fall back to the platform trust roots.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustStore {
    /// DER-encoded root certificates.
    #[serde_as(as = "Vec<Base64>")]
    certificates: Vec<Vec<u8>>,
}

impl TrustStore {
    /// Creates a trust store from DER-encoded certificates.
    pub fn from_der(certificates: Vec<Vec<u8>>) -> Self {
        TrustStore { certificates }
    }

    /// Returns the DER-encoded certificates.
    pub fn certificates(&self) -> &[Vec<u8>] {
        &self.certificates
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}

/// Cipher and protocol restrictions applied to a pinned connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsPolicy {
    /// TLS 1.3 and TLS 1.2, ECDHE with AEAD suites only.
    #[default]
    Restricted,
    /// TLS 1.3 only.
    Modern,
}

/// One base URL of a logical service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUrl {
    /// Base URL requests are sent to (TLS connection target).
    pub url: String,
    /// Host header override for domain fronting.
    #[serde(default)]
    pub host_header: Option<String>,
    /// Roots this endpoint's certificate chain must validate against.
    pub trust_store: TrustStore,
    /// Overrides the default TLS policy for this endpoint.
    #[serde(default)]
    pub tls_policy: Option<TlsPolicy>,
}

impl ServiceUrl {
    /// Creates a service URL without a host header override.
    pub fn new(url: &str, trust_store: TrustStore) -> Self {
        ServiceUrl {
            url: url.to_string(),
            host_header: None,
            trust_store,
            tls_policy: None,
        }
    }

    /// Sets the host header used for domain fronting.
    pub fn with_host_header(mut self, host: &str) -> Self {
        self.host_header = Some(host.to_string());
        self
    }

    /// Sets the TLS policy for this endpoint.
    pub fn with_tls_policy(mut self, policy: TlsPolicy) -> Self {
        self.tls_policy = Some(policy);
        self
    }
}

/// Proxy configuration for service connections.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ProxyConfig {
    /// No proxy (direct connection).
    #[default]
    None,
    /// SOCKS5 proxy (used for Tor).
    Socks5 {
        /// Proxy host address.
        host: String,
        /// Proxy port.
        port: u16,
    },
    /// HTTP CONNECT proxy.
    HttpConnect {
        /// Proxy host address.
        host: String,
        /// Proxy port.
        port: u16,
    },
}

impl ProxyConfig {
    /// Creates a SOCKS5 proxy config for local Tor (127.0.0.1:9050).
    pub fn tor_default() -> Self {
        ProxyConfig::Socks5 {
            host: "127.0.0.1".to_string(),
            port: 9050,
        }
    }

    /// Returns the proxy URL understood by the HTTP client, if any.
    pub fn proxy_url(&self) -> Option<String> {
        match self {
            ProxyConfig::None => None,
            ProxyConfig::Socks5 { host, port } => Some(format!("socks5h://{}:{}", host, port)),
            ProxyConfig::HttpConnect { host, port } => Some(format!("http://{}:{}", host, port)),
        }
    }
}

/// Static host resolution used instead of system DNS for listed hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsOverrides {
    #[serde(default)]
    hosts: HashMap<String, Vec<SocketAddr>>,
}

impl DnsOverrides {
    pub fn new() -> Self {
        DnsOverrides::default()
    }

    /// Resolves `host` to the given addresses.
    pub fn insert(mut self, host: &str, addrs: Vec<SocketAddr>) -> Self {
        self.hosts.insert(host.to_string(), addrs);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<SocketAddr>)> {
        self.hosts.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// CDN endpoints keyed by CDN number.
pub type CdnUrlMap = BTreeMap<u32, Vec<ServiceUrl>>;

/// Complete client configuration.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfiguration {
    /// Main API endpoints.
    pub service_urls: Vec<ServiceUrl>,
    /// CDN endpoints keyed by CDN number. Must contain CDN 0 and CDN 2.
    pub cdn_urls: CdnUrlMap,
    #[serde(default)]
    pub contact_discovery_urls: Vec<ServiceUrl>,
    #[serde(default)]
    pub key_backup_urls: Vec<ServiceUrl>,
    #[serde(default)]
    pub storage_urls: Vec<ServiceUrl>,
    /// Per-call timeout in milliseconds (adjustable at runtime).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Connection establishment timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub dns: DnsOverrides,
    /// Agent string attached to main API requests.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// DER-encoded RSA public keys trusted to sign enclave attestation reports.
    #[serde_as(as = "Vec<Base64>")]
    #[serde(default)]
    pub attestation_signing_keys: Vec<Vec<u8>>,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for ServiceConfiguration {
    fn default() -> Self {
        ServiceConfiguration {
            service_urls: Vec::new(),
            cdn_urls: BTreeMap::new(),
            contact_discovery_urls: Vec::new(),
            key_backup_urls: Vec::new(),
            storage_urls: Vec::new(),
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            proxy: ProxyConfig::None,
            dns: DnsOverrides::default(),
            user_agent: None,
            attestation_signing_keys: Vec::new(),
        }
    }
}

impl ServiceConfiguration {
    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_service_url(mut self, url: ServiceUrl) -> Self {
        self.service_urls.push(url);
        self
    }

    pub fn with_cdn_url(mut self, cdn: u32, url: ServiceUrl) -> Self {
        self.cdn_urls.entry(cdn).or_default().push(url);
        self
    }

    pub fn with_contact_discovery_url(mut self, url: ServiceUrl) -> Self {
        self.contact_discovery_urls.push(url);
        self
    }

    pub fn with_key_backup_url(mut self, url: ServiceUrl) -> Self {
        self.key_backup_urls.push(url);
        self
    }

    pub fn with_storage_url(mut self, url: ServiceUrl) -> Self {
        self.storage_urls.push(url);
        self
    }

    /// Configures connections via Tor.
    ///
    /// Tor connections are slower, so timeouts are raised as well.
    pub fn with_tor(mut self) -> Self {
        self.proxy = ProxyConfig::tor_default();
        self.timeout_ms = 120_000;
        self.connect_timeout_ms = 60_000;
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_dns(mut self, dns: DnsOverrides) -> Self {
        self.dns = dns;
        self
    }

    pub fn with_user_agent(mut self, agent: &str) -> Self {
        self.user_agent = Some(agent.to_string());
        self
    }

    pub fn with_attestation_signing_key(mut self, der: Vec<u8>) -> Self {
        self.attestation_signing_keys.push(der);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Checks the invariants that must hold before any endpoint is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for required in [FORM_UPLOAD_CDN, RESUMABLE_UPLOAD_CDN] {
            match self.cdn_urls.get(&required) {
                Some(urls) if !urls.is_empty() => {}
                _ => return Err(ConfigError::MissingRequiredCdn(required)),
            }
        }
        if self.service_urls.is_empty() {
            return Err(ConfigError::EmptyPool("service"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(u: &str) -> ServiceUrl {
        ServiceUrl::new(u, TrustStore::from_der(vec![vec![1, 2, 3]]))
    }

    #[test]
    fn test_validate_requires_cdn_zero_and_two() {
        let config = ServiceConfiguration::default()
            .with_service_url(url("https://api.test"))
            .with_cdn_url(0, url("https://cdn.test"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequiredCdn(2))
        ));

        let config = config.with_cdn_url(2, url("https://cdn2.test"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_proxy_urls() {
        assert_eq!(ProxyConfig::None.proxy_url(), None);
        assert_eq!(
            ProxyConfig::tor_default().proxy_url().as_deref(),
            Some("socks5h://127.0.0.1:9050")
        );
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{
            "service_urls": [{"url": "https://api.test", "trust_store": {"certificates": ["AQID"]}}],
            "cdn_urls": {"0": [], "2": []}
        }"#;
        let config = ServiceConfiguration::from_json(json).unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.service_urls[0].trust_store.certificates(), &[vec![1, 2, 3]]);
        assert_eq!(config.proxy, ProxyConfig::None);
    }
}
