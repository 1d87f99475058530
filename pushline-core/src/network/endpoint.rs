// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Endpoints and Endpoint Pools
//!
//! Every configured URL becomes one [`Endpoint`] holding its transport(s).
//! Transports are built once here and shared by every call to the endpoint.
//! Endpoint selection is uniform-random per call.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::{thread_rng, Rng};
use reqwest::Url;

use super::http::ReqwestTransport;
use super::transport::{HttpTransport, Interceptor};
use crate::config::{ConfigError, ServiceConfiguration, ServiceUrl};

/// Builds the transport for one configured URL.
pub trait TransportFactory: Send + Sync {
    fn create(&self, url: &ServiceUrl) -> Result<Arc<dyn HttpTransport>, ConfigError>;
}

/// Production factory: pinned `reqwest` clients.
pub struct PinnedTransportFactory {
    config: ServiceConfiguration,
    interceptors: Arc<Vec<Arc<dyn Interceptor>>>,
}

impl PinnedTransportFactory {
    pub fn new(config: &ServiceConfiguration, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        PinnedTransportFactory {
            config: config.clone(),
            interceptors: Arc::new(interceptors),
        }
    }
}

impl TransportFactory for PinnedTransportFactory {
    fn create(&self, url: &ServiceUrl) -> Result<Arc<dyn HttpTransport>, ConfigError> {
        Ok(Arc::new(ReqwestTransport::new(
            url,
            &self.config,
            self.interceptors.clone(),
        )?))
    }
}

/// One base URL of a logical service with its transports.
#[derive(Clone)]
pub struct Endpoint {
    base_url: String,
    host_header: Option<String>,
    transport: Arc<dyn HttpTransport>,
    unidentified_transport: Arc<dyn HttpTransport>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("base_url", &self.base_url)
            .field("host_header", &self.host_header)
            .finish()
    }
}

impl Endpoint {
    /// Endpoint whose identified and unidentified calls share one transport.
    pub fn new(url: &ServiceUrl, transport: Arc<dyn HttpTransport>) -> Result<Self, ConfigError> {
        Self::with_unidentified(url, transport.clone(), transport)
    }

    /// Endpoint with a separate transport for unidentified calls.
    pub fn with_unidentified(
        url: &ServiceUrl,
        transport: Arc<dyn HttpTransport>,
        unidentified_transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ConfigError> {
        let parsed = Url::parse(&url.url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", url.url, e)))?;
        // pinning only applies to TLS connections
        if parsed.scheme() != "https" || parsed.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(url.url.clone()));
        }
        Ok(Endpoint {
            base_url: url.url.trim_end_matches('/').to_string(),
            host_header: url.host_header.clone(),
            transport,
            unidentified_transport,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn host_header(&self) -> Option<&str> {
        self.host_header.as_deref()
    }

    pub fn transport(&self, unidentified: bool) -> &Arc<dyn HttpTransport> {
        if unidentified {
            &self.unidentified_transport
        } else {
            &self.transport
        }
    }

    /// Full URL for a path or an absolute (signed) URL.
    ///
    /// Absolute URLs are re-targeted at this endpoint: scheme, host and port
    /// come from the endpoint, the endpoint's base path is kept, and the
    /// signed URL's path and query are appended.
    pub fn resolve(&self, target: &str) -> Result<String, ConfigError> {
        if target.starts_with("http://") || target.starts_with("https://") {
            let signed = Url::parse(target)
                .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", target, e)))?;
            let mut url = format!("{}{}", self.base_url, signed.path());
            if let Some(query) = signed.query() {
                url.push('?');
                url.push_str(query);
            }
            Ok(url)
        } else if target.is_empty() || target.starts_with('/') {
            Ok(format!("{}{}", self.base_url, target))
        } else {
            Ok(format!("{}/{}", self.base_url, target))
        }
    }
}

/// Non-empty set of interchangeable endpoints of one logical service.
#[derive(Clone, Debug)]
pub struct EndpointPool {
    endpoints: Vec<Endpoint>,
}

impl EndpointPool {
    pub fn new(label: &'static str, endpoints: Vec<Endpoint>) -> Result<Self, ConfigError> {
        if endpoints.is_empty() {
            return Err(ConfigError::EmptyPool(label));
        }
        Ok(EndpointPool { endpoints })
    }

    /// Builds one endpoint per URL, sharing one transport per endpoint.
    pub fn build(
        label: &'static str,
        urls: &[ServiceUrl],
        factory: &dyn TransportFactory,
    ) -> Result<Self, ConfigError> {
        let endpoints = urls
            .iter()
            .map(|url| Endpoint::new(url, factory.create(url)?))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(label, endpoints)
    }

    /// Builds one endpoint per URL with separate identified and unidentified
    /// transports.
    pub fn build_split(
        label: &'static str,
        urls: &[ServiceUrl],
        factory: &dyn TransportFactory,
    ) -> Result<Self, ConfigError> {
        let endpoints = urls
            .iter()
            .map(|url| Endpoint::with_unidentified(url, factory.create(url)?, factory.create(url)?))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(label, endpoints)
    }

    /// Uniform-random endpoint choice.
    pub fn pick(&self) -> &Endpoint {
        let index = thread_rng().gen_range(0..self.endpoints.len());
        &self.endpoints[index]
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Endpoint pools for every logical service.
#[derive(Clone, Debug)]
pub struct ServiceEndpoints {
    pub service: EndpointPool,
    pub cdn: BTreeMap<u32, EndpointPool>,
    pub contact_discovery: Option<EndpointPool>,
    pub key_backup: Option<EndpointPool>,
    pub storage: Option<EndpointPool>,
}

impl ServiceEndpoints {
    /// Builds all pools. Fails before creating any transport if the
    /// configuration is invalid.
    pub fn new(
        config: &ServiceConfiguration,
        factory: &dyn TransportFactory,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let service = EndpointPool::build_split("service", &config.service_urls, factory)?;

        let mut cdn = BTreeMap::new();
        for (number, urls) in &config.cdn_urls {
            cdn.insert(*number, EndpointPool::build("cdn", urls, factory)?);
        }

        Ok(ServiceEndpoints {
            service,
            cdn,
            contact_discovery: optional_pool(
                "contact discovery",
                &config.contact_discovery_urls,
                factory,
            )?,
            key_backup: optional_pool("key backup", &config.key_backup_urls, factory)?,
            storage: optional_pool("storage", &config.storage_urls, factory)?,
        })
    }

    pub fn cdn(&self, number: u32) -> Option<&EndpointPool> {
        self.cdn.get(&number)
    }
}

fn optional_pool(
    label: &'static str,
    urls: &[ServiceUrl],
    factory: &dyn TransportFactory,
) -> Result<Option<EndpointPool>, ConfigError> {
    if urls.is_empty() {
        Ok(None)
    } else {
        EndpointPool::build(label, urls, factory).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrustStore;
    use crate::network::mock::MockHttpTransport;

    fn endpoint(base: &str) -> Endpoint {
        let url = ServiceUrl::new(base, TrustStore::from_der(vec![vec![0]]));
        Endpoint::new(&url, Arc::new(MockHttpTransport::new())).unwrap()
    }

    #[test]
    fn test_resolve_relative_paths() {
        let e = endpoint("https://api.example.test/");
        assert_eq!(e.resolve("/v1/config").unwrap(), "https://api.example.test/v1/config");
        assert_eq!(e.resolve("attachments/").unwrap(), "https://api.example.test/attachments/");
        assert_eq!(e.resolve("").unwrap(), "https://api.example.test");
    }

    #[test]
    fn test_resolve_retargets_signed_url() {
        let e = endpoint("https://front.example.test:8443/cdn2");
        let resolved = e
            .resolve("https://storage.real.test/upload/abc?sig=1&x=2")
            .unwrap();
        assert_eq!(resolved, "https://front.example.test:8443/cdn2/upload/abc?sig=1&x=2");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let url = ServiceUrl::new("not a url", TrustStore::from_der(vec![vec![0]]));
        let result = Endpoint::new(&url, Arc::new(MockHttpTransport::new()));
        assert!(matches!(result, Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_empty_pool_rejected() {
        assert!(matches!(
            EndpointPool::new("cdn", Vec::new()),
            Err(ConfigError::EmptyPool("cdn"))
        ));
    }
}
