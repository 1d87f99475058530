// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Production HTTP transport.
//!
//! One blocking `reqwest` client per endpoint, built once with a pinned
//! rustls configuration and reused for every call to that endpoint.
//!
//! Each exchange runs on its own thread. The caller waits on a channel fed
//! by both the exchange and the call's cancel hook, so a canceled call
//! returns at once even while blocked on response headers or body.

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use reqwest::blocking::{multipart, Body, Client};
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;

use super::error::NetworkError;
use super::in_flight::{CallHandle, CancelableReader, UploadCanceled};
use super::pinning::pinned_client_config;
use super::transport::{
    FormPart, HttpRequest, HttpResponse, HttpTransport, Interceptor, Method, MultipartForm,
    RequestBody, TransportResult,
};
use crate::config::{ConfigError, ServiceConfiguration, ServiceUrl};

/// Slack over the per-call timeout before the caller gives up on an exchange
/// thread that never reported back.
const EXCHANGE_GRACE: Duration = Duration::from_secs(5);

/// Blocking transport backed by `reqwest`.
pub struct ReqwestTransport {
    client: Client,
    interceptors: Arc<Vec<Arc<dyn Interceptor>>>,
}

impl ReqwestTransport {
    /// Builds a transport pinned to `url`'s trust store.
    pub fn new(
        url: &ServiceUrl,
        config: &ServiceConfiguration,
        interceptors: Arc<Vec<Arc<dyn Interceptor>>>,
    ) -> Result<Self, ConfigError> {
        let tls = pinned_client_config(
            &url.url,
            &url.trust_store,
            url.tls_policy.unwrap_or_default(),
        )?;

        let mut builder = Client::builder()
            .use_preconfigured_tls(tls)
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout())
            .redirect(Policy::none());

        if let Some(proxy_url) = config.proxy.proxy_url() {
            let proxy =
                reqwest::Proxy::all(&proxy_url).map_err(|e| ConfigError::Client(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        for (host, addrs) in config.dns.iter() {
            builder = builder.resolve_to_addrs(host, addrs);
        }

        let client = builder
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(ReqwestTransport {
            client,
            interceptors,
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute(
        &self,
        mut request: HttpRequest,
        call: &CallHandle,
    ) -> TransportResult<HttpResponse> {
        apply_interceptors(&self.interceptors, &mut request);

        let wait_limit = request.timeout + EXCHANGE_GRACE;
        let (tx, rx) = mpsc::channel();

        let canceled = tx.clone();
        call.on_cancel(move || {
            let _ = canceled.send(Err(NetworkError::Canceled));
        });

        let client = self.client.clone();
        let exchange_call = call.clone();
        thread::Builder::new()
            .name("pushline-http".to_string())
            .spawn(move || {
                let _ = tx.send(exchange(&client, request, &exchange_call));
            })
            .map_err(|e| NetworkError::Interrupted(e.to_string()))?;

        match rx.recv_timeout(wait_limit) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(NetworkError::Timeout),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(NetworkError::Interrupted(
                "exchange thread exited without a result".to_string(),
            )),
        }
    }
}

/// Runs `interceptors` in order. A `Host` header already on the request is
/// restored afterwards so the endpoint's override always wins.
pub(crate) fn apply_interceptors(
    interceptors: &[Arc<dyn Interceptor>],
    request: &mut HttpRequest,
) {
    let host = request.header("Host").map(str::to_owned);
    for interceptor in interceptors {
        interceptor.intercept(request);
    }
    if let Some(host) = host {
        request.set_header("Host", &host);
    }
}

fn exchange(
    client: &Client,
    request: HttpRequest,
    call: &CallHandle,
) -> TransportResult<HttpResponse> {
    let method = match request.method {
        Method::Get => reqwest::Method::GET,
        Method::Put => reqwest::Method::PUT,
        Method::Post => reqwest::Method::POST,
        Method::Delete => reqwest::Method::DELETE,
    };

    let mut builder = client.request(method, &request.url).timeout(request.timeout);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder = match request.body {
        RequestBody::Empty => match request.method {
            Method::Put | Method::Post => builder.body(Vec::new()),
            Method::Get | Method::Delete => builder,
        },
        RequestBody::Bytes { content_type, data } => {
            builder.header(CONTENT_TYPE, content_type).body(data)
        }
        RequestBody::Stream {
            content_type,
            length,
            reader,
        } => builder
            .header(CONTENT_TYPE, content_type)
            .body(Body::sized(CancelableReader::new(reader, call.clone()), length)),
        RequestBody::Multipart(form) => builder.multipart(to_reqwest_form(form, call)?),
    };

    let response = builder.send().map_err(|e| map_error(&e, call))?;

    let status = response.status();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let body = response.bytes().map_err(|e| map_error(&e, call))?;

    Ok(HttpResponse {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or_default().to_string(),
        headers,
        body: body.to_vec(),
    })
}

fn to_reqwest_form(form: MultipartForm, call: &CallHandle) -> TransportResult<multipart::Form> {
    let mut out = multipart::Form::new();
    for part in form.parts {
        out = match part {
            FormPart::Text { name, value } => out.text(name, value),
            FormPart::Stream {
                name,
                file_name,
                content_type,
                length,
                reader,
            } => {
                let part = multipart::Part::reader_with_length(
                    CancelableReader::new(reader, call.clone()),
                    length,
                )
                .file_name(file_name)
                .mime_str(&content_type)
                .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;
                out.part(name, part)
            }
        };
    }
    Ok(out)
}

fn find_in_chain<'a, T: std::error::Error + 'static>(
    err: &'a (dyn std::error::Error + 'static),
) -> Option<&'a T> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<T>() {
            return Some(found);
        }
        current = e.source();
    }
    None
}

fn chain_message(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        message.push_str(": ");
        message.push_str(&e.to_string());
        current = e.source();
    }
    message
}

fn map_error(err: &reqwest::Error, call: &CallHandle) -> NetworkError {
    if call.is_canceled() || UploadCanceled::is_in_chain(err) {
        return NetworkError::Canceled;
    }
    let message = chain_message(err);
    if err.is_timeout() {
        NetworkError::Timeout
    } else if let Some(tls) = find_in_chain::<rustls::Error>(err) {
        NetworkError::Tls(tls.to_string())
    } else if err.is_connect() && message.contains("dns error") {
        NetworkError::Dns(message)
    } else if err.is_connect() {
        NetworkError::ConnectionFailed(message)
    } else if err.is_builder() {
        NetworkError::InvalidRequest(message)
    } else {
        NetworkError::Interrupted(message)
    }
}
