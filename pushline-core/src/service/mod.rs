// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Service Socket
//!
//! Named operations over every logical service: main API, CDNs, enclaves
//! and storage. Each operation picks its pool, builds the request, and
//! classifies the response. Retry policy stays with the caller.

pub mod entities;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::attestation::{
    self, AttestationSession, AttestationTarget, QuoteSignatureVerifier, RsaSignatureVerifier,
};
use crate::config::{ConfigError, ServiceConfiguration, FORM_UPLOAD_CDN, RESUMABLE_UPLOAD_CDN};
use crate::credentials::{basic_header, AuthContext, CredentialsProvider, UnidentifiedAccess};
use crate::error::{AuthCredentials, ServiceError, ServiceResult};
use crate::network::{
    validate_cdn_response, validate_enclave_response, validate_service_response,
    validate_storage_response, EndpointPool, HttpResponse, InFlightCalls, Interceptor,
    OutgoingRequest, PinnedTransportFactory, RequestBody, RequestDispatcher, ResponseHandler,
    ServiceEndpoints, TransportFactory,
};
use crate::upload::form::upload_to_cdn0;
use crate::upload::resumable::upload_to_cdn2;
use crate::upload::{
    AttachmentDigest, AttachmentUpload, AttachmentUploadForm, ResumableUploadSpec, UploadForm,
    ATTACHMENT_UPLOAD_PATH, AVATAR_UPLOAD_PATH, CDN2_RESUMABLE_LINK_LIFETIME,
};

use entities::{
    EnclaveRequestEntity, EnclaveResponseEntity, OutgoingPushMessageList, PreKeyResponse,
    PreKeyState, PreKeyStatus, ProfileEntity, RemoteConfigResponse, SendMessageResponse,
    SignedPreKeyEntity, TokenResponse, WhoAmIResponse,
};

/// Header carrying the client agent string on main API requests.
pub const AGENT_HEADER: &str = "X-Service-Agent";

const WHO_AM_I: &str = "/v1/accounts/whoami";
const PREKEY_METADATA_PATH: &str = "/v2/keys";
const PREKEY_PATH: &str = "/v2/keys";
const SIGNED_PREKEY_PATH: &str = "/v2/keys/signed";
const MESSAGE_PATH: &str = "/v1/messages";
const PROFILE_PATH: &str = "/v1/profile";
const AVATAR_FORM_PATH: &str = "/v1/profile/form/avatar";
const ATTACHMENT_FORM_PATH: &str = "/v4/attachments/form/upload";
const DIRECTORY_AUTH_PATH: &str = "/v1/directory/auth";
const KBS_AUTH_PATH: &str = "/v1/backup/auth";
const STORAGE_AUTH_PATH: &str = "/v1/storage/auth";
const REMOTE_CONFIG_PATH: &str = "/v1/config";
const TOKEN_PATH: &str = "/v1/token";
const DISCOVERY_PATH: &str = "/v1/discovery";
const BACKUP_PATH: &str = "/v1/backup";
const STORAGE_MANIFEST_PATH: &str = "/v1/storage/manifest";
const STORAGE_READ_PATH: &str = "/v1/storage/read";
const STORAGE_WRITE_PATH: &str = "/v1/storage";

/// Wall-clock source for expiry checks.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;

    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.now_millis()).unwrap_or_else(Utc::now)
    }
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Enclave-backed services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnclaveService {
    ContactDiscovery,
    KeyBackup,
}

impl EnclaveService {
    fn label(&self) -> &'static str {
        match self {
            EnclaveService::ContactDiscovery => "contact discovery",
            EnclaveService::KeyBackup => "key backup",
        }
    }
}

/// Client for the Pushline service.
pub struct ServiceSocket {
    endpoints: ServiceEndpoints,
    dispatcher: RequestDispatcher,
    credentials: Arc<dyn CredentialsProvider>,
    agent: Option<String>,
    clock: Arc<dyn Clock>,
    quote_verifier: Arc<dyn QuoteSignatureVerifier>,
}

impl ServiceSocket {
    /// Builds a socket with pinned production transports.
    ///
    /// Fails before building any transport if CDN 0 or CDN 2 is missing.
    pub fn new(
        config: &ServiceConfiguration,
        credentials: Arc<dyn CredentialsProvider>,
    ) -> Result<Self, ConfigError> {
        Self::with_interceptors(config, credentials, Vec::new())
    }

    /// Like [`ServiceSocket::new`], with interceptors applied to every request.
    pub fn with_interceptors(
        config: &ServiceConfiguration,
        credentials: Arc<dyn CredentialsProvider>,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let factory = PinnedTransportFactory::new(config, interceptors);
        Self::with_transport_factory(config, credentials, &factory)
    }

    /// Builds a socket whose transports come from `factory`.
    pub fn with_transport_factory(
        config: &ServiceConfiguration,
        credentials: Arc<dyn CredentialsProvider>,
        factory: &dyn TransportFactory,
    ) -> Result<Self, ConfigError> {
        let endpoints = ServiceEndpoints::new(config, factory)?;
        Ok(ServiceSocket {
            endpoints,
            dispatcher: RequestDispatcher::new(config.timeout()),
            credentials,
            agent: config.user_agent.clone(),
            clock: Arc::new(SystemClock),
            quote_verifier: Arc::new(RsaSignatureVerifier::new(
                config.attestation_signing_keys.clone(),
            )),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_quote_verifier(mut self, verifier: Arc<dyn QuoteSignatureVerifier>) -> Self {
        self.quote_verifier = verifier;
        self
    }

    pub fn endpoints(&self) -> &ServiceEndpoints {
        &self.endpoints
    }

    /// Changes the per-call timeout for calls issued from now on.
    pub fn set_soft_timeout(&self, timeout: Duration) {
        self.dispatcher.set_timeout(timeout);
    }

    /// Cancels every call currently on the wire. Returns how many.
    pub fn cancel_in_flight_requests(&self) -> usize {
        self.dispatcher.cancel_in_flight_requests()
    }

    pub fn in_flight(&self) -> Arc<InFlightCalls> {
        self.dispatcher.in_flight().clone()
    }

    // -- helpers --

    fn basic_auth(&self) -> AuthContext {
        AuthContext::from_credentials(self.credentials.as_ref())
    }

    fn service_call(
        &self,
        request: OutgoingRequest,
        auth: &AuthContext,
        handler: Option<ResponseHandler<'_>>,
    ) -> ServiceResult<HttpResponse> {
        let request = match &self.agent {
            Some(agent) => request.header(AGENT_HEADER, agent),
            None => request,
        };
        let response = self
            .dispatcher
            .dispatch(&self.endpoints.service, request, auth)?;
        validate_service_response(response, handler)
    }

    fn cdn_pool(&self, number: u32) -> ServiceResult<&EndpointPool> {
        self.endpoints
            .cdn(number)
            .ok_or_else(|| ServiceError::MissingConfiguration(format!("CDN {}", number)))
    }

    fn enclave_pool(&self, service: EnclaveService) -> ServiceResult<&EndpointPool> {
        let pool = match service {
            EnclaveService::ContactDiscovery => self.endpoints.contact_discovery.as_ref(),
            EnclaveService::KeyBackup => self.endpoints.key_backup.as_ref(),
        };
        pool.ok_or_else(|| ServiceError::MissingConfiguration(service.label().to_string()))
    }

    fn storage_pool(&self) -> ServiceResult<&EndpointPool> {
        self.endpoints
            .storage
            .as_ref()
            .ok_or_else(|| ServiceError::MissingConfiguration("storage".to_string()))
    }

    // -- account and keys --

    pub fn whoami(&self) -> ServiceResult<WhoAmIResponse> {
        let response = self.service_call(OutgoingRequest::get(WHO_AM_I), &self.basic_auth(), None)?;
        decode(&response)
    }

    /// Number of one-time prekeys the server still holds for this device.
    pub fn available_prekeys(&self) -> ServiceResult<u32> {
        let response = self.service_call(
            OutgoingRequest::get(PREKEY_METADATA_PATH),
            &self.basic_auth(),
            None,
        )?;
        Ok(decode::<PreKeyStatus>(&response)?.count)
    }

    pub fn register_prekeys(&self, state: &PreKeyState) -> ServiceResult<()> {
        let request = OutgoingRequest::put(PREKEY_PATH).body(RequestBody::json(encode(state)?));
        self.service_call(request, &self.basic_auth(), None)?;
        Ok(())
    }

    pub fn set_signed_prekey(&self, signed: &SignedPreKeyEntity) -> ServiceResult<()> {
        let request =
            OutgoingRequest::put(SIGNED_PREKEY_PATH).body(RequestBody::json(encode(signed)?));
        self.service_call(request, &self.basic_auth(), None)?;
        Ok(())
    }

    /// Prekey bundle of one device; the primary device is addressed as `*`.
    pub fn prekeys(
        &self,
        destination: &str,
        device_id: u32,
        access: Option<&UnidentifiedAccess>,
    ) -> ServiceResult<PreKeyResponse> {
        let device = if device_id == crate::credentials::DEFAULT_DEVICE_ID {
            "*".to_string()
        } else {
            device_id.to_string()
        };
        let path = format!("{}/{}/{}", PREKEY_PATH, destination, device);
        let auth = AuthContext::unidentified_or(access, self.basic_auth());
        let response = self.service_call(
            OutgoingRequest::get(&path),
            &auth,
            Some(&unregistered(destination)),
        )?;
        decode(&response)
    }

    // -- messages and profiles --

    pub fn send_message(
        &self,
        bundle: &OutgoingPushMessageList,
        access: Option<&UnidentifiedAccess>,
    ) -> ServiceResult<SendMessageResponse> {
        let path = format!("{}/{}", MESSAGE_PATH, bundle.destination);
        let request = OutgoingRequest::put(&path).body(RequestBody::json(encode(bundle)?));
        let auth = AuthContext::unidentified_or(access, self.basic_auth());
        let response =
            self.service_call(request, &auth, Some(&unregistered(&bundle.destination)))?;
        if response.body.is_empty() {
            return Ok(SendMessageResponse::default());
        }
        decode(&response)
    }

    pub fn retrieve_profile(
        &self,
        target: &str,
        access: Option<&UnidentifiedAccess>,
    ) -> ServiceResult<ProfileEntity> {
        let path = format!("{}/{}", PROFILE_PATH, target);
        let auth = AuthContext::unidentified_or(access, self.basic_auth());
        let response = self.service_call(OutgoingRequest::get(&path), &auth, None)?;
        decode(&response)
    }

    pub fn remote_config(&self) -> ServiceResult<RemoteConfigResponse> {
        let response = self.service_call(
            OutgoingRequest::get(REMOTE_CONFIG_PATH),
            &self.basic_auth(),
            None,
        )?;
        decode(&response)
    }

    // -- uploads --

    pub fn avatar_upload_form(&self) -> ServiceResult<UploadForm> {
        let response = self.service_call(
            OutgoingRequest::get(AVATAR_FORM_PATH),
            &self.basic_auth(),
            None,
        )?;
        decode(&response)
    }

    /// Uploads a profile avatar to CDN 0 with a signed form.
    pub fn upload_avatar(
        &self,
        form: &UploadForm,
        upload: AttachmentUpload,
    ) -> ServiceResult<AttachmentDigest> {
        let pool = self.cdn_pool(FORM_UPLOAD_CDN)?;
        upload_to_cdn0(&self.dispatcher, pool, AVATAR_UPLOAD_PATH, form, upload)
    }

    /// Single-shot attachment upload to CDN 0.
    pub fn upload_attachment_form(
        &self,
        form: &UploadForm,
        upload: AttachmentUpload,
    ) -> ServiceResult<AttachmentDigest> {
        let pool = self.cdn_pool(FORM_UPLOAD_CDN)?;
        upload_to_cdn0(&self.dispatcher, pool, ATTACHMENT_UPLOAD_PATH, form, upload)
    }

    pub fn attachment_upload_form(&self) -> ServiceResult<AttachmentUploadForm> {
        let response = self.service_call(
            OutgoingRequest::get(ATTACHMENT_FORM_PATH),
            &self.basic_auth(),
            None,
        )?;
        decode(&response)
    }

    /// Opens a resumable upload session and returns its resume location.
    pub fn create_resumable_upload_url(
        &self,
        form: &AttachmentUploadForm,
    ) -> ServiceResult<String> {
        if form.cdn != RESUMABLE_UPLOAD_CDN {
            return Err(ServiceError::MissingConfiguration(format!(
                "resumable uploads on CDN {}",
                form.cdn
            )));
        }
        let pool = self.cdn_pool(form.cdn)?;

        let mut request = OutgoingRequest::post(&form.signed_upload_location);
        for (name, value) in &form.headers {
            if !name.eq_ignore_ascii_case("host") {
                request = request.header(name, value);
            }
        }
        let request = request
            .header("Content-Length", "0")
            .header("Content-Type", "application/octet-stream");

        let response = self.dispatcher.dispatch(pool, request, &AuthContext::None)?;
        let response = validate_cdn_response(response)?;
        response
            .header("Location")
            .map(str::to_string)
            .ok_or_else(|| ServiceError::MalformedResponse("missing Location header".to_string()))
    }

    /// Creates everything needed to upload one attachment resumably.
    pub fn resumable_upload_spec(
        &self,
        form: &AttachmentUploadForm,
    ) -> ServiceResult<ResumableUploadSpec> {
        let resume_location = self.create_resumable_upload_url(form)?;

        let rng = SystemRandom::new();
        let mut secret_key = [0u8; 64];
        let mut iv = [0u8; 16];
        rng.fill(&mut secret_key)
            .expect("System RNG should not fail");
        rng.fill(&mut iv).expect("System RNG should not fail");

        Ok(ResumableUploadSpec {
            secret_key,
            iv,
            cdn_key: form.key.clone(),
            cdn_number: form.cdn,
            resume_location,
            expires_at_millis: self.clock.now_millis()
                + CDN2_RESUMABLE_LINK_LIFETIME.as_millis() as i64,
        })
    }

    /// Uploads (or resumes uploading) an attachment to CDN 2.
    pub fn upload_attachment(
        &self,
        upload: AttachmentUpload,
        spec: &ResumableUploadSpec,
    ) -> ServiceResult<AttachmentDigest> {
        if spec.cdn_number != RESUMABLE_UPLOAD_CDN {
            return Err(ServiceError::MissingConfiguration(format!(
                "resumable uploads on CDN {}",
                spec.cdn_number
            )));
        }
        let pool = self.cdn_pool(spec.cdn_number)?;
        upload_to_cdn2(
            &self.dispatcher,
            pool,
            upload,
            spec,
            self.clock.now_millis(),
        )
    }

    // -- enclaves --

    fn credentials_authorization(&self, path: &str) -> ServiceResult<String> {
        let response = self.service_call(OutgoingRequest::get(path), &self.basic_auth(), None)?;
        let credentials: AuthCredentials = decode(&response)?;
        Ok(basic_header(&credentials.username, &credentials.password))
    }

    /// `Authorization` value for contact discovery.
    pub fn contact_discovery_authorization(&self) -> ServiceResult<String> {
        self.credentials_authorization(DIRECTORY_AUTH_PATH)
    }

    /// `Authorization` value for key backup.
    pub fn key_backup_authorization(&self) -> ServiceResult<String> {
        self.credentials_authorization(KBS_AUTH_PATH)
    }

    fn target<'a>(
        &'a self,
        enclave_name: &'a str,
        mrenclave: &'a str,
        authorization: &'a str,
    ) -> AttestationTarget<'a> {
        AttestationTarget {
            enclave_name,
            mrenclave,
            authorization,
            verifier: self.quote_verifier.as_ref(),
            now: self.clock.now(),
        }
    }

    /// Attests a single enclave.
    pub fn attest(
        &self,
        service: EnclaveService,
        enclave_name: &str,
        mrenclave: &str,
        authorization: &str,
    ) -> ServiceResult<AttestationSession> {
        let pool = self.enclave_pool(service)?;
        let target = self.target(enclave_name, mrenclave, authorization);
        attestation::attest(&self.dispatcher, pool, &target)
    }

    /// Attests every replica of an enclave; all or nothing.
    pub fn attest_multi(
        &self,
        service: EnclaveService,
        enclave_name: &str,
        mrenclave: &str,
        authorization: &str,
    ) -> ServiceResult<BTreeMap<String, AttestationSession>> {
        let pool = self.enclave_pool(service)?;
        let target = self.target(enclave_name, mrenclave, authorization);
        attestation::attest_multi(&self.dispatcher, pool, &target)
    }

    /// Fetches a key backup token.
    pub fn key_backup_token(
        &self,
        enclave_name: &str,
        authorization: &str,
    ) -> ServiceResult<TokenResponse> {
        let pool = self.enclave_pool(EnclaveService::KeyBackup)?;
        let path = format!("{}/{}", TOKEN_PATH, enclave_name);
        let auth = AuthContext::EnclaveToken {
            authorization: authorization.to_string(),
            cookies: Vec::new(),
        };
        let response = self
            .dispatcher
            .dispatch(pool, OutgoingRequest::get(&path), &auth)?;
        decode(&validate_enclave_response(response)?)
    }

    fn enclave_exchange(
        &self,
        service: EnclaveService,
        path: &str,
        session: &AttestationSession,
        authorization: &str,
        plaintext: &[u8],
    ) -> ServiceResult<Vec<u8>> {
        let pool = self.enclave_pool(service)?;
        let sealed = session.seal(plaintext)?;
        let body = encode(&EnclaveRequestEntity {
            request_id: sealed.request_id,
            iv: sealed.iv.to_vec(),
            data: sealed.data,
            mac: sealed.mac.to_vec(),
        })?;

        let auth = AuthContext::EnclaveToken {
            authorization: authorization.to_string(),
            cookies: session.cookies().to_vec(),
        };
        debug!(service = service.label(), "enclave request");
        let request = OutgoingRequest::put(path).body(RequestBody::json(body));
        let response = validate_enclave_response(self.dispatcher.dispatch(pool, request, &auth)?)?;

        let sealed_response: EnclaveResponseEntity = decode(&response)?;
        Ok(session.open(
            &sealed_response.iv,
            &sealed_response.data,
            &sealed_response.mac,
        )?)
    }

    /// Sends a sealed contact discovery query and returns the opened reply.
    pub fn contact_discovery(
        &self,
        session: &AttestationSession,
        enclave_name: &str,
        authorization: &str,
        query: &[u8],
    ) -> ServiceResult<Vec<u8>> {
        let path = format!("{}/{}", DISCOVERY_PATH, enclave_name);
        self.enclave_exchange(
            EnclaveService::ContactDiscovery,
            &path,
            session,
            authorization,
            query,
        )
    }

    /// Sends a sealed key backup request and returns the opened reply.
    pub fn key_backup(
        &self,
        session: &AttestationSession,
        enclave_name: &str,
        authorization: &str,
        request: &[u8],
    ) -> ServiceResult<Vec<u8>> {
        let path = format!("{}/{}", BACKUP_PATH, enclave_name);
        self.enclave_exchange(EnclaveService::KeyBackup, &path, session, authorization, request)
    }

    // -- storage --

    /// `Authorization` value for the storage service.
    pub fn storage_authorization(&self) -> ServiceResult<String> {
        self.credentials_authorization(STORAGE_AUTH_PATH)
    }

    fn storage_call(
        &self,
        request: OutgoingRequest,
        authorization: &str,
    ) -> ServiceResult<HttpResponse> {
        let pool = self.storage_pool()?;
        let auth = AuthContext::Authorization(authorization.to_string());
        validate_storage_response(self.dispatcher.dispatch(pool, request, &auth)?)
    }

    /// Current storage manifest (opaque protobuf bytes).
    pub fn storage_manifest(&self, authorization: &str) -> ServiceResult<Vec<u8>> {
        Ok(self
            .storage_call(OutgoingRequest::get(STORAGE_MANIFEST_PATH), authorization)?
            .body)
    }

    /// Storage manifest if it differs from `version`, `None` otherwise.
    pub fn storage_manifest_if_different(
        &self,
        authorization: &str,
        version: u64,
    ) -> ServiceResult<Option<Vec<u8>>> {
        let path = format!("{}/version/{}", STORAGE_MANIFEST_PATH, version);
        let response = self.storage_call(OutgoingRequest::get(&path), authorization)?;
        if response.status == 204 {
            Ok(None)
        } else {
            Ok(Some(response.body))
        }
    }

    /// Reads storage items; `operation` and the result are protobuf bytes.
    pub fn read_storage_items(
        &self,
        authorization: &str,
        operation: Vec<u8>,
    ) -> ServiceResult<Vec<u8>> {
        let request =
            OutgoingRequest::put(STORAGE_READ_PATH).body(RequestBody::protobuf(operation));
        Ok(self.storage_call(request, authorization)?.body)
    }

    /// Writes storage items. A conflict carries the server's manifest.
    pub fn write_storage(&self, authorization: &str, operation: Vec<u8>) -> ServiceResult<()> {
        let request =
            OutgoingRequest::put(STORAGE_WRITE_PATH).body(RequestBody::protobuf(operation));
        self.storage_call(request, authorization)?;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(response: &HttpResponse) -> ServiceResult<T> {
    response
        .json()
        .map_err(|e| ServiceError::MalformedResponse(e.to_string()))
}

fn encode<T: Serialize>(value: &T) -> ServiceResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ServiceError::MalformedResponse(e.to_string()))
}

/// 404 on a recipient-addressed call means the recipient is not registered.
fn unregistered(destination: &str) -> impl Fn(&HttpResponse) -> Option<ServiceError> + '_ {
    move |response| {
        (response.status == 404).then(|| ServiceError::UnregisteredUser(destination.to_string()))
    }
}
