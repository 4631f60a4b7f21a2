//! OCI distribution API client over blocking `reqwest`.
//!
//! Authentication follows the registry token flow: a static access token is
//! sent as a bearer token; otherwise the first `401` challenge decides. A
//! `Bearer` challenge is answered at its realm (refresh token grant, or a GET
//! with basic credentials, or anonymous), a `Basic` challenge with the
//! username and password.

use std::any::Any;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, LOCATION, WWW_AUTHENTICATE};
use serde::Deserialize;

use crate::auth::{Challenge, Credential};
use crate::digest::Digest;
use crate::error::TransferError;
use crate::manifest::{Descriptor, MANIFEST_MEDIA_TYPE};
use crate::options::TransferOptions;
use crate::reference::ModuleReference;
use crate::repository::{Connector, Repository};

const CLIENT_ID: &str = "kast";

/// How often a waiting transfer looks at its cancel flag and deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Opens [`RemoteRepository`] handles sharing one set of transfer options.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    options: TransferOptions,
}

impl HttpConnector {
    /// Creates a connector applying `options` to every request.
    #[must_use]
    pub const fn new(options: TransferOptions) -> Self {
        Self { options }
    }
}

impl Connector for HttpConnector {
    fn connect(
        &self,
        reference: &ModuleReference,
        credential: Option<&Credential>,
    ) -> Result<Box<dyn Repository>, TransferError> {
        Ok(Box::new(RemoteRepository::new(
            reference.clone(),
            credential.cloned(),
            self.options.clone(),
        )?))
    }
}

/// A repository on a remote registry.
#[derive(Debug)]
pub struct RemoteRepository {
    reference: ModuleReference,
    client: Client,
    credential: Credential,
    options: TransferOptions,
    authorization: Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl RemoteRepository {
    /// Creates a client for `reference`.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::Network` if the HTTP client cannot be built.
    pub fn new(
        reference: ModuleReference,
        credential: Option<Credential>,
        options: TransferOptions,
    ) -> Result<Self, TransferError> {
        let client = Client::builder()
            .user_agent(concat!("kast/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let credential = credential.unwrap_or_default();
        let authorization = credential
            .access_token
            .as_ref()
            .map(|token| format!("Bearer {token}"));
        Ok(Self {
            reference,
            client,
            credential,
            options,
            authorization: Mutex::new(authorization),
        })
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/{suffix}", self.reference.base_url())
    }

    fn current_authorization(&self) -> Option<String> {
        self.authorization
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store_authorization(&self, value: String) {
        *self
            .authorization
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    /// Sends a request, answering one authentication challenge if needed.
    fn send(&self, build: impl Fn(&Client) -> RequestBuilder) -> Result<Response, TransferError> {
        let response = self.send_once(&build)?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(Challenge::parse)
            .ok_or_else(|| TransferError::Auth {
                message: format!("{} rejected the request without a usable challenge", self.reference.registry),
            })?;
        let authorization = self.answer_challenge(&challenge)?;
        self.store_authorization(authorization);
        self.send_once(&build)
    }

    fn send_once(&self, build: &impl Fn(&Client) -> RequestBuilder) -> Result<Response, TransferError> {
        let mut request = build(&self.client).timeout(self.options.request_timeout());
        if let Some(authorization) = self.current_authorization() {
            request = request.header(AUTHORIZATION, authorization);
        }
        abortable(&self.options, move || request.send())
    }

    fn answer_challenge(&self, challenge: &Challenge) -> Result<String, TransferError> {
        match challenge.scheme.as_str() {
            "basic" => self.credential.basic_header().ok_or_else(|| TransferError::Auth {
                message: format!("{} requires a username and password", self.reference.registry),
            }),
            "bearer" => self.fetch_token(challenge).map(|token| format!("Bearer {token}")),
            other => Err(TransferError::Auth {
                message: format!("unsupported authentication scheme \"{other}\""),
            }),
        }
    }

    fn fetch_token(&self, challenge: &Challenge) -> Result<String, TransferError> {
        let realm = challenge.param("realm").ok_or_else(|| TransferError::Auth {
            message: "bearer challenge without realm".to_string(),
        })?;
        let service = challenge.param("service").unwrap_or_default();
        let default_scope = format!("repository:{}:pull,push", self.reference.repository);
        let scope = challenge.param("scope").unwrap_or(&default_scope);
        tracing::debug!(realm, service, scope, "requesting registry token");

        self.options.check()?;
        let request = if let Some(refresh) = &self.credential.refresh_token {
            self.client.post(realm).form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh.as_str()),
                ("service", service),
                ("scope", scope),
                ("client_id", CLIENT_ID),
            ])
        } else {
            let request = self
                .client
                .get(realm)
                .query(&[("service", service), ("scope", scope)]);
            match (&self.credential.username, &self.credential.password) {
                (Some(user), Some(pass)) => request.basic_auth(user, Some(pass)),
                _ => request,
            }
        };
        let request = request.timeout(self.options.request_timeout());
        let response = check_status(abortable(&self.options, move || request.send())?, realm)?;
        let body = read_body(&self.options, response)?;
        let parsed: TokenResponse =
            serde_json::from_slice(&body).map_err(|e| TransferError::Auth {
                message: format!("unreadable token response from {realm}: {e}"),
            })?;
        parsed
            .token
            .or(parsed.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TransferError::Auth {
                message: format!("token response from {realm} holds no token"),
            })
    }

    fn upload_location(&self) -> Result<reqwest::Url, TransferError> {
        let start = self.url("blobs/uploads/");
        let response = check_status(self.send(|c| c.post(&start))?, &start)?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| TransferError::Registry {
                status: response.status().as_u16(),
                message: "upload session without Location header".to_string(),
            })?;
        reqwest::Url::parse(&start)
            .and_then(|base| base.join(location))
            .map_err(|e| TransferError::Registry {
                status: response.status().as_u16(),
                message: format!("invalid upload location \"{location}\": {e}"),
            })
    }
}

impl Repository for RemoteRepository {
    fn reference(&self) -> &ModuleReference {
        &self.reference
    }

    fn blob_exists(&self, digest: &Digest) -> Result<bool, TransferError> {
        let url = self.url(&format!("blobs/{digest}"));
        let response = self.send(|c| c.head(&url))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            _ => check_status(response, &url).map(|_| true),
        }
    }

    fn push_blob(&self, descriptor: &Descriptor, content: &[u8]) -> Result<(), TransferError> {
        let mut location = self.upload_location()?;
        let _ = location
            .query_pairs_mut()
            .append_pair("digest", descriptor.digest.as_str());
        let url = location.to_string();
        tracing::debug!(digest = %descriptor.digest, size = descriptor.size, "uploading blob");
        let _ = check_status(
            self.send(|c| {
                c.put(&url)
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(content.to_vec())
            })?,
            &url,
        )?;
        Ok(())
    }

    fn fetch_blob(&self, descriptor: &Descriptor) -> Result<Vec<u8>, TransferError> {
        let url = self.url(&format!("blobs/{}", descriptor.digest));
        let response = check_status(self.send(|c| c.get(&url))?, &url)?;
        read_body(&self.options, response)
    }

    fn push_manifest(&self, tag: &str, manifest: &[u8]) -> Result<Digest, TransferError> {
        let url = self.url(&format!("manifests/{tag}"));
        let _ = check_status(
            self.send(|c| {
                c.put(&url)
                    .header(CONTENT_TYPE, MANIFEST_MEDIA_TYPE)
                    .body(manifest.to_vec())
            })?,
            &url,
        )?;
        Ok(Digest::of(manifest))
    }

    fn fetch_manifest(&self, tag: &str) -> Result<Vec<u8>, TransferError> {
        let url = self.url(&format!("manifests/{tag}"));
        let response = check_status(
            self.send(|c| c.get(&url).header(ACCEPT, MANIFEST_MEDIA_TYPE))?,
            &url,
        )?;
        read_body(&self.options, response)
    }
}

/// Runs one blocking HTTP step on a worker thread and waits for it, giving
/// up as soon as the transfer is cancelled or its deadline passes.
///
/// An abandoned worker finishes on its own once the request timeout fires.
/// A transport error seen after cancellation is reported as the
/// cancellation.
fn abortable<T: Send + 'static>(
    options: &TransferOptions,
    step: impl FnOnce() -> Result<T, reqwest::Error> + Send + 'static,
) -> Result<T, TransferError> {
    options.check()?;
    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || {
        let _ = tx.send(step());
    });
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => {
                options.check()?;
                return Err(err.into());
            }
            Err(RecvTimeoutError::Timeout) => options.check()?,
            Err(RecvTimeoutError::Disconnected) => {
                let panic = worker.join().err().unwrap_or_else(|| {
                    Box::new("transfer worker exited without a result") as Box<dyn Any + Send>
                });
                std::panic::resume_unwind(panic);
            }
        }
    }
}

fn read_body(options: &TransferOptions, response: Response) -> Result<Vec<u8>, TransferError> {
    abortable(options, move || response.bytes().map(|body| body.to_vec()))
}

/// Maps a response status onto the transfer error taxonomy.
fn check_status(response: Response, url: &str) -> Result<Response, TransferError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(TransferError::Auth {
            message: format!("{status} from {url}"),
        }),
        StatusCode::NOT_FOUND => Err(TransferError::NotFound {
            what: url.to_string(),
        }),
        _ => Err(TransferError::Registry {
            status: status.as_u16(),
            message: format!("unexpected response from {url}"),
        }),
    }
}
