//! HTTP client for the registry server.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::cover::store::{ServiceMap, ServiceUnderTest};
use crate::cover::{
    ProfileParam, COVER_INIT_SYSTEM_API, COVER_PROFILE_API, COVER_PROFILE_CLEAR_API,
    COVER_REGISTER_SERVICE_API, COVER_SERVICES_LIST_API, COVER_SERVICES_REMOVE_API,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Error talking to the registry.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("use 'service' flag and 'address' flag at the same time may cause ambiguity, please use them separately")]
    AmbiguousFilter,

    #[error("invalid URL `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid service name")]
    InvalidName,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Non-success response; carries the body verbatim.
    #[error("{body}")]
    Status { status: StatusCode, body: String },

    #[error("failed to decode registry response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Operations against the registry.
pub trait Action {
    /// Profile of the selected instances.
    fn profile(&self, param: &ProfileParam) -> Result<Vec<u8>, ClientError>;

    /// Reset counters of the selected instances.
    fn clear(&self, param: &ProfileParam) -> Result<Vec<u8>, ClientError>;

    /// Deregister the selected instances.
    fn remove(&self, param: &ProfileParam) -> Result<Vec<u8>, ClientError>;

    /// Start a new collection round.
    fn init_system(&self) -> Result<Vec<u8>, ClientError>;

    /// Every registered service.
    fn list_services(&self) -> Result<ServiceMap, ClientError>;

    /// Register an instance. With `ip_revise`, the registry replaces the
    /// address host by the IP the request came from.
    fn register_service(&self, service: &ServiceUnderTest, ip_revise: bool) -> Result<Vec<u8>, ClientError>;
}

/// Blocking [`Action`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpClient {
    host: String,
    client: Client,
}

fn parse_url(raw: &str) -> Result<Url, ClientError> {
    Url::parse(raw).map_err(|source| ClientError::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}

/// Failures worth one more attempt: the request never got a complete answer.
fn is_network_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request() || err.is_body()
}

impl HttpClient {
    /// Client for the registry at `host`.
    pub fn new(host: &str) -> Result<Self, ClientError> {
        parse_url(host)?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(HttpClient {
            host: host.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn endpoint(&self, api: &str) -> String {
        format!("{}{}", self.host, api)
    }

    fn attempt(request: RequestBuilder) -> Result<(StatusCode, Vec<u8>), reqwest::Error> {
        let response = request.send()?;
        let status = response.status();
        let body = response.bytes()?;
        Ok((status, body.to_vec()))
    }

    /// Send the request, retrying once on a network-level failure.
    fn send(&self, build: impl Fn() -> RequestBuilder, retry: bool) -> Result<Vec<u8>, ClientError> {
        let (status, body) = match Self::attempt(build()) {
            Err(err) if retry && is_network_error(&err) => {
                warn!("request failed, retrying once: {}", err);
                Self::attempt(build())?
            }
            result => result?,
        };
        debug!("registry responded {}", status);

        if !status.is_success() {
            return Err(ClientError::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body)
    }

    fn post_param(&self, api: &str, param: &ProfileParam) -> Result<Vec<u8>, ClientError> {
        if param.is_ambiguous() {
            return Err(ClientError::AmbiguousFilter);
        }
        let url = self.endpoint(api);
        let body = serde_json::to_vec(param)?;
        self.send(
            || {
                self.client
                    .post(&url)
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body.clone())
            },
            true,
        )
    }
}

impl Action for HttpClient {
    fn profile(&self, param: &ProfileParam) -> Result<Vec<u8>, ClientError> {
        self.post_param(COVER_PROFILE_API, param)
    }

    fn clear(&self, param: &ProfileParam) -> Result<Vec<u8>, ClientError> {
        self.post_param(COVER_PROFILE_CLEAR_API, param)
    }

    fn remove(&self, param: &ProfileParam) -> Result<Vec<u8>, ClientError> {
        self.post_param(COVER_SERVICES_REMOVE_API, param)
    }

    fn init_system(&self) -> Result<Vec<u8>, ClientError> {
        let url = self.endpoint(COVER_INIT_SYSTEM_API);
        self.send(|| self.client.post(&url), false)
    }

    fn list_services(&self) -> Result<ServiceMap, ClientError> {
        let url = self.endpoint(COVER_SERVICES_LIST_API);
        let body = self.send(|| self.client.get(&url), true)?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn register_service(&self, service: &ServiceUnderTest, ip_revise: bool) -> Result<Vec<u8>, ClientError> {
        parse_url(&service.address)?;
        if service.name.trim().is_empty() {
            return Err(ClientError::InvalidName);
        }
        let url = Url::parse_with_params(
            &self.endpoint(COVER_REGISTER_SERVICE_API),
            &[
                ("name", service.name.as_str()),
                ("address", service.address.as_str()),
                ("ip_revise", if ip_revise { "true" } else { "false" }),
            ],
        )
        .map_err(|source| ClientError::InvalidUrl {
            url: self.host.clone(),
            source,
        })?;
        self.send(|| self.client.post(url.clone()), false)
    }
}
