// Copyright 2025 The caddis authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The http side of the engine.
//!
//! A thin wrapper around [`reqwest`] that adds what every caller here needs:
//! typed request kinds, layered header merging (client defaults, site
//! overrides, per request headers) and referer injection from the archive
//! context. Redirects and cookies are handled by reqwest itself.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::time::Duration;
use strum::{Display, EnumString};
use thiserror::Error;
use url::Url;

/// Default per-request deadline; collectors may override it.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:124.0) Gecko/20100101 Firefox/124.0";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("invalid header value for {0}")]
    InvalidHeader(String),
    #[error("unsupported url scheme {0:?}")]
    UnsupportedScheme(String),
}

/// What a request is made for. Transports and test doubles can key
/// behaviour off this.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum RequestKind {
    Page,
    Image,
    Resource,
    ContentScript,
}

/// Per-request state threaded through every fetch.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub kind: RequestKind,
    pub referer: Option<Url>,
    pub headers: HeaderMap,
    pub deadline: Duration,
}

impl RequestContext {
    pub fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            referer: None,
            headers: HeaderMap::new(),
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn with_referer(mut self, referer: Option<Url>) -> Self {
        self.referer = referer;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, ClientError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ClientError::InvalidHeader(name.to_string()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| ClientError::InvalidHeader(name.to_string()))?;
        self.headers.insert(name, value);
        Ok(self)
    }
}

/// The http client used by the extractor and the archiver.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    /// Headers injected by site configuration, merged over the defaults.
    overrides: HeaderMap,
}

impl Client {
    pub fn new() -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.8"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .redirect(Policy::limited(10))
            .cookie_store(true)
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            overrides: HeaderMap::new(),
        })
    }

    /// Replaces the site-level header overrides for subsequent requests.
    pub fn set_header_overrides(&mut self, headers: HeaderMap) {
        self.overrides = headers;
    }

    pub fn header_overrides(&self) -> &HeaderMap {
        &self.overrides
    }

    /// Issues a GET. Headers are merged in order: client defaults, site
    /// overrides, context headers, referer.
    pub async fn get(&self, ctx: &RequestContext, url: &Url) -> Result<Response, ClientError> {
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(ClientError::UnsupportedScheme(other.to_string())),
        }
        let mut headers = self.overrides.clone();
        headers.extend(ctx.headers.clone());
        if let Some(ref referer) = ctx.referer {
            if let Ok(value) = HeaderValue::from_str(referer.as_str()) {
                headers.insert(REFERER, value);
            }
        }
        let response = self
            .http
            .get(url.clone())
            .timeout(ctx.deadline)
            .headers(headers)
            .send()
            .await?;
        Ok(Response::from_network(response))
    }
}

enum Body {
    Stream(reqwest::Response),
    Full(Option<Bytes>),
}

/// A fetched response, either from the network or synthesised locally
/// (`data:` urls decode into one of these with status 200).
pub struct Response {
    pub status: StatusCode,
    pub final_url: Option<Url>,
    pub headers: HeaderMap,
    body: Body,
}

impl Response {
    fn from_network(response: reqwest::Response) -> Self {
        Self {
            status: response.status(),
            final_url: Some(response.url().clone()),
            headers: response.headers().clone(),
            body: Body::Stream(response),
        }
    }

    /// A local response that never touched the network.
    pub fn synthetic(content_type: &str, body: Bytes) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert(reqwest::header::CONTENT_TYPE, value);
        }
        Self {
            status: StatusCode::OK,
            final_url: None,
            headers,
            body: Body::Full(Some(body)),
        }
    }

    /// The `Content-Type` header up to the first `;`, trimmed.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or("").trim())
            .filter(|value| !value.is_empty())
    }

    /// The next chunk of the body, `None` when exhausted.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, ClientError> {
        match &mut self.body {
            Body::Stream(response) => Ok(response.chunk().await?),
            Body::Full(bytes) => Ok(bytes.take().filter(|b| !b.is_empty())),
        }
    }

    /// Reads the whole remaining body.
    pub async fn bytes(self) -> Result<Bytes, ClientError> {
        match self.body {
            Body::Stream(response) => Ok(response.bytes().await?),
            Body::Full(bytes) => Ok(bytes.unwrap_or_default()),
        }
    }
}
