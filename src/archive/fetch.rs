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

//! Fetching for the archiver.
//!
//! Three disciplines stack up here: a counting semaphore caps in-flight
//! requests, a per-url single-flight group coalesces concurrent fetches of
//! the same asset, and a global write mutex serialises everything between
//! `create` and `post_write` so collectors see one writer at a time. The
//! single-flight entry is taken first and the semaphore inside it, which
//! keeps a herd of callers for one url from draining the permit pool.

use super::collector::Collector;
use super::data_uri::{self, DataUriError};
use super::resource::{canonical_url, Resource};
use super::singleflight::SingleFlight;
use crate::client::{ClientError, RequestContext, Response};
use crate::format;
use bytes::{Bytes, BytesMut};
use std::io::{self, Write};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Default cap on concurrent network requests.
pub const DEFAULT_CONCURRENCY: usize = 6;

/// How much body a metadata probe reads at most.
const PROBE_LIMIT: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    DataUri(#[from] DataUriError),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("fetch canceled")]
    Canceled,
    #[error(transparent)]
    Shared(Arc<FetchError>),
}

pub struct Fetcher {
    semaphore: Semaphore,
    flights: SingleFlight<Result<Resource, Arc<FetchError>>>,
    write_lock: Mutex<()>,
    cancel: CancellationToken,
}

impl Fetcher {
    pub fn new(concurrency: usize, cancel: CancellationToken) -> Self {
        Self {
            semaphore: Semaphore::new(concurrency.max(1)),
            flights: SingleFlight::new(),
            write_lock: Mutex::new(()),
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    async fn open(
        &self,
        collector: &dyn Collector,
        ctx: &RequestContext,
        url: &Url,
    ) -> Result<Response, FetchError> {
        if url.scheme() == "data" {
            return Ok(data_uri::decode(url.as_str())?);
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(FetchError::Canceled),
            response = collector.fetch(ctx, url) => Ok(response?),
        }
    }

    /// Fetches a url completely and builds its resource record.
    ///
    /// The declared content type wins unless it is missing or useless, in
    /// which case the body prefix is sniffed; image bodies additionally get
    /// their dimensions probed.
    pub async fn fetch(
        &self,
        collector: &dyn Collector,
        ctx: &RequestContext,
        url: &Url,
    ) -> Result<(Bytes, Resource), FetchError> {
        if self.cancel.is_cancelled() {
            return Err(FetchError::Canceled);
        }
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::Canceled)?;

        let response = self.open(collector, ctx, url).await?;
        let status = response.status.as_u16();
        let declared = response.content_type().map(str::to_owned);
        if !response.status.is_success() {
            let mut resource = Resource::new(url);
            resource.status = status;
            collector.set(resource);
            return Err(FetchError::Status(status));
        }
        let body = response.bytes().await.map_err(ClientError::from)?;
        let resource = build_resource(collector, url, status, declared.as_deref(), &body);
        Ok((body, resource))
    }

    /// Probes status, content type and image dimensions without keeping the
    /// body. Results land in the resource table so repeated probes of one
    /// url cost one request.
    pub async fn fetch_info(
        &self,
        collector: &dyn Collector,
        ctx: &RequestContext,
        url: &Url,
    ) -> Result<Resource, FetchError> {
        if let Some(existing) = collector.get(url) {
            if existing.saved || existing.status != 0 {
                return Ok(existing);
            }
        }
        if self.cancel.is_cancelled() {
            return Err(FetchError::Canceled);
        }
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::Canceled)?;

        let mut response = self.open(collector, ctx, url).await?;
        let status = response.status.as_u16();
        if !response.status.is_success() {
            let mut resource = Resource::new(url);
            resource.status = status;
            collector.set(resource.clone());
            return Err(FetchError::Status(status));
        }
        let declared = response.content_type().map(str::to_owned);

        let mut prefix = BytesMut::new();
        while prefix.len() < PROBE_LIMIT {
            match response.chunk().await {
                Ok(Some(chunk)) => prefix.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(err) => return Err(err.into()),
            }
            if imagesize::blob_size(&prefix).is_ok() {
                break;
            }
        }

        let resource = build_resource(collector, url, status, declared.as_deref(), &prefix);
        collector.set(resource.clone());
        Ok(resource)
    }

    /// Hands a fetched body to the collector. Exactly one writer is active
    /// at any time; a resource that is already saved is returned untouched.
    pub async fn save_resource(
        &self,
        collector: &dyn Collector,
        body: Bytes,
        mut resource: Resource,
    ) -> Result<Resource, FetchError> {
        let _write = self.write_lock.lock().await;
        if let Some(existing) = collector.get(&resource.url) {
            if existing.saved {
                return Ok(existing);
            }
        }
        let body = collector.convert(&resource, body)?;
        resource.size = body.len() as u64;
        let mut writer = collector.create(&resource)?;
        writer.write_all(&body)?;
        collector.post_write(&mut resource, writer)?;
        resource.saved = true;
        collector.set(resource.clone());
        Ok(resource)
    }

    /// Fetch-and-save with per-url coalescing; the unit of work the html
    /// and css rewriters schedule for every reference they find.
    pub async fn process_url(
        &self,
        collector: &dyn Collector,
        ctx: &RequestContext,
        url: &Url,
    ) -> Result<Resource, FetchError> {
        self.process_url_with(collector, ctx, url, |body, _| async move { Ok(body) })
            .await
    }

    /// Like [`Self::process_url`], with a body transform between fetch and
    /// save. Stylesheets run their own rewrite pass through this hook, so
    /// the transform happens inside the flight and is coalesced with it.
    pub async fn process_url_with<F, Fut>(
        &self,
        collector: &dyn Collector,
        ctx: &RequestContext,
        url: &Url,
        transform: F,
    ) -> Result<Resource, FetchError>
    where
        F: FnOnce(Bytes, Resource) -> Fut,
        Fut: std::future::Future<Output = Result<Bytes, FetchError>>,
    {
        if let Some(existing) = collector.get(url) {
            if existing.saved {
                return Ok(existing);
            }
        }
        let key = canonical_url(url).to_string();
        let outcome = self
            .flights
            .run(&key, || async move {
                let (body, resource) = self
                    .fetch(collector, ctx, url)
                    .await
                    .map_err(Arc::new)?;
                let body = transform(body, resource.clone()).await.map_err(Arc::new)?;
                self.save_resource(collector, body, resource)
                    .await
                    .map_err(Arc::new)
            })
            .await;
        outcome.map_err(FetchError::Shared)
    }
}

fn build_resource(
    collector: &dyn Collector,
    url: &Url,
    status: u16,
    declared: Option<&str>,
    body: &[u8],
) -> Resource {
    let mut resource = Resource::new(url);
    resource.status = status;
    resource.content_type = if format::needs_sniffing(declared) {
        format::sniff(body)
    } else {
        declared
            .and_then(format::parse_content_type)
            .unwrap_or(mime::APPLICATION_OCTET_STREAM)
    };
    resource.name = format!(
        "{}{}",
        collector.name(url),
        format::extension_for(&resource.content_type)
    );
    resource.size = body.len() as u64;
    if resource.is_image() && !resource.is_svg() {
        if let Ok(size) = imagesize::blob_size(body) {
            resource.width = size.width as u32;
            resource.height = size.height as u32;
        }
    }
    resource
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::archive::collector::FsCollector;
    use crate::client::{Client, RequestKind};
    use crate::test_support::png_bytes;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> Fetcher {
        Fetcher::new(DEFAULT_CONCURRENCY, CancellationToken::new())
    }

    #[tokio::test]
    async fn fetch_probes_image_dimensions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(png_bytes(100, 50)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let collector = FsCollector::new(dir.path(), Client::new().unwrap());
        let ctx = RequestContext::new(RequestKind::Image);
        let url: Url = format!("{}/a.png", server.uri()).parse().unwrap();

        let (_, resource) = fetcher().fetch(&collector, &ctx, &url).await.unwrap();
        assert_eq!((resource.width, resource.height), (100, 50));
        assert_eq!(resource.content_type.essence_str(), "image/png");
        assert!(resource.name.ends_with(".png"));
    }

    #[tokio::test]
    async fn sniffs_when_header_is_useless() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mystery"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "binary/octet-stream")
                    .set_body_bytes(png_bytes(1, 1)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let collector = FsCollector::new(dir.path(), Client::new().unwrap());
        let ctx = RequestContext::new(RequestKind::Resource);
        let url: Url = format!("{}/mystery", server.uri()).parse().unwrap();

        let (_, resource) = fetcher().fetch(&collector, &ctx, &url).await.unwrap();
        assert_eq!(resource.content_type.essence_str(), "image/png");
    }

    #[tokio::test]
    async fn data_uris_skip_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let collector = FsCollector::new(dir.path(), Client::new().unwrap());
        let ctx = RequestContext::new(RequestKind::Resource);
        let url: Url = "data:text/plain;base64,aGk=".parse().unwrap();

        let (body, resource) = fetcher().fetch(&collector, &ctx, &url).await.unwrap();
        assert_eq!(&body[..], b"hi");
        assert_eq!(resource.status, 200);
    }

    #[tokio::test]
    async fn process_url_is_single_flight() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(png_bytes(10, 10))
                    .set_delay(std::time::Duration::from_millis(30)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let collector = Arc::new(FsCollector::new(dir.path(), Client::new().unwrap()));
        let fetcher = Arc::new(fetcher());
        let url: Url = format!("{}/img.jpg", server.uri()).parse().unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let fetcher = fetcher.clone();
            let collector = collector.clone();
            let url = url.clone();
            handles.push(tokio::spawn(async move {
                let ctx = RequestContext::new(RequestKind::Image);
                fetcher.process_url(collector.as_ref(), &ctx, &url).await
            }));
        }
        let mut names = std::collections::HashSet::new();
        for handle in handles {
            let resource = handle.await.unwrap().unwrap();
            assert!(resource.saved);
            names.insert(resource.name);
        }
        assert_eq!(names.len(), 1);
    }

    #[tokio::test]
    async fn save_resource_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let collector = FsCollector::new(dir.path(), Client::new().unwrap());
        let fetcher = fetcher();
        let url: Url = "http://ex.test/x.bin".parse().unwrap();
        let mut resource = Resource::new(&url);
        resource.name = "x.bin".to_string();

        let saved = fetcher
            .save_resource(&collector, Bytes::from_static(b"abc"), resource.clone())
            .await
            .unwrap();
        assert!(saved.saved);
        assert_eq!(saved.size, 3);

        // Second save observes the frozen record instead of rewriting.
        let again = fetcher
            .save_resource(&collector, Bytes::from_static(b"other"), resource)
            .await
            .unwrap();
        assert_eq!(again.size, 3);
    }
}
