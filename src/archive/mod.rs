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

//! The archiver: walks a document, fetches every subresource it references
//! and rewrites the references to collector-assigned local names.

pub mod collector;
pub mod css;
pub mod data_uri;
pub mod fetch;
pub mod flags;
pub mod html;
pub mod picture;
pub mod resource;
pub mod singleflight;
pub mod srcset;

use crate::client::{RequestContext, RequestKind};
use crate::dom;
use crate::logging::ErrorSink;
use bytes::Bytes;
use collector::{Collector, INDEX_NAME};
use fetch::{FetchError, Fetcher, DEFAULT_CONCURRENCY};
use flags::ArchiveFlags;
use futures::future::BoxFuture;
use futures::FutureExt;
use resource::Resource;
use scraper::Html;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// One archival run over one document.
pub struct Archiver {
    collector: Arc<dyn Collector>,
    flags: ArchiveFlags,
    fetcher: Fetcher,
    referer: Option<Url>,
    errors: ErrorSink,
}

impl Archiver {
    pub fn new(collector: Arc<dyn Collector>) -> Self {
        Self::with_cancel(collector, CancellationToken::new())
    }

    pub fn with_cancel(collector: Arc<dyn Collector>, cancel: CancellationToken) -> Self {
        Self {
            collector,
            flags: ArchiveFlags::default(),
            fetcher: Fetcher::new(DEFAULT_CONCURRENCY, cancel),
            referer: None,
            errors: ErrorSink::new(),
        }
    }

    pub fn with_flags(mut self, flags: ArchiveFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        let cancel = self.fetcher.cancel_token().clone();
        self.fetcher = Fetcher::new(concurrency, cancel);
        self
    }

    pub fn with_referer(mut self, referer: Option<Url>) -> Self {
        self.referer = referer;
        self
    }

    pub fn with_error_sink(mut self, errors: ErrorSink) -> Self {
        self.errors = errors;
        self
    }

    pub fn collector(&self) -> &dyn Collector {
        self.collector.as_ref()
    }

    pub fn flags(&self) -> ArchiveFlags {
        self.flags
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn errors(&self) -> &ErrorSink {
        &self.errors
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        self.fetcher.cancel_token()
    }

    /// The request context for subresource fetches of this run.
    pub fn request_context(&self, kind: RequestKind) -> RequestContext {
        RequestContext::new(kind).with_referer(self.referer.clone())
    }

    /// Fetches and saves one referenced url, recursing into stylesheets.
    ///
    /// Boxed because stylesheet bodies re-enter this for their own
    /// `url(...)` references.
    pub fn process_url<'a>(
        &'a self,
        ctx: &'a RequestContext,
        url: &'a Url,
    ) -> BoxFuture<'a, Result<Resource, FetchError>> {
        async move {
            self.fetcher
                .process_url_with(self.collector(), ctx, url, |body, resource| async move {
                    if resource.content_type.essence_str() == "text/css" {
                        let text =
                            crate::format::decode_text(&body, Some(&resource.content_type));
                        let rewritten =
                            css::process(self, &text, &resource.url, &resource.name).await;
                        Ok(Bytes::from(rewritten))
                    } else {
                        Ok(body)
                    }
                })
                .await
        }
        .boxed()
    }

    /// Archives a parsed document: processes the dom, fans out the resource
    /// fetches, writes `index.html` and leaves the collector holding every
    /// saved resource.
    pub async fn archive(&self, dom: &mut Html, url: &Url) -> Result<(), FetchError> {
        html::process(self, dom, url).await?;

        let rendered = dom::render_document(dom);
        let mut index = Resource::new(url);
        index.status = 200;
        index.name = INDEX_NAME.to_string();
        index.content_type = mime::TEXT_HTML;
        self.fetcher
            .save_resource(self.collector(), Bytes::from(rendered), index)
            .await?;
        self.collector().finish()?;
        Ok(())
    }
}

/// A collector-assigned name relative to the archive entry referencing it.
/// Shared directory prefixes are stripped; the flat layout of an archive
/// makes this usually the name itself.
pub fn relative_name(parent: &str, name: &str) -> String {
    let parent_dirs: Vec<&str> = {
        let mut parts: Vec<&str> = parent.split('/').collect();
        parts.pop();
        parts
    };
    let mut name_parts: Vec<&str> = name.split('/').collect();
    let file = name_parts.pop().unwrap_or_default();

    let common = parent_dirs
        .iter()
        .zip(name_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out: Vec<&str> = Vec::new();
    for _ in common..parent_dirs.len() {
        out.push("..");
    }
    out.extend(&name_parts[common..]);
    out.push(file);
    out.join("/")
}
