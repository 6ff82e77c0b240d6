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

//! The pluggable sink of an archival run.
//!
//! A [`Collector`] owns the resource table for one run and hands out
//! writers for the bodies. The capability methods (`convert`, `post_write`)
//! have identity defaults so a sink only implements what it cares about.
//! The archiver serialises everything between `create` and `post_write`
//! behind its global write lock, so sinks can assume a single writer.

mod fs;
mod single;
mod zip;

pub use fs::FsCollector;
pub use single::SingleFileCollector;
pub use zip::ZipCollector;

use crate::archive::resource::{canonical_url, name_stem, Resource};
use crate::client::{Client, ClientError, RequestContext, Response, DEFAULT_DEADLINE};
use async_trait::async_trait;
use bytes::Bytes;
use indexmap::IndexMap;
use std::io::{self, Write};
use std::sync::RwLock;
use std::time::Duration;
use url::Url;

/// The entry point of every archive.
pub const INDEX_NAME: &str = "index.html";

/// Url keyed resource records, insertion ordered.
#[derive(Debug, Default)]
pub struct ResourceTable {
    inner: RwLock<IndexMap<String, Resource>>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &Url) -> Option<Resource> {
        let key = canonical_url(url);
        self.inner
            .read()
            .expect("resource table poisoned")
            .get(key.as_str())
            .cloned()
    }

    pub fn set(&self, resource: Resource) {
        let key = resource.url.as_str().to_owned();
        self.inner
            .write()
            .expect("resource table poisoned")
            .insert(key, resource);
    }

    pub fn all(&self) -> Vec<Resource> {
        self.inner
            .read()
            .expect("resource table poisoned")
            .values()
            .cloned()
            .collect()
    }
}

/// Where one resource body goes. Tagged instead of boxed so sinks can take
/// their buffers back in `post_write`.
pub enum ResourceWriter {
    File(std::fs::File),
    Buffer(Vec<u8>),
    Output(Box<dyn Write + Send>),
}

impl Write for ResourceWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ResourceWriter::File(file) => file.write(buf),
            ResourceWriter::Buffer(buffer) => buffer.write(buf),
            ResourceWriter::Output(output) => output.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ResourceWriter::File(file) => file.flush(),
            ResourceWriter::Buffer(_) => Ok(()),
            ResourceWriter::Output(output) => output.flush(),
        }
    }
}

#[async_trait]
pub trait Collector: Send + Sync {
    fn table(&self) -> &ResourceTable;

    fn client(&self) -> &Client;

    /// Per-request deadline for this sink.
    fn deadline(&self) -> Duration {
        DEFAULT_DEADLINE
    }

    fn get(&self, url: &Url) -> Option<Resource> {
        self.table().get(url)
    }

    fn set(&self, resource: Resource) {
        self.table().set(resource);
    }

    /// The stable local name stem for a url.
    fn name(&self, url: &Url) -> String {
        name_stem(url)
    }

    fn resources(&self) -> Vec<Resource> {
        self.table().all()
    }

    /// Fetches on behalf of the archiver, with this sink's deadline.
    async fn fetch(&self, ctx: &RequestContext, url: &Url) -> Result<Response, ClientError> {
        let ctx = ctx.clone().with_deadline(self.deadline());
        self.client().get(&ctx, url).await
    }

    /// Opens a writer for the body of `resource`.
    fn create(&self, resource: &Resource) -> io::Result<ResourceWriter>;

    /// Optional body transform applied before writing.
    fn convert(&self, _resource: &Resource, body: Bytes) -> io::Result<Bytes> {
        Ok(body)
    }

    /// Finalises a written body; the writer returned by [`Self::create`]
    /// comes back here.
    fn post_write(&self, _resource: &mut Resource, _writer: ResourceWriter) -> io::Result<()> {
        Ok(())
    }

    /// Flushes whatever the sink buffers; call once after the run.
    fn finish(&self) -> io::Result<()> {
        Ok(())
    }
}
