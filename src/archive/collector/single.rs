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

use super::{Collector, ResourceTable, ResourceWriter, INDEX_NAME};
use crate::archive::data_uri;
use crate::archive::resource::Resource;
use crate::client::Client;
use bytes::Bytes;
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Duration;

/// Produces one self contained html file.
///
/// `index.html` streams to the caller's writer; every other resource is
/// buffered and re-emitted as an inline `data:` uri through
/// [`Resource::contents`], which the css and html rewriters substitute for
/// the local name. Inlining makes pages heavy, hence the longer deadline.
pub struct SingleFileCollector {
    output: Mutex<Option<Box<dyn Write + Send>>>,
    table: ResourceTable,
    client: Client,
}

impl SingleFileCollector {
    pub fn new(output: Box<dyn Write + Send>, client: Client) -> Self {
        Self {
            output: Mutex::new(Some(output)),
            table: ResourceTable::new(),
            client,
        }
    }
}

impl Collector for SingleFileCollector {
    fn table(&self) -> &ResourceTable {
        &self.table
    }

    fn client(&self) -> &Client {
        &self.client
    }

    fn deadline(&self) -> Duration {
        Duration::from_secs(50)
    }

    fn create(&self, resource: &Resource) -> io::Result<ResourceWriter> {
        if resource.name == INDEX_NAME {
            let output = self
                .output
                .lock()
                .expect("single file output poisoned")
                .take()
                .ok_or_else(|| io::Error::other("index.html written twice"))?;
            return Ok(ResourceWriter::Output(output));
        }
        Ok(ResourceWriter::Buffer(Vec::new()))
    }

    fn post_write(&self, resource: &mut Resource, writer: ResourceWriter) -> io::Result<()> {
        match writer {
            ResourceWriter::Buffer(body) => {
                let uri = data_uri::encode(resource.content_type.essence_str(), &body);
                resource.contents = Some(Bytes::from(uri));
            }
            ResourceWriter::Output(mut output) => output.flush()?,
            ResourceWriter::File(_) => {
                return Err(io::Error::other("single file collector never opens files"));
            }
        }
        Ok(())
    }
}
