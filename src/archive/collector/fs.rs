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

use super::{Collector, ResourceTable, ResourceWriter};
use crate::archive::resource::Resource;
use crate::client::Client;
use std::fs::{DirBuilder, File};
use std::io;
use std::path::PathBuf;

/// Writes every resource as `<root>/<name>`.
pub struct FsCollector {
    root: PathBuf,
    table: ResourceTable,
    client: Client,
}

impl FsCollector {
    pub fn new(root: impl Into<PathBuf>, client: Client) -> Self {
        Self {
            root: root.into(),
            table: ResourceTable::new(),
            client,
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

impl Collector for FsCollector {
    fn table(&self) -> &ResourceTable {
        &self.table
    }

    fn client(&self) -> &Client {
        &self.client
    }

    fn create(&self, resource: &Resource) -> io::Result<ResourceWriter> {
        let path = self.root.join(&resource.name);
        if let Some(parent) = path.parent() {
            let mut builder = DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                builder.mode(0o750);
            }
            builder.create(parent)?;
        }
        Ok(ResourceWriter::File(File::create(path)?))
    }

    fn post_write(&self, _resource: &mut Resource, writer: ResourceWriter) -> io::Result<()> {
        if let ResourceWriter::File(file) = writer {
            file.sync_all()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let collector = FsCollector::new(dir.path().join("pages"), Client::new().unwrap());
        let mut resource = Resource::new(&"http://ex.test/a".parse().unwrap());
        resource.name = "sub/res.bin".to_string();
        let mut writer = collector.create(&resource).unwrap();
        writer.write_all(b"abc").unwrap();
        collector.post_write(&mut resource, writer).unwrap();
        let written = std::fs::read(dir.path().join("pages/sub/res.bin")).unwrap();
        assert_eq!(written, b"abc");
    }
}
