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
use mime::Mime;
use std::collections::HashSet;
use std::io::{self, Seek, Write};
use std::sync::Mutex;
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::CompressionMethod;

/// Formats stored with deflate; everything else is already compressed and
/// goes in as-is.
fn compressible(mime: &Mime) -> bool {
    if mime.type_() == mime::TEXT {
        return true;
    }
    matches!(
        mime.essence_str(),
        "application/javascript"
            | "application/json"
            | "image/svg+xml"
            | "font/ttf"
            | "font/otf"
            | "application/vnd.ms-fontobject"
            | "image/vnd.microsoft.icon"
            | "image/x-icon"
    )
}

enum ZipState<W: Write + Seek + Send> {
    Open(ZipWriter<W>),
    Closed(W),
    Taken,
}

/// Streams the archive into one zip file.
///
/// Bodies are buffered per resource and appended in `post_write`; the
/// archiver's write lock keeps the append order stable.
pub struct ZipCollector<W: Write + Seek + Send> {
    state: Mutex<ZipState<W>>,
    dirs: Mutex<HashSet<String>>,
    table: ResourceTable,
    client: Client,
}

impl<W: Write + Seek + Send> ZipCollector<W> {
    pub fn new(output: W, client: Client) -> Self {
        Self {
            state: Mutex::new(ZipState::Open(ZipWriter::new(output))),
            dirs: Mutex::new(HashSet::new()),
            table: ResourceTable::new(),
            client,
        }
    }

    /// Closes the zip if still open and returns the underlying output.
    pub fn into_output(self) -> io::Result<W> {
        let mut state = self.state.lock().expect("zip writer poisoned");
        match std::mem::replace(&mut *state, ZipState::Taken) {
            ZipState::Open(writer) => writer.finish().map_err(io::Error::other),
            ZipState::Closed(output) => Ok(output),
            ZipState::Taken => Err(io::Error::other("zip output already taken")),
        }
    }
}

impl<W: Write + Seek + Send> Collector for ZipCollector<W> {
    fn table(&self) -> &ResourceTable {
        &self.table
    }

    fn client(&self) -> &Client {
        &self.client
    }

    fn create(&self, _resource: &Resource) -> io::Result<ResourceWriter> {
        Ok(ResourceWriter::Buffer(Vec::new()))
    }

    fn post_write(&self, resource: &mut Resource, writer: ResourceWriter) -> io::Result<()> {
        let ResourceWriter::Buffer(body) = writer else {
            return Err(io::Error::other("zip collector expects buffered bodies"));
        };
        let mut guard = self.state.lock().expect("zip writer poisoned");
        let zip = match &mut *guard {
            ZipState::Open(writer) => writer,
            _ => return Err(io::Error::other("zip already finished")),
        };

        // Each directory shows up exactly once, at first use.
        let mut dirs = self.dirs.lock().expect("zip dirs poisoned");
        let parts: Vec<&str> = resource.name.split('/').collect();
        let mut prefix = String::new();
        for part in &parts[..parts.len() - 1] {
            prefix.push_str(part);
            prefix.push('/');
            if dirs.insert(prefix.clone()) {
                zip.add_directory(prefix.trim_end_matches('/'), SimpleFileOptions::default())
                    .map_err(io::Error::other)?;
            }
        }

        let method = if compressible(&resource.content_type) {
            CompressionMethod::Deflated
        } else {
            CompressionMethod::Stored
        };
        zip.start_file(
            resource.name.as_str(),
            SimpleFileOptions::default().compression_method(method),
        )
        .map_err(io::Error::other)?;
        zip.write_all(&body)?;
        Ok(())
    }

    fn finish(&self) -> io::Result<()> {
        let mut guard = self.state.lock().expect("zip writer poisoned");
        if let ZipState::Open(_) = &*guard {
            let ZipState::Open(writer) = std::mem::replace(&mut *guard, ZipState::Taken) else {
                unreachable!()
            };
            let output = writer.finish().map_err(io::Error::other)?;
            *guard = ZipState::Closed(output);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn write_one(collector: &ZipCollector<Cursor<Vec<u8>>>, name: &str, mime: &str, body: &[u8]) {
        let mut resource = Resource::new(&format!("http://ex.test/{name}").parse().unwrap());
        resource.name = name.to_string();
        resource.content_type = mime.parse().unwrap();
        let mut writer = collector.create(&resource).unwrap();
        writer.write_all(body).unwrap();
        collector.post_write(&mut resource, writer).unwrap();
    }

    #[test]
    fn archive_readable_and_dirs_unique() {
        let collector = ZipCollector::new(Cursor::new(Vec::new()), Client::new().unwrap());
        write_one(&collector, "index.html", "text/html", b"<html></html>");
        write_one(&collector, "img/a.png", "image/png", b"\x89PNG");
        write_one(&collector, "img/b.png", "image/png", b"\x89PNG");
        let output = collector.into_output().unwrap();

        let mut archive = zip::ZipArchive::new(output).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["index.html", "img/", "img/a.png", "img/b.png"]);
    }
}
