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

use bytes::Bytes;
use mime::Mime;
use url::Url;
use uuid::Uuid;

/// Strips the fragment; the canonical form every table lookup uses.
pub fn canonical_url(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

/// The stable local name stem of a url: UUIDv5 over the url namespace
/// applied to the canonical form. Same url, same name, every run.
pub fn name_stem(url: &Url) -> String {
    let canonical = canonical_url(url);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, canonical.as_str().as_bytes()).to_string()
}

/// The record for one remote asset of an archive.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Canonical (fragment stripped) source url.
    pub url: Url,
    /// Http status of the fetch, 0 before any attempt.
    pub status: u16,
    /// Once true, name, type and size are frozen and the bytes are with the
    /// collector.
    pub saved: bool,
    /// The local file name inside the archive.
    pub name: String,
    pub content_type: Mime,
    /// Pixel dimensions, 0 when unknown or not an image.
    pub width: u32,
    pub height: u32,
    /// Body size in bytes.
    pub size: u64,
    /// Only the single-file collector fills this: the complete inlined
    /// `data:` uri of the body.
    pub contents: Option<Bytes>,
}

impl Resource {
    pub fn new(url: &Url) -> Self {
        Self {
            url: canonical_url(url),
            status: 0,
            saved: false,
            name: String::new(),
            content_type: mime::APPLICATION_OCTET_STREAM,
            width: 0,
            height: 0,
            size: 0,
            contents: None,
        }
    }

    pub fn is_image(&self) -> bool {
        self.content_type.type_() == mime::IMAGE
    }

    pub fn is_svg(&self) -> bool {
        self.content_type.essence_str() == "image/svg+xml"
    }

    /// Pixel area, 0 while dimensions are unknown.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn name_is_deterministic_and_fragment_free() {
        let a: Url = "http://ex.test/a.png#frag".parse().unwrap();
        let b: Url = "http://ex.test/a.png".parse().unwrap();
        assert_eq!(name_stem(&a), name_stem(&b));
        assert_eq!(name_stem(&a), name_stem(&a));
    }

    #[test]
    fn name_is_standard_uuid_format() {
        let url: Url = "http://ex.test/a.png".parse().unwrap();
        let name = name_stem(&url);
        let blocks: Vec<usize> = name.split('-').map(str::len).collect();
        assert_eq!(blocks, vec![8, 4, 4, 4, 12]);
    }
}
