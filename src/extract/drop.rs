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

//! One page of a (possibly multi page) article.

use indexmap::IndexMap;
use mime::Mime;
use serde_json::Value;
use std::collections::HashMap;
use strum::{Display, EnumString};
use time::OffsetDateTime;
use url::Url;

/// What kind of document a page turned out to be.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DocumentType {
    #[default]
    Article,
    Photo,
    Video,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TextDirection {
    #[default]
    Ltr,
    Rtl,
}

/// Languages written right to left, two-letter codes.
const RTL_LANGUAGES: [&str; 9] = ["ar", "he", "fa", "ur", "yi", "ps", "sd", "ku", "dv"];

pub fn direction_for_language(lang: &str) -> TextDirection {
    if RTL_LANGUAGES.contains(&lang) {
        TextDirection::Rtl
    } else {
        TextDirection::Ltr
    }
}

/// Namespaced multi-valued metadata (`graph.title`, `twitter.card`, ...).
#[derive(Debug, Clone, Default)]
pub struct Meta(IndexMap<String, Vec<String>>);

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, namespace: &str, key: &str, value: impl Into<String>) {
        let value = value.into();
        if value.trim().is_empty() {
            return;
        }
        self.0
            .entry(format!("{namespace}.{key}"))
            .or_default()
            .push(value);
    }

    /// First value for `namespace.key`.
    pub fn first(&self, namespace: &str, key: &str) -> Option<&str> {
        self.0
            .get(&format!("{namespace}.{key}"))
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn all(&self, namespace: &str, key: &str) -> &[String] {
        self.0
            .get(&format!("{namespace}.{key}"))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// First hit over a fallback chain of `namespace.key` entries.
    pub fn lookup(&self, keys: &[(&str, &str)]) -> Option<&str> {
        keys.iter()
            .find_map(|(namespace, key)| self.first(namespace, key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One page participating in the current extraction.
#[derive(Debug, Clone)]
pub struct Drop {
    pub url: Url,
    /// Decoded utf-8 body; after the dom step this is the rendered article
    /// body of the page.
    pub body: String,
    pub content_type: Option<Mime>,
    pub status: u16,

    pub title: String,
    pub authors: Vec<String>,
    pub description: String,
    pub site: String,
    pub lang: String,
    pub text_direction: TextDirection,
    pub date: Option<OffsetDateTime>,
    pub document_type: DocumentType,

    pub meta: Meta,
    /// Free-form extras, e.g. parsed `json-ld` payloads.
    pub properties: HashMap<String, Value>,
}

impl Drop {
    pub fn new(url: Url) -> Self {
        let mut url = url;
        url.set_fragment(None);
        Self {
            url,
            body: String::new(),
            content_type: None,
            status: 0,
            title: String::new(),
            authors: Vec::new(),
            description: String::new(),
            site: String::new(),
            lang: String::new(),
            text_direction: TextDirection::default(),
            date: None,
            document_type: DocumentType::default(),
            meta: Meta::new(),
            properties: HashMap::new(),
        }
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_ref()
            .map(crate::format::is_html)
            .unwrap_or(false)
    }

    /// True for pages that are a bare media file rather than a document.
    pub fn is_media(&self) -> bool {
        self.content_type
            .as_ref()
            .map(|mime| {
                matches!(
                    mime.type_().as_str(),
                    "image" | "video" | "audio"
                )
            })
            .unwrap_or(false)
    }

    pub fn add_author(&mut self, author: impl Into<String>) {
        let author = author.into();
        let author = author.trim();
        if author.is_empty() {
            return;
        }
        if !self
            .authors
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(author))
        {
            self.authors.push(author.to_string());
        }
    }
}
