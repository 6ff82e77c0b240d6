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

//! Metadata extraction.
//!
//! The dom step collects everything a page declares about itself (html
//! head, Dublin Core, OpenGraph, Twitter cards, fediverse attribution,
//! header links, microdata, json-ld) into the drop's namespaced meta table;
//! the finish step folds the table into the drop fields through fallback
//! chains.

pub mod fields;
pub mod json_ld;
pub mod microdata;

use super::drop::Meta;
use super::process::{ProcessMessage, Processor, Step};
use crate::dom;
use crate::static_selectors;
use async_trait::async_trait;
use scraper::Html;
use url::Url;

static_selectors! {
    [
        TITLE = "head title"
        META = "meta[content]"
        LINKS = "head link[rel][href]"
    ]
}

/// `<meta name=...>` entries worth keeping in the `html` namespace.
const HTML_META_NAMES: [&str; 5] = ["description", "author", "date", "keywords", "copyright"];

/// Link relations that are resource plumbing rather than metadata.
const EXCLUDED_RELS: [&str; 7] = [
    "icon",
    "shortcut icon",
    "apple-touch-icon",
    "stylesheet",
    "preload",
    "preconnect",
    "dns-prefetch",
];

pub struct MetaProcessor;

#[async_trait(?Send)]
impl Processor for MetaProcessor {
    fn name(&self) -> &'static str {
        "meta"
    }

    async fn process(&mut self, m: &mut ProcessMessage<'_>) {
        match m.step() {
            Step::Dom => {
                let Some(url) = m.drop().map(|drop| drop.url.clone()) else {
                    return;
                };
                let (meta, ld_blocks) = match m.dom() {
                    Some(parsed) => {
                        let mut meta = Meta::new();
                        collect(parsed, &url, &mut meta);
                        microdata::extract(parsed, &url, &mut meta);
                        (meta, json_ld::extract(parsed))
                    }
                    None => return,
                };
                if let Some(drop) = m.drop_mut() {
                    drop.meta = meta;
                    if !ld_blocks.is_empty() {
                        drop.properties
                            .insert("json-ld".to_string(), serde_json::Value::Array(ld_blocks));
                    }
                }
            }
            Step::Finish => {
                if let Some(drop) = m.drop_mut() {
                    fields::derive(drop);
                }
            }
            _ => {}
        }
    }
}

fn collect(parsed: &Html, url: &Url, meta: &mut Meta) {
    let root = parsed.root_element();
    if let Some(lang) = root.attr("lang") {
        meta.add("html", "lang", lang);
    }
    if let Some(dir) = root.attr("dir") {
        meta.add("html", "dir", dir);
    }
    if let Some(title) = parsed.select(&TITLE).next() {
        meta.add("html", "title", dom::text_content(&title).trim());
    }

    for element in parsed.select(&META) {
        let Some(content) = element.attr("content") else { continue };
        let name = element
            .attr("property")
            .or_else(|| element.attr("name"))
            .unwrap_or_default()
            .trim();
        if name.is_empty() {
            continue;
        }
        add_namespaced(meta, name, content);
    }

    for link in parsed.select(&LINKS) {
        let (Some(rel), Some(href)) = (link.attr("rel"), link.attr("href")) else {
            continue;
        };
        let rel = rel.trim().to_ascii_lowercase();
        if EXCLUDED_RELS.contains(&rel.as_str()) {
            continue;
        }
        if let Ok(resolved) = url.join(href.trim()) {
            meta.add("link", &rel, resolved.to_string());
        }
    }
}

fn add_namespaced(meta: &mut Meta, name: &str, content: &str) {
    let lower = name.to_ascii_lowercase();
    if let Some(key) = lower.strip_prefix("og:") {
        meta.add("graph", key, content);
    } else if let Some(key) = lower.strip_prefix("article:") {
        meta.add("graph", key, content);
    } else if let Some(key) = lower.strip_prefix("twitter:") {
        meta.add("twitter", key, content);
    } else if let Some(key) = lower.strip_prefix("fediverse:") {
        meta.add("fedi", key, content);
    } else if let Some(key) = lower.strip_prefix("dc.") {
        meta.add("dc", key, content);
    } else if HTML_META_NAMES.contains(&lower.as_str()) {
        meta.add("html", &lower, content);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn collects_all_namespaces() {
        let parsed = Html::parse_document(
            "<html lang=\"en-US\" dir=\"ltr\"><head>\
             <title> A Title </title>\
             <meta name=\"description\" content=\"the description\">\
             <meta name=\"DC.Creator\" content=\"Jane\">\
             <meta property=\"og:title\" content=\"OG Title\">\
             <meta property=\"article:published_time\" content=\"2024-04-01T00:00:00Z\">\
             <meta name=\"twitter:card\" content=\"summary\">\
             <meta name=\"fediverse:creator\" content=\"@jane@ex.test\">\
             <link rel=\"canonical\" href=\"/post\">\
             <link rel=\"stylesheet\" href=\"/style.css\">\
             </head><body></body></html>",
        );
        let url: Url = "http://ex.test/post?x=1".parse().unwrap();
        let mut meta = Meta::new();
        collect(&parsed, &url, &mut meta);

        assert_eq!(meta.first("html", "lang"), Some("en-US"));
        assert_eq!(meta.first("html", "title"), Some("A Title"));
        assert_eq!(meta.first("html", "description"), Some("the description"));
        assert_eq!(meta.first("dc", "creator"), Some("Jane"));
        assert_eq!(meta.first("graph", "title"), Some("OG Title"));
        assert_eq!(
            meta.first("graph", "published_time"),
            Some("2024-04-01T00:00:00Z")
        );
        assert_eq!(meta.first("twitter", "card"), Some("summary"));
        assert_eq!(meta.first("fedi", "creator"), Some("@jane@ex.test"));
        assert_eq!(meta.first("link", "canonical"), Some("http://ex.test/post"));
        assert_eq!(meta.first("link", "stylesheet"), None);
    }
}
