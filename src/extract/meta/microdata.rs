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

//! Schema.org microdata (`itemscope`/`itemprop`/`itemtype`).

use crate::dom;
use crate::extract::drop::Meta;
use crate::static_selectors;
use scraper::{ElementRef, Html};
use url::Url;

static_selectors! {
    [
        ITEM_SCOPES = "[itemscope]"
        ITEM_PROPS = "[itemprop]"
    ]
}

/// Collects microdata into the `schema` namespace. Urls (`itemid`, `href`,
/// `src` values) resolve against the document url.
pub fn extract(dom: &Html, doc_url: &Url, meta: &mut Meta) {
    for scope in dom.select(&ITEM_SCOPES) {
        if let Some(itemtype) = scope.attr("itemtype") {
            // Only the last path segment carries meaning for the consumers.
            let kind = itemtype.rsplit('/').next().unwrap_or(itemtype);
            meta.add("schema", "type", kind.trim());
        }
        if let Some(itemid) = scope.attr("itemid") {
            if let Ok(resolved) = doc_url.join(itemid.trim()) {
                meta.add("schema", "id", resolved.to_string());
            }
        }
    }
    for prop in dom.select(&ITEM_PROPS) {
        let Some(name) = prop.attr("itemprop") else { continue };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if let Some(value) = property_value(&prop, doc_url) {
            meta.add("schema", name, value);
        }
    }
}

/// The value of one `itemprop` element, per the microdata value rules:
/// `content` first, then resolved link targets, then text.
fn property_value(element: &ElementRef<'_>, doc_url: &Url) -> Option<String> {
    if let Some(content) = element.attr("content") {
        return Some(content.trim().to_string());
    }
    let tag = element.value().name();
    let link_attr = match tag {
        "a" | "area" | "link" => Some("href"),
        "img" | "audio" | "video" | "iframe" | "embed" | "source" => Some("src"),
        "time" => None,
        _ => None,
    };
    if let Some(attr) = link_attr {
        if let Some(value) = element.attr(attr) {
            return doc_url.join(value.trim()).ok().map(|u| u.to_string());
        }
    }
    if tag == "time" {
        if let Some(datetime) = element.attr("datetime") {
            return Some(datetime.trim().to_string());
        }
    }
    let text = dom::text_content(element);
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn collects_props_and_resolves_urls() {
        let dom = Html::parse_document(
            "<html><body>\
             <article itemscope itemtype=\"https://schema.org/NewsArticle\" itemid=\"/id/1\">\
             <h1 itemprop=\"headline\">The  Headline</h1>\
             <img itemprop=\"image\" src=\"/img/a.png\">\
             <time itemprop=\"datePublished\" datetime=\"2024-04-01T10:00:00Z\">April 1</time>\
             <meta itemprop=\"author\" content=\"Jane Doe\">\
             </article></body></html>",
        );
        let url: Url = "http://ex.test/post".parse().unwrap();
        let mut meta = Meta::new();
        extract(&dom, &url, &mut meta);
        assert_eq!(meta.first("schema", "type"), Some("NewsArticle"));
        assert_eq!(meta.first("schema", "id"), Some("http://ex.test/id/1"));
        assert_eq!(meta.first("schema", "headline"), Some("The Headline"));
        assert_eq!(meta.first("schema", "image"), Some("http://ex.test/img/a.png"));
        assert_eq!(
            meta.first("schema", "datePublished"),
            Some("2024-04-01T10:00:00Z")
        );
        assert_eq!(meta.first("schema", "author"), Some("Jane Doe"));
    }
}
