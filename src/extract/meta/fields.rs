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

//! Folds the collected metadata into the drop fields, with one fallback
//! chain per field.

use super::json_ld;
use crate::extract::drop::{DocumentType, Drop};
use serde_json::Value;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

/// Longest description, in whitespace separated tokens.
const DESCRIPTION_TOKENS: usize = 60;

pub fn derive(drop: &mut Drop) {
    let ld_blocks = drop
        .properties
        .get("json-ld")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let article_types = ["Article", "NewsArticle", "BlogPosting", "Report"];

    if drop.title.is_empty() {
        drop.title = drop
            .meta
            .lookup(&[("graph", "title"), ("twitter", "title"), ("schema", "headline")])
            .map(str::to_string)
            .or_else(|| {
                json_ld::first_str(&ld_blocks, &article_types, "headline").map(str::to_string)
            })
            .or_else(|| drop.meta.first("html", "title").map(str::to_string))
            .unwrap_or_default();
    }

    if drop.description.is_empty() {
        drop.description = drop
            .meta
            .lookup(&[
                ("graph", "description"),
                ("twitter", "description"),
                ("schema", "description"),
                ("html", "description"),
            ])
            .map(str::to_string)
            .or_else(|| {
                json_ld::first_str(&ld_blocks, &article_types, "description").map(str::to_string)
            })
            .unwrap_or_default();
    }
    drop.description = truncate_description(&drop.description);

    if drop.site.is_empty() {
        drop.site = drop
            .meta
            .lookup(&[("graph", "site_name"), ("twitter", "site")])
            .map(|site| site.trim_start_matches('@').to_string())
            .or_else(|| drop.url.host_str().map(str::to_string))
            .unwrap_or_default();
    }

    if drop.lang.is_empty() {
        if let Some(lang) = drop.meta.first("html", "lang") {
            drop.lang = lang.to_string();
        }
    }

    if drop.authors.is_empty() {
        let mut authors: Vec<String> = Vec::new();
        for (namespace, key) in [
            ("graph", "author"),
            ("schema", "author"),
            ("dc", "creator"),
            ("html", "author"),
            ("fedi", "creator"),
        ] {
            authors.extend(drop.meta.all(namespace, key).iter().cloned());
        }
        for block in &ld_blocks {
            if let Some(author) = block.get("author") {
                authors.extend(json_ld::names_of(author));
            }
        }
        for author in authors {
            drop.add_author(author);
        }
    }

    if drop.date.is_none() {
        drop.date = [
            drop.meta.first("graph", "published_time"),
            drop.meta.first("schema", "datePublished"),
            json_ld::first_str(&ld_blocks, &[], "datePublished"),
            drop.meta.first("dc", "date"),
            drop.meta.first("html", "date"),
        ]
        .into_iter()
        .flatten()
        .find_map(parse_date);
    }

    drop.document_type = document_type(drop, &ld_blocks);
}

/// og:type carries values like `article`, `video.movie` or
/// `ns: video.other`; the first dotted segment decides.
fn document_type(drop: &Drop, ld_blocks: &[Value]) -> DocumentType {
    let mut kind = drop
        .meta
        .first("graph", "type")
        .map(|value| {
            let value = value.rsplit(':').next().unwrap_or(value).trim();
            value.split('.').next().unwrap_or(value).to_ascii_lowercase()
        })
        .unwrap_or_default();

    if kind.is_empty() {
        if ld_blocks.iter().any(|b| json_ld::type_matches(b, &["VideoObject"])) {
            kind = "video".to_string();
        } else if ld_blocks
            .iter()
            .any(|b| json_ld::type_matches(b, &["ImageObject", "Photograph"]))
        {
            kind = "photo".to_string();
        }
    }

    // An oembed discovery result overrides what the page claims.
    if let Some(oembed) = drop
        .properties
        .get("oembed")
        .and_then(|v| v.get("type"))
        .and_then(Value::as_str)
    {
        kind = oembed.to_ascii_lowercase();
    }

    match kind.as_str() {
        "photo" | "image" => DocumentType::Photo,
        "video" => DocumentType::Video,
        _ => DocumentType::Article,
    }
}

pub fn parse_date(value: &str) -> Option<OffsetDateTime> {
    let value = value.trim();
    if let Ok(parsed) = OffsetDateTime::parse(value, &Rfc3339) {
        return Some(parsed);
    }
    if let Ok(parsed) = OffsetDateTime::parse(value, &Rfc2822) {
        return Some(parsed);
    }
    let datetime = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    if let Ok(parsed) = PrimitiveDateTime::parse(value, &datetime) {
        return Some(parsed.assume_utc());
    }
    let date = format_description!("[year]-[month]-[day]");
    if let Ok(parsed) = Date::parse(value, &date) {
        return Some(parsed.midnight().assume_utc());
    }
    None
}

/// Caps a description at sixty tokens, marking the cut with `...`.
pub fn truncate_description(value: &str) -> String {
    let tokens: Vec<&str> = value.split_whitespace().collect();
    if tokens.len() <= DESCRIPTION_TOKENS {
        return tokens.join(" ");
    }
    let mut out = tokens[..DESCRIPTION_TOKENS].join(" ");
    out.push_str(" ...");
    out
}
