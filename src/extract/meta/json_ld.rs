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

//! `<script type="application/ld+json">` payloads.

use crate::dom;
use crate::static_selectors;
use scraper::Html;
use serde_json::Value;

static_selectors! {
    [
        LD_JSON = "script[type=\"application/ld+json\"]"
    ]
}

/// Every parseable json-ld block of the document, `@graph` wrappers
/// flattened away.
pub fn extract(dom: &Html) -> Vec<Value> {
    let mut values = Vec::new();
    for script in dom.select(&LD_JSON) {
        let text = dom::text_content(&script);
        let Ok(parsed) = serde_json::from_str::<Value>(&text) else {
            log::debug!("unparseable json-ld block skipped");
            continue;
        };
        flatten(parsed, &mut values);
    }
    values
}

fn flatten(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten(item, out);
            }
        }
        Value::Object(ref map) if map.contains_key("@graph") => {
            if let Some(graph) = map.get("@graph") {
                flatten(graph.clone(), out);
            }
        }
        other => out.push(other),
    }
}

/// A string field that may be a plain string, an object with a `name`, or
/// a list of either.
pub fn names_of(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Object(map) => map
            .get("name")
            .and_then(Value::as_str)
            .map(|s| vec![s.to_string()])
            .unwrap_or_default(),
        Value::Array(items) => items.iter().flat_map(names_of).collect(),
        _ => Vec::new(),
    }
}

/// First string value of `key` across all blocks whose `@type` matches
/// `types` (or across all blocks when `types` is empty).
pub fn first_str<'a>(blocks: &'a [Value], types: &[&str], key: &str) -> Option<&'a str> {
    blocks
        .iter()
        .filter(|block| types.is_empty() || type_matches(block, types))
        .find_map(|block| block.get(key).and_then(Value::as_str))
}

pub fn type_matches(block: &Value, types: &[&str]) -> bool {
    match block.get("@type") {
        Some(Value::String(kind)) => types.iter().any(|t| kind.eq_ignore_ascii_case(t)),
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| {
            kind.as_str()
                .map(|kind| types.iter().any(|t| kind.eq_ignore_ascii_case(t)))
                .unwrap_or(false)
        }),
        _ => false,
    }
}
