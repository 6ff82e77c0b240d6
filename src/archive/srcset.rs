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

//! `srcset` handling.
//!
//! Each candidate is a url plus an optional width (`800w`) or density
//! (`2x`) descriptor, comma separated.

use itertools::Itertools;

/// One entry of a `srcset` attribute.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Candidate {
    pub url: String,
    pub descriptor: Option<String>,
}

impl Candidate {
    /// The width descriptor in pixels, if the candidate carries one.
    pub fn width(&self) -> Option<u32> {
        self.descriptor
            .as_deref()?
            .strip_suffix(['w', 'W'])?
            .parse()
            .ok()
    }
}

/// Parses a `srcset` value. Malformed entries are dropped silently, the
/// way browsers treat them.
pub fn parse(srcset: &str) -> Vec<Candidate> {
    srcset
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split_whitespace();
            let url = parts.next()?.to_string();
            if url.is_empty() {
                return None;
            }
            let descriptor = parts.next().map(str::to_string);
            Some(Candidate { url, descriptor })
        })
        .collect()
}

/// Renders candidates back into an attribute value.
pub fn render(candidates: &[Candidate]) -> String {
    candidates
        .iter()
        .map(|candidate| match &candidate.descriptor {
            Some(descriptor) => format!("{} {}", candidate.url, descriptor),
            None => candidate.url.clone(),
        })
        .join(", ")
}

/// Rewrites every candidate url through `rewrite`; `None` drops the entry.
pub fn map_urls<F>(srcset: &str, mut rewrite: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mapped: Vec<Candidate> = parse(srcset)
        .into_iter()
        .filter_map(|mut candidate| {
            candidate.url = rewrite(&candidate.url)?;
            Some(candidate)
        })
        .collect();
    render(&mapped)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_urls_and_descriptors() {
        let candidates = parse("elva-480w.jpg 480w, elva-800w.jpg 800w, plain.jpg");
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].url, "elva-480w.jpg");
        assert_eq!(candidates[0].width(), Some(480));
        assert_eq!(candidates[2].descriptor, None);
    }

    #[test]
    fn density_descriptor_has_no_width() {
        let candidates = parse("a.jpg 2x");
        assert_eq!(candidates[0].width(), None);
    }

    #[test]
    fn map_urls_rewrites_and_drops() {
        let out = map_urls("a.jpg 1x, b.jpg 2x", |url| {
            (url != "b.jpg").then(|| format!("local/{url}"))
        });
        assert_eq!(out, "local/a.jpg 1x");
    }
}
