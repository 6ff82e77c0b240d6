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

//! Strips the self-link anchors cms themes attach to headings; the pilcrow
//! of one site is line noise in an archive.

use crate::dom;
use crate::static_selectors;
use scraper::Html;

static_selectors! {
    [
        HEADING_ANCHORS = "h1 a[href^=\"#\"], h2 a[href^=\"#\"], h3 a[href^=\"#\"], h4 a[href^=\"#\"], h5 a[href^=\"#\"], h6 a[href^=\"#\"]"
    ]
}

const MARKERS: [&str; 5] = ["#", "¶", "§", "link", "permalink"];

pub fn apply(parsed: &mut Html) {
    for id in dom::select_ids(parsed, &HEADING_ANCHORS) {
        let Some(element) = dom::as_element(parsed, id) else { continue };
        let text = dom::text_content(&element);
        let text = text.trim().to_ascii_lowercase();
        if text.is_empty() || MARKERS.contains(&text.as_str()) {
            dom::detach(&mut parsed.tree, id);
        } else {
            dom::unwrap_node(&mut parsed.tree, id);
        }
    }
}
