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

//! Consolidates responsive image sets to one image per element, offline:
//! the widest declared candidate wins. (The archiver's best-image pass does
//! the same job with network probes; this one keeps extracted articles
//! simple even when archiving is off.)

use crate::archive::srcset;
use crate::dom;
use crate::static_selectors;
use scraper::Html;

static_selectors! {
    [
        SRCSET_IMAGES = "img[srcset]"
    ]
}

pub fn apply(parsed: &mut Html) {
    for id in dom::select_ids(parsed, &SRCSET_IMAGES) {
        let Some(element) = dom::as_element(parsed, id) else { continue };
        let Some(set) = element.attr("srcset") else { continue };
        let candidates = srcset::parse(set);
        let best = candidates
            .iter()
            .max_by_key(|candidate| candidate.width().unwrap_or(0))
            .map(|candidate| candidate.url.clone());

        let src = element.attr("src").map(str::to_owned);
        let chosen = match (best, src) {
            // A bare src with an undescribed srcset: trust the src.
            (Some(best), Some(src)) => {
                if candidates.iter().all(|c| c.width().is_none()) {
                    src
                } else {
                    best
                }
            }
            (Some(best), None) => best,
            (None, Some(src)) => src,
            (None, None) => continue,
        };
        dom::set_attr(&mut parsed.tree, id, "src", &chosen);
        dom::remove_attr(&mut parsed.tree, id, "srcset");
        dom::remove_attr(&mut parsed.tree, id, "sizes");
    }
}
