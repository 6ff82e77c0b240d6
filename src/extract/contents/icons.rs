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

//! Classifies tiny inline images (emoji, bullets, badges) so readers can
//! render them at text size instead of as figures.

use crate::dom;
use crate::static_selectors;
use scraper::Html;

static_selectors! {
    [
        IMAGES = "img"
    ]
}

/// Declared edge length at or below which an image counts as an icon.
const ICON_EDGE: u32 = 32;

const CLASS_HINTS: [&str; 4] = ["icon", "emoji", "smiley", "wp-smiley"];

pub fn apply(parsed: &mut Html) {
    for id in dom::select_ids(parsed, &IMAGES) {
        let Some(element) = dom::as_element(parsed, id) else { continue };
        let declared_small = ["width", "height"].iter().any(|attr| {
            element
                .attr(attr)
                .and_then(|value| value.trim().parse::<u32>().ok())
                .map(|edge| edge > 0 && edge <= ICON_EDGE)
                .unwrap_or(false)
        });
        let hinted = element
            .attr("class")
            .map(|classes| {
                classes
                    .split_whitespace()
                    .any(|class| CLASS_HINTS.contains(&class.to_ascii_lowercase().as_str()))
            })
            .unwrap_or(false);
        if !(declared_small || hinted) {
            continue;
        }
        let merged = match element.attr("class") {
            Some(classes) if !classes.split_whitespace().any(|c| c == "image-icon") => {
                format!("{classes} image-icon")
            }
            Some(classes) => classes.to_string(),
            None => "image-icon".to_string(),
        };
        dom::set_attr(&mut parsed.tree, id, "class", &merged);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn small_and_hinted_images_are_marked() {
        let mut parsed = Html::parse_document(
            "<html><body>\
             <img src=\"/e.png\" width=\"16\" height=\"16\">\
             <img src=\"/s.png\" class=\"emoji\">\
             <img src=\"/big.png\" width=\"800\">\
             </body></html>",
        );
        apply(&mut parsed);
        let body = dom::render_body(&parsed);
        assert_eq!(body.matches("image-icon").count(), 2, "{body}");
    }
}
