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

//! Keeps typeset math readable: presentation markup stays, the bulky
//! `<annotation>` payloads (TeX sources, content mathml) go.

use crate::dom;
use crate::static_selectors;
use scraper::Html;

static_selectors! {
    [
        MATH = "math"
        ANNOTATIONS = "math annotation, math annotation-xml"
        SEMANTICS = "math semantics"
    ]
}

pub fn apply(parsed: &mut Html) {
    for id in dom::select_ids(parsed, &ANNOTATIONS) {
        dom::detach(&mut parsed.tree, id);
    }
    // With annotations gone, `<semantics>` is an empty shell around the
    // presentation tree.
    for id in dom::select_ids(parsed, &SEMANTICS) {
        dom::unwrap_node(&mut parsed.tree, id);
    }
    for id in dom::select_ids(parsed, &MATH) {
        let Some(element) = dom::as_element(parsed, id) else { continue };
        if element.attr("display").is_none() {
            dom::set_attr(&mut parsed.tree, id, "display", "inline");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn annotations_are_removed_presentation_stays() {
        let mut parsed = Html::parse_document(
            "<html><body><math><semantics><mrow><mi>x</mi></mrow>\
             <annotation encoding=\"application/x-tex\">x</annotation>\
             </semantics></math></body></html>",
        );
        apply(&mut parsed);
        let body = dom::render_body(&parsed);
        assert!(!body.contains("annotation"));
        assert!(!body.contains("semantics"));
        assert!(body.contains("<mi>x</mi>"), "{body}");
        assert!(body.contains("display=\"inline\""));
    }
}
