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

//! Article body scoring.
//!
//! A compact take on the classic readability heuristic: paragraphs feed
//! points to their ancestors, class names shift the weights, link-heavy
//! blocks lose, the best scored node is the article.

use crate::dom;
use crate::static_selectors;
use ego_tree::NodeId;
use scraper::{ElementRef, Html};
use std::collections::HashMap;
use std::sync::LazyLock;

static_selectors! {
    [
        PARAGRAPHS = "p, td, pre, blockquote"
        ANCHORS = "a"
    ]
}

static POSITIVE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)article|body|content|entry|main|page|post|text|blog|story").unwrap()
});

static NEGATIVE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?i)combx|comment|com-|contact|foot|masthead|media|meta|outbrain|promo|related|scroll|shoutbox|sidebar|sponsor|shopping|tags|tool|widget|banner|breadcrumb|share|social|nav",
    )
    .unwrap()
});

/// Minimum paragraph length worth counting.
const MIN_PARAGRAPH: usize = 25;

/// Picks the most article-like node of the document.
pub fn best_candidate(parsed: &Html) -> Option<NodeId> {
    let mut scores: HashMap<NodeId, f64> = HashMap::new();

    for paragraph in parsed.select(&PARAGRAPHS) {
        let text = dom::text_content(&paragraph);
        let text = text.trim();
        if text.len() < MIN_PARAGRAPH {
            continue;
        }
        let mut score = 1.0;
        score += text.matches(',').count() as f64;
        score += (text.len() as f64 / 100.0).min(3.0);

        let mut ancestors = paragraph.ancestors().filter_map(ElementRef::wrap);
        if let Some(parent) = ancestors.next() {
            *scores
                .entry(parent.id())
                .or_insert_with(|| initial_score(&parent)) += score;
            if let Some(grandparent) = ancestors.next() {
                *scores
                    .entry(grandparent.id())
                    .or_insert_with(|| initial_score(&grandparent)) += score / 2.0;
            }
        }
    }

    scores
        .into_iter()
        .map(|(id, score)| {
            let density = parsed
                .tree
                .get(id)
                .and_then(ElementRef::wrap)
                .map(|el| link_density(&el))
                .unwrap_or(1.0);
            (id, score * (1.0 - density))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .filter(|(_, score)| *score > 0.0)
        .map(|(id, _)| id)
}

fn initial_score(element: &ElementRef<'_>) -> f64 {
    let base = match element.value().name() {
        "div" | "article" | "section" | "main" => 5.0,
        "pre" | "td" | "blockquote" => 3.0,
        "address" | "ol" | "ul" | "dl" | "dd" | "dt" | "li" | "form" => -3.0,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "th" => -5.0,
        "body" => 0.0,
        _ => 0.0,
    };
    base + class_weight(element)
}

fn class_weight(element: &ElementRef<'_>) -> f64 {
    let mut weight = 0.0;
    for value in [element.attr("class"), element.attr("id")].into_iter().flatten() {
        if NEGATIVE.is_match(value) {
            weight -= 25.0;
        }
        if POSITIVE.is_match(value) {
            weight += 25.0;
        }
    }
    weight
}

/// Share of the text living inside links.
fn link_density(element: &ElementRef<'_>) -> f64 {
    let total = dom::text_content(element).trim().len();
    if total == 0 {
        return 1.0;
    }
    let linked: usize = element
        .select(&ANCHORS)
        .map(|anchor| dom::text_content(&anchor).trim().len())
        .sum();
    (linked as f64 / total as f64).min(1.0)
}
