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

//! The readability pass.
//!
//! Pre-transforms repair markup that confuses scoring (noscript image
//! stand-ins, `<picture>` sets), the scorer isolates the article node, and
//! post-transforms normalise the result: media stripped, wrapper chains
//! collapsed, a `<section>` on top and every id/fragment prefixed with a
//! per-document token so concatenated pages cannot collide.

pub mod score;

use super::process::{ProcessMessage, Processor, Step};
use crate::dom;
use crate::static_selectors;
use ego_tree::NodeId;
use rand::distributions::Alphanumeric;
use rand::Rng;
use scraper::Html;

static_selectors! {
    [
        BODY = "body"
        NOSCRIPT = "noscript"
        PICTURE = "picture"
        PICTURE_SOURCE = "source"
        PICTURE_IMG = "img"
        FIGURES = "figure"
        HEADINGS = "h1, h2, h3, h4, h5, h6, h1 a, h2 a, h3 a, h4 a, h5 a, h6 a"
        ARTICLE_MEDIA = "object, embed, iframe, video, audio"
    ]
}

/// Attributes protecting heading identity across the scoring pass.
const KEEP_ID: &str = "data--caddis-id";
const KEEP_CLASS: &str = "data--caddis-class";

/// Tags that are transparent wrappers around the real content.
const CONTAINERS: [&str; 5] = ["body", "div", "section", "main", "article"];

pub struct ReadabilityProcessor {
    enabled: bool,
    force: bool,
}

impl ReadabilityProcessor {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            force: false,
        }
    }

    /// Runs the article isolation even for drops classified as bare media.
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

#[async_trait::async_trait(?Send)]
impl Processor for ReadabilityProcessor {
    fn name(&self) -> &'static str {
        "readability"
    }

    async fn process(&mut self, m: &mut ProcessMessage<'_>) {
        match m.step() {
            Step::Dom => {
                let enabled = self.enabled;
                if let Some(parsed) = m.dom() {
                    pre_transform(parsed);
                    if enabled {
                        isolate_article(parsed);
                    }
                    post_transform(parsed);
                }
            }
            Step::Finish => {
                let force = self.force;
                if let Some(drop) = m.drop_mut() {
                    if drop.is_media() && !force {
                        drop.body.clear();
                    }
                }
            }
            _ => {}
        }
    }
}

fn body_id(parsed: &Html) -> Option<NodeId> {
    parsed.select(&BODY).next().map(|body| body.id())
}

/// Markup repairs that run whether or not scoring is enabled.
pub fn pre_transform(parsed: &mut Html) {
    hoist_noscript_images(parsed);
    collapse_pictures(parsed);
    neutralize_figures(parsed);
}

/// `<noscript>` content parses as text; when it hides a single image, put
/// that image into the tree (replacing a placeholder sibling) so it scores
/// and archives like any other.
fn hoist_noscript_images(parsed: &mut Html) {
    for id in dom::select_ids(parsed, &NOSCRIPT) {
        let Some(node) = parsed.tree.get(id) else { continue };
        let fragment = Html::parse_fragment(&dom::text_content(&node));
        let root = fragment.root_element();
        let mut elements = root.children().filter(|child| child.value().is_element());
        let (Some(only), None) = (elements.next(), elements.next()) else {
            continue;
        };
        if only.value().as_element().map(|el| el.name.local.as_ref()) != Some("img") {
            continue;
        }

        let placeholder = parsed
            .tree
            .get(id)
            .and_then(|n| n.prev_siblings().find(|s| s.value().is_element()))
            .filter(|s| dom::tag_name(s) == Some("img"))
            .map(|s| s.id());
        if let Some(placeholder) = placeholder {
            dom::detach(&mut parsed.tree, placeholder);
        }
        {
            let Some(mut anchor) = parsed.tree.get_mut(id) else { continue };
            let mut before = anchor.insert_before(only.value().clone());
            dom::graft_children(&mut before, only);
        }
        dom::detach(&mut parsed.tree, id);
    }
}

/// `<picture>` collapses to its inner `<img>` with every `<source>` srcset
/// merged into one list.
fn collapse_pictures(parsed: &mut Html) {
    for id in dom::select_ids(parsed, &PICTURE) {
        let Some(element) = dom::as_element(parsed, id) else { continue };
        let mut srcsets: Vec<String> = Vec::new();
        for source in element.select(&PICTURE_SOURCE) {
            if let Some(set) = source.attr("srcset") {
                let set = set.trim();
                if !set.is_empty() {
                    srcsets.push(set.to_string());
                }
            }
        }
        let mut attrs: Vec<(String, String)> = element
            .select(&PICTURE_IMG)
            .next()
            .map(|img| {
                img.value()
                    .attrs()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        if let Some(existing) = attrs
            .iter()
            .find(|(name, _)| name == "srcset")
            .map(|(_, value)| value.clone())
        {
            srcsets.insert(0, existing);
        }
        attrs.retain(|(name, _)| name != "srcset");
        if !srcsets.is_empty() {
            attrs.push(("srcset".to_string(), srcsets.join(", ")));
        }
        if attrs.is_empty() {
            dom::detach(&mut parsed.tree, id);
            continue;
        }
        {
            let Some(mut anchor) = parsed.tree.get_mut(id) else { continue };
            anchor.insert_before(dom::element("img", attrs));
        }
        dom::detach(&mut parsed.tree, id);
    }
}

/// Classes and ids on figure trees bias the scorer; zero them where the
/// figure holds an image.
fn neutralize_figures(parsed: &mut Html) {
    for id in dom::select_ids(parsed, &FIGURES) {
        let Some(element) = dom::as_element(parsed, id) else { continue };
        let has_image = element
            .descendants()
            .filter_map(|node| dom::tag_name(&node))
            .any(|tag| tag == "img");
        if !has_image {
            continue;
        }
        let targets: Vec<NodeId> = element
            .descendants()
            .filter(|node| node.value().is_element())
            .map(|node| node.id())
            .collect();
        for target in targets {
            dom::remove_attr(&mut parsed.tree, target, "class");
            dom::remove_attr(&mut parsed.tree, target, "id");
        }
    }
}

/// Runs the scorer and rebuilds the body around the winning node.
fn isolate_article(parsed: &mut Html) {
    protect_headings(parsed);
    if let (Some(best), Some(body)) = (score::best_candidate(parsed), body_id(parsed)) {
        if best != body {
            if let Some(kept) = dom::move_append(&mut parsed.tree, best, body) {
                let others: Vec<NodeId> = parsed
                    .tree
                    .get(body)
                    .map(|node| {
                        node.children()
                            .filter(|child| child.id() != kept)
                            .map(|child| child.id())
                            .collect()
                    })
                    .unwrap_or_default();
                for other in others {
                    dom::detach(&mut parsed.tree, other);
                }
            }
        }
    }
    restore_headings(parsed);
}

fn protect_headings(parsed: &mut Html) {
    for id in dom::select_ids(parsed, &HEADINGS) {
        let Some(element) = dom::as_element(parsed, id) else { continue };
        let kept_id = element.attr("id").map(str::to_owned);
        let kept_class = element.attr("class").map(str::to_owned);
        if let Some(value) = kept_id {
            dom::set_attr(&mut parsed.tree, id, KEEP_ID, &value);
        }
        if let Some(value) = kept_class {
            dom::set_attr(&mut parsed.tree, id, KEEP_CLASS, &value);
        }
    }
}

fn restore_headings(parsed: &mut Html) {
    let targets: Vec<(NodeId, Option<String>, Option<String>)> = parsed
        .tree
        .root()
        .descendants()
        .filter_map(|node| {
            let element = node.value().as_element()?;
            let kept_id = element.attr(KEEP_ID).map(str::to_owned);
            let kept_class = element.attr(KEEP_CLASS).map(str::to_owned);
            (kept_id.is_some() || kept_class.is_some()).then_some((node.id(), kept_id, kept_class))
        })
        .collect();
    for (id, kept_id, kept_class) in targets {
        if let Some(value) = kept_id {
            dom::set_attr(&mut parsed.tree, id, "id", &value);
        }
        if let Some(value) = kept_class {
            dom::set_attr(&mut parsed.tree, id, "class", &value);
        }
        dom::remove_attr(&mut parsed.tree, id, KEEP_ID);
        dom::remove_attr(&mut parsed.tree, id, KEEP_CLASS);
    }
}

/// Normalises the extracted body: no playable media, no wrapper chains, a
/// `<section>` on top, unique ids.
pub fn post_transform(parsed: &mut Html) {
    for id in dom::select_ids(parsed, &ARTICLE_MEDIA) {
        dom::detach(&mut parsed.tree, id);
    }
    surface_content(parsed);
    ensure_section(parsed);
    prefix_identifiers(parsed, &generate_prefix());
}

fn has_real_text(parsed: &Html, id: NodeId) -> bool {
    parsed
        .tree
        .get(id)
        .map(|node| {
            node.children().any(|child| {
                child
                    .value()
                    .as_text()
                    .map(|text| !text.trim().is_empty())
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

fn element_children(parsed: &Html, id: NodeId) -> Vec<NodeId> {
    parsed
        .tree
        .get(id)
        .map(|node| {
            node.children()
                .filter(|child| child.value().is_element())
                .map(|child| child.id())
                .collect()
        })
        .unwrap_or_default()
}

fn tag_of(parsed: &Html, id: NodeId) -> Option<String> {
    parsed
        .tree
        .get(id)
        .and_then(|node| dom::tag_name(&node).map(str::to_owned))
}

/// Walks past single-child containers and keeps the first node with real
/// content as the body's only child.
fn surface_content(parsed: &mut Html) {
    let Some(body) = body_id(parsed) else { return };
    let mut current = body;
    loop {
        let children = element_children(parsed, current);
        let container = tag_of(parsed, current)
            .map(|tag| CONTAINERS.contains(&tag.as_str()))
            .unwrap_or(false);
        if container && children.len() == 1 && !has_real_text(parsed, current) {
            current = children[0];
        } else {
            break;
        }
    }
    if current == body {
        return;
    }
    if let Some(kept) = dom::move_append(&mut parsed.tree, current, body) {
        let others: Vec<NodeId> = parsed
            .tree
            .get(body)
            .map(|node| {
                node.children()
                    .filter(|child| child.id() != kept)
                    .map(|child| child.id())
                    .collect()
            })
            .unwrap_or_default();
        for other in others {
            dom::detach(&mut parsed.tree, other);
        }
    }
}

/// The body's top child ends up a `<section>`: lone divs are renamed, lone
/// other nodes wrapped, anything else moved into a fresh one.
fn ensure_section(parsed: &mut Html) {
    let Some(body) = body_id(parsed) else { return };
    let children = element_children(parsed, body);
    let text = has_real_text(parsed, body);

    if children.len() == 1 && !text {
        match tag_of(parsed, children[0]).as_deref() {
            Some("section") => return,
            Some("div") => {
                dom::rename_element(&mut parsed.tree, children[0], "section");
                return;
            }
            _ => {}
        }
    }

    let section_id = {
        let Some(mut body_node) = parsed.tree.get_mut(body) else { return };
        let section = body_node.append(dom::element("section", Vec::new()));
        section.id()
    };
    loop {
        let Some(first) = parsed
            .tree
            .get(body)
            .and_then(|node| node.first_child())
            .map(|child| child.id())
            .filter(|id| *id != section_id)
        else {
            break;
        };
        dom::move_append(&mut parsed.tree, first, section_id);
    }
}

/// `xK.9dQz` style token, fresh per document.
fn generate_prefix() -> String {
    let mut rng = rand::thread_rng();
    let head: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(2)
        .map(char::from)
        .collect();
    let tail: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(4)
        .map(char::from)
        .collect();
    format!("{head}.{tail}")
}

/// Rewrites `id`, `<a name>` and fragment hrefs to carry the document
/// token.
fn prefix_identifiers(parsed: &mut Html, prefix: &str) {
    let targets: Vec<(NodeId, Vec<(String, String)>)> = parsed
        .tree
        .root()
        .descendants()
        .filter_map(|node| {
            let element = node.value().as_element()?;
            let tag = element.name.local.as_ref();
            let mut edits = Vec::new();
            if let Some(id) = element.attr("id") {
                edits.push(("id".to_string(), format!("{prefix}.{id}")));
            }
            if tag == "a" {
                if let Some(name) = element.attr("name") {
                    edits.push(("name".to_string(), format!("{prefix}.{name}")));
                }
            }
            if let Some(href) = element.attr("href") {
                if let Some(fragment) = href.strip_prefix('#') {
                    if !fragment.is_empty() {
                        edits.push(("href".to_string(), format!("#{prefix}.{fragment}")));
                    }
                }
            }
            (!edits.is_empty()).then_some((node.id(), edits))
        })
        .collect();
    for (id, edits) in targets {
        for (name, value) in edits {
            dom::set_attr(&mut parsed.tree, id, &name, &value);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn doc(body: &str) -> Html {
        Html::parse_document(&format!("<html><head></head><body>{body}</body></html>"))
    }

    #[test]
    fn lone_div_becomes_section() {
        let mut parsed = doc("<div><p>content</p></div>");
        ensure_section(&mut parsed);
        let body = dom::render_body(&parsed);
        assert!(body.starts_with("<section>"), "{body}");
    }

    #[test]
    fn loose_children_are_wrapped() {
        let mut parsed = doc("<p>one</p><p>two</p>");
        ensure_section(&mut parsed);
        let body = dom::render_body(&parsed);
        assert_eq!(body, "<section><p>one</p><p>two</p></section>");
    }

    #[test]
    fn wrapper_chains_collapse() {
        let mut parsed = doc("<div><div><article><p>text body</p><p>more</p></article></div></div>");
        surface_content(&mut parsed);
        let body = dom::render_body(&parsed);
        assert_eq!(body, "<article><p>text body</p><p>more</p></article>");
    }

    #[test]
    fn ids_and_fragments_share_the_prefix() {
        let mut parsed = doc("<h1 id=\"intro\"><a href=\"#intro\">t</a></h1>");
        prefix_identifiers(&mut parsed, "AB.CDEF");
        let body = dom::render_body(&parsed);
        assert!(body.contains("id=\"AB.CDEF.intro\""), "{body}");
        assert!(body.contains("href=\"#AB.CDEF.intro\""), "{body}");
    }

    #[test]
    fn prefix_shape_is_two_dot_four() {
        let prefix = generate_prefix();
        let parts: Vec<&str> = prefix.split('.').collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), 2);
        assert_eq!(parts[1].len(), 4);
        assert!(prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '.'));
    }

    #[test]
    fn pictures_collapse_to_merged_img() {
        let mut parsed = doc(
            "<picture><source srcset=\"/a.webp 1x\"><source srcset=\"/b.webp 2x\"><img src=\"/c.jpg\" alt=\"x\"></picture>",
        );
        collapse_pictures(&mut parsed);
        let body = dom::render_body(&parsed);
        assert!(!body.contains("<picture>"));
        assert!(body.contains("src=\"/c.jpg\""));
        assert!(body.contains("srcset=\"/a.webp 1x, /b.webp 2x\""), "{body}");
    }

    #[test]
    fn noscript_single_image_is_hoisted() {
        let mut parsed = doc(
            "<img src=\"placeholder.gif\"><noscript>&lt;img src=\"real.jpg\"&gt;</noscript>",
        );
        hoist_noscript_images(&mut parsed);
        let body = dom::render_body(&parsed);
        assert!(!body.contains("noscript"));
        assert!(!body.contains("placeholder.gif"));
        assert!(body.contains("src=\"real.jpg\""));
    }

    #[test]
    fn media_is_removed_from_articles() {
        let mut parsed = doc("<section><p>text</p><iframe src=\"/e\"></iframe><video src=\"/v\"></video></section>");
        post_transform(&mut parsed);
        let body = dom::render_body(&parsed);
        assert!(!body.contains("iframe"));
        assert!(!body.contains("video"));
    }

    #[test]
    fn figure_identity_is_zeroed() {
        let mut parsed = doc("<figure class=\"wp-123\" id=\"fig\"><img src=\"/a.png\" class=\"large\"></figure>");
        neutralize_figures(&mut parsed);
        let body = dom::render_body(&parsed);
        assert!(!body.contains("wp-123"));
        assert!(!body.contains("class=\"large\""));
    }

    #[test]
    fn article_isolation_keeps_heading_identity() {
        let prose = "A reasonably long paragraph, with commas, that counts for scoring purposes in this test.";
        let mut parsed = doc(&format!(
            "<div class=\"menu\"><a href=\"/x\">x</a></div>\
             <div class=\"post\"><h1 id=\"head\" class=\"t\">Title</h1><p>{prose}</p><p>{prose}</p></div>"
        ));
        isolate_article(&mut parsed);
        let body = dom::render_body(&parsed);
        assert!(body.contains("id=\"head\""), "{body}");
        assert!(body.contains("class=\"post\""));
        assert!(!body.contains("menu"));
    }
}
