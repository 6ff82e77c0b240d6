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

//! Per-site extraction rules.
//!
//! A [`SiteConfig`] is supplied by the embedding application through a
//! [`ConfigLookup`] and drives the pipeline: header overrides before the
//! load, raw text replacements at the body step, selector driven stripping,
//! body isolation and page chasing at the dom step. Every selector is best
//! effort; one that fails to parse or match is logged and skipped, never
//! fatal.

use super::drop::Drop;
use super::meta::fields;
use super::process::{ProcessMessage, Processor, Step};
use crate::dom;
use crate::run_warn;
use async_trait::async_trait;
use ego_tree::NodeId;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// One site's ruleset. Selectors are css selector strings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SiteConfig {
    /// First selector whose matches carry element children becomes the
    /// article body.
    pub body_selectors: Vec<String>,
    pub author_selectors: Vec<String>,
    pub date_selectors: Vec<String>,
    /// Matches removed from the document.
    pub strip_selectors: Vec<String>,
    /// Bare ids or class names removed from the document.
    pub strip_id_or_class: Vec<String>,
    /// Images whose src contains one of these are removed.
    pub strip_image_src: Vec<String>,
    /// A match replaces the current drop and restarts the pipeline.
    pub single_page_link_selectors: Vec<String>,
    /// A match queues a follow-up drop.
    pub next_page_link_selectors: Vec<String>,
    /// Extra request headers for this site.
    pub http_headers: HashMap<String, String>,
    /// Raw `(from, to)` text replacements applied to the body bytes.
    pub replace_strings: Vec<(String, String)>,
}

impl SiteConfig {
    pub fn is_empty(&self) -> bool {
        *self == SiteConfig::default()
    }
}

/// Where site configurations come from; keyed by whatever the application
/// wants, queried by url.
pub trait ConfigLookup: Send + Sync {
    fn lookup(&self, url: &Url) -> Option<SiteConfig>;
}

/// Host keyed lookup, good enough for most applications and for tests.
impl ConfigLookup for HashMap<String, SiteConfig> {
    fn lookup(&self, url: &Url) -> Option<SiteConfig> {
        let host = url.host_str()?;
        self.get(host)
            .or_else(|| self.get(host.trim_start_matches("www.")))
            .cloned()
    }
}

pub struct SiteConfigProcessor {
    lookup: Box<dyn ConfigLookup>,
    current: Option<SiteConfig>,
}

impl SiteConfigProcessor {
    pub fn new(lookup: Box<dyn ConfigLookup>) -> Self {
        Self {
            lookup,
            current: None,
        }
    }
}

#[async_trait(?Send)]
impl Processor for SiteConfigProcessor {
    fn name(&self) -> &'static str {
        "site-config"
    }

    async fn process(&mut self, m: &mut ProcessMessage<'_>) {
        match m.step() {
            Step::Start => {
                let Some(url) = m.drop().map(|drop| drop.url.clone()) else {
                    return;
                };
                self.current = self.lookup.lookup(&url);
                if let Some(config) = &self.current {
                    let headers = header_map(config, m);
                    if !headers.is_empty() {
                        m.extractor.client_mut().set_header_overrides(headers);
                    }
                    m.extractor.context.insert(
                        "site-config".to_string(),
                        serde_json::to_value(config).unwrap_or_default(),
                    );
                }
            }
            Step::Body => {
                let Some(config) = self.current.clone() else { return };
                if let Some(drop) = m.drop_mut() {
                    for (from, to) in &config.replace_strings {
                        drop.body = drop.body.replace(from, to);
                    }
                }
            }
            Step::Dom => {
                let Some(config) = self.current.clone() else { return };
                self.apply_dom(&config, m);
            }
            _ => {}
        }
    }
}

impl SiteConfigProcessor {
    fn apply_dom(&self, config: &SiteConfig, m: &mut ProcessMessage<'_>) {
        let Some(drop) = m.drop() else { return };
        let url = drop.url.clone();
        let sink = m.extractor.error_sink().clone();

        // Single-page variants replace this drop outright.
        if let Some(parsed) = m.dom() {
            if let Some(target) = first_link(parsed, &config.single_page_link_selectors, &url, &sink)
            {
                if target != url {
                    m.reset_position(Drop::new(target));
                    return;
                }
            }
        }

        let mut authors: Vec<String> = Vec::new();
        let mut date = None;
        if let Some(parsed) = m.dom() {
            for selector in parse_all(&config.author_selectors, &sink) {
                for matched in parsed.select(&selector) {
                    authors.push(dom::text_content(&matched));
                }
            }
            for selector in parse_all(&config.date_selectors, &sink) {
                for matched in parsed.select(&selector) {
                    let value = matched
                        .attr("datetime")
                        .map(str::to_owned)
                        .unwrap_or_else(|| dom::text_content(&matched));
                    date = fields::parse_date(value.trim());
                    if date.is_some() {
                        break;
                    }
                }
                if date.is_some() {
                    break;
                }
            }

            strip(parsed, config, &sink);
            isolate_body(parsed, &config.body_selectors, &sink);
        }

        let next = m
            .dom()
            .and_then(|parsed| first_link(parsed, &config.next_page_link_selectors, &url, &sink));

        if let Some(drop) = m.drop_mut() {
            for author in authors {
                drop.add_author(author);
            }
            if drop.date.is_none() {
                drop.date = date;
            }
        }
        if let Some(next) = next {
            m.add_drop(Drop::new(next));
        }
    }
}

fn header_map(config: &SiteConfig, m: &mut ProcessMessage<'_>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.http_headers {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            run_warn!(m.extractor.error_sink(), "invalid site header name {name:?}");
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            run_warn!(m.extractor.error_sink(), "invalid site header value for {name}");
            continue;
        };
        headers.insert(name, value);
    }
    headers
}

fn parse_all(selectors: &[String], sink: &crate::logging::ErrorSink) -> Vec<Selector> {
    selectors
        .iter()
        .filter_map(|raw| match Selector::parse(raw) {
            Ok(selector) => Some(selector),
            Err(_) => {
                run_warn!(sink, "unparseable site selector {raw:?}");
                None
            }
        })
        .collect()
}

fn first_link(
    parsed: &Html,
    selectors: &[String],
    base: &Url,
    sink: &crate::logging::ErrorSink,
) -> Option<Url> {
    for selector in parse_all(selectors, sink) {
        for matched in parsed.select(&selector) {
            let Some(href) = matched.attr("href") else { continue };
            if let Ok(mut resolved) = base.join(href.trim()) {
                resolved.set_fragment(None);
                return Some(resolved);
            }
        }
    }
    None
}

fn strip(parsed: &mut Html, config: &SiteConfig, sink: &crate::logging::ErrorSink) {
    let mut doomed: Vec<NodeId> = Vec::new();
    for selector in parse_all(&config.strip_selectors, sink) {
        doomed.extend(parsed.select(&selector).map(|el| el.id()));
    }
    for token in &config.strip_id_or_class {
        let escaped = token.trim();
        if escaped.is_empty() {
            continue;
        }
        for raw in [format!("#{escaped}"), format!(".{escaped}")] {
            if let Ok(selector) = Selector::parse(&raw) {
                doomed.extend(parsed.select(&selector).map(|el| el.id()));
            }
        }
    }
    for fragment in &config.strip_image_src {
        let raw = format!("img[src*=\"{fragment}\"]");
        if let Ok(selector) = Selector::parse(&raw) {
            doomed.extend(parsed.select(&selector).map(|el| el.id()));
        };
    }
    for id in doomed {
        dom::detach(&mut parsed.tree, id);
    }
}

/// Rebuilds the body as `<section class="article" id="article">` around the
/// first selector whose matches actually hold markup.
fn isolate_body(parsed: &mut Html, selectors: &[String], sink: &crate::logging::ErrorSink) {
    crate::static_selectors! {
        [
            BODY = "body"
        ]
    }
    for selector in parse_all(selectors, sink) {
        let matched: Vec<NodeId> = parsed
            .select(&selector)
            .filter(|el| el.children().any(|child| child.value().is_element()))
            .map(|el| el.id())
            .collect();
        if matched.is_empty() {
            continue;
        }
        let Some(body) = parsed.select(&BODY).next().map(|body| body.id()) else {
            return;
        };
        let section_id = {
            let Some(mut body_node) = parsed.tree.get_mut(body) else { return };
            let section = body_node.append(dom::element(
                "section",
                vec![
                    ("class".to_string(), "article".to_string()),
                    ("id".to_string(), "article".to_string()),
                ],
            ));
            section.id()
        };
        for id in matched {
            dom::move_append(&mut parsed.tree, id, section_id);
        }
        // Everything that did not make it into the section goes.
        let others: Vec<NodeId> = parsed
            .tree
            .get(body)
            .map(|node| {
                node.children()
                    .filter(|child| child.id() != section_id)
                    .map(|child| child.id())
                    .collect()
            })
            .unwrap_or_default();
        for other in others {
            dom::detach(&mut parsed.tree, other);
        }
        return;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::logging::ErrorSink;

    fn doc(body: &str) -> Html {
        Html::parse_document(&format!("<html><head></head><body>{body}</body></html>"))
    }

    #[test]
    fn strip_rules_remove_matches() {
        let mut parsed = doc(
            "<div id=\"ad\">x</div><div class=\"share\">y</div>\
             <img src=\"/tracker/pixel.gif\"><p>keep</p>",
        );
        let config = SiteConfig {
            strip_id_or_class: vec!["ad".into(), "share".into()],
            strip_image_src: vec!["tracker/".into()],
            ..SiteConfig::default()
        };
        strip(&mut parsed, &config, &ErrorSink::new());
        let body = dom::render_body(&parsed);
        assert_eq!(body, "<p>keep</p>");
    }

    #[test]
    fn body_selector_builds_article_section() {
        let mut parsed = doc(
            "<nav>menu</nav><div class=\"post\"><p>content</p></div><footer>f</footer>",
        );
        isolate_body(
            &mut parsed,
            &["div.post".to_string()],
            &ErrorSink::new(),
        );
        let body = dom::render_body(&parsed);
        assert_eq!(
            body,
            "<section class=\"article\" id=\"article\"><div class=\"post\"><p>content</p></div></section>"
        );
    }

    #[test]
    fn empty_matches_leave_the_body_alone() {
        let mut parsed = doc("<p>keep</p>");
        isolate_body(
            &mut parsed,
            &["div.missing".to_string(), "p.empty".to_string()],
            &ErrorSink::new(),
        );
        assert_eq!(dom::render_body(&parsed), "<p>keep</p>");
    }

    #[test]
    fn unparseable_selectors_are_reported_not_fatal() {
        let sink = ErrorSink::new();
        let selectors = parse_all(&["p".to_string(), "{{nope".to_string()], &sink);
        assert_eq!(selectors.len(), 1);
        assert_eq!(sink.records().len(), 1);
    }

    #[test]
    fn lookup_by_host_ignores_www() {
        let mut configs: HashMap<String, SiteConfig> = HashMap::new();
        configs.insert(
            "ex.test".to_string(),
            SiteConfig {
                strip_id_or_class: vec!["x".into()],
                ..SiteConfig::default()
            },
        );
        let url: Url = "http://www.ex.test/a".parse().unwrap();
        assert!(configs.lookup(&url).is_some());
    }

    #[test]
    fn config_round_trips_through_serde() {
        let json = r#"{
            "body_selectors": ["div.article"],
            "http_headers": {"x-forwarded-for": "127.0.0.1"},
            "replace_strings": [["<noscript>", "<div>"]]
        }"#;
        let config: SiteConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.body_selectors, ["div.article"]);
        assert_eq!(config.replace_strings[0].0, "<noscript>");
        assert!(config.single_page_link_selectors.is_empty());
    }
}
