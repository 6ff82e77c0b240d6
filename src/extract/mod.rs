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

//! The extraction pipeline.
//!
//! An [`Extractor`] owns a queue of [`Drop`]s (pages) and an ordered list of
//! [`Processor`]s. Every drop walks through the steps Start, Body, Dom and
//! Finish; after the queue drains a single PostProcess step sees the
//! concatenated result and Done always closes the run. Processors steer the
//! loop through [`ProcessMessage`]: replacing the current drop and
//! resetting, or queueing follow-up pages, both within hard bounds.

pub mod archive;
pub mod contents;
pub mod drop;
pub mod meta;
pub mod process;
pub mod readability;
pub mod scripts;
pub mod siteconfig;

pub use drop::{Drop, DocumentType, Meta, TextDirection};
pub use process::{Actions, ProcessMessage, Processor, Step};

use crate::client::{Client, ClientError, RequestContext, RequestKind};
use crate::dom;
use crate::format;
use crate::logging::ErrorSink;
use drop::direction_for_language;
use scraper::Html;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::mem;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Hard bound on pipeline restarts per run.
pub const MAX_RESETS: u8 = 10;
/// Hard bound on pages per run.
pub const MAX_DROPS: usize = 100;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("initial document load failed: {0}")]
    InitialLoad(String),
    #[error("extraction canceled: {0}")]
    Canceled(String),
}

enum Flow {
    Continue,
    Reset,
    Canceled,
}

/// The run-scope object of one extraction.
pub struct Extractor {
    drops: Vec<Drop>,
    visited: HashSet<String>,
    client: Client,
    errors: ErrorSink,
    processors: Vec<Box<dyn Processor>>,
    /// Free-form state shared between processors, site configs and scripts.
    pub context: HashMap<String, Value>,
    html: String,
    cancel: CancellationToken,
    cancel_reason: Option<String>,
}

impl Extractor {
    pub fn new(url: &str) -> Result<Self, ExtractError> {
        Ok(Self::with_client(
            url.parse()?,
            Client::new().map_err(|err| ExtractError::InitialLoad(err.to_string()))?,
        ))
    }

    pub fn with_client(url: Url, client: Client) -> Self {
        Self {
            drops: vec![Drop::new(url)],
            visited: HashSet::new(),
            client,
            errors: ErrorSink::new(),
            processors: Vec::new(),
            context: HashMap::new(),
            html: String::new(),
            cancel: CancellationToken::new(),
            cancel_reason: None,
        }
    }

    /// Appends processors; they run in registration order at every step.
    pub fn add_processors(&mut self, processors: impl IntoIterator<Item = Box<dyn Processor>>) {
        self.processors.extend(processors);
    }

    pub fn drops(&self) -> &[Drop] {
        &self.drops
    }

    pub fn drop_at_mut(&mut self, position: usize) -> Option<&mut Drop> {
        self.drops.get_mut(position)
    }

    /// The first drop carries the article-level metadata of the run.
    pub fn root_drop(&self) -> &Drop {
        &self.drops[0]
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }

    /// Warn+ records collected during the run.
    pub fn errors(&self) -> Vec<String> {
        self.errors.records()
    }

    pub fn error_sink(&self) -> &ErrorSink {
        &self.errors
    }

    /// The concatenated html of all pages, available from PostProcess on.
    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Requests cancellation; the loop stops before the next step.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn run(&mut self) -> Result<(), ExtractError> {
        let mut processors = mem::take(&mut self.processors);
        let result = self.run_inner(&mut processors).await;

        // Done always runs, even for canceled or failed runs.
        let mut dom = None;
        let mut actions = Actions::default();
        let last = self.drops.len().saturating_sub(1);
        self.run_step(&mut processors, Step::Done, &mut dom, last, 0, &mut actions)
            .await;
        self.processors = processors;

        if let Err(ref err) = result {
            crate::run_error!(self.errors, "{err}");
        }
        result
    }

    async fn run_inner(
        &mut self,
        processors: &mut [Box<dyn Processor>],
    ) -> Result<(), ExtractError> {
        let mut position = 0usize;
        let mut resets = 0u8;

        'queue: while position < self.drops.len() {
            if self.cancel.is_cancelled() {
                return Err(self.canceled());
            }
            let key = self.drops[position].url.as_str().to_owned();
            if !self.visited.insert(key) {
                position += 1;
                continue;
            }

            let mut dom: Option<Html> = None;
            let mut actions = Actions::default();

            self.run_step(processors, Step::Start, &mut dom, position, resets, &mut actions)
                .await;
            match self.apply_actions(&mut actions, position, &mut resets) {
                Flow::Continue => {}
                Flow::Reset => continue 'queue,
                Flow::Canceled => return Err(self.canceled()),
            }

            if let Err(err) = self.load_drop(position).await {
                if position == 0 {
                    return Err(ExtractError::InitialLoad(err));
                }
                crate::run_warn!(self.errors, "page {} not loaded: {err}", position + 1);
                position += 1;
                continue;
            }

            self.run_step(processors, Step::Body, &mut dom, position, resets, &mut actions)
                .await;
            match self.apply_actions(&mut actions, position, &mut resets) {
                Flow::Continue => {}
                Flow::Reset => continue 'queue,
                Flow::Canceled => return Err(self.canceled()),
            }

            if self.drops[position].is_html() && !self.drops[position].body.is_empty() {
                let mut parsed = Html::parse_document(&self.drops[position].body);
                rename_data_attrs(&mut parsed, "data-", "x-data-");
                dom = Some(parsed);

                self.run_step(processors, Step::Dom, &mut dom, position, resets, &mut actions)
                    .await;
                match self.apply_actions(&mut actions, position, &mut resets) {
                    Flow::Continue => {}
                    Flow::Reset => continue 'queue,
                    Flow::Canceled => return Err(self.canceled()),
                }

                if let Some(parsed) = dom.as_mut() {
                    rename_data_attrs(parsed, "x-data-", "data-");
                    self.drops[position].body = dom::render_body(parsed);
                }
            }

            self.run_step(processors, Step::Finish, &mut dom, position, resets, &mut actions)
                .await;
            match self.apply_actions(&mut actions, position, &mut resets) {
                Flow::Continue => {}
                Flow::Reset => continue 'queue,
                Flow::Canceled => return Err(self.canceled()),
            }
            self.normalize_drop(position);

            position += 1;
        }

        self.html = self
            .drops
            .iter()
            .enumerate()
            .filter(|(_, drop)| !drop.body.is_empty())
            .map(|(index, drop)| format!("<!-- page {} -->\n{}", index + 1, drop.body))
            .collect::<Vec<_>>()
            .join("\n");

        let mut dom: Option<Html> = None;
        let mut actions = Actions::default();
        let last = self.drops.len().saturating_sub(1);
        self.run_step(processors, Step::PostProcess, &mut dom, last, resets, &mut actions)
            .await;
        match self.apply_actions(&mut actions, last, &mut resets) {
            Flow::Canceled => Err(self.canceled()),
            _ => Ok(()),
        }
    }

    async fn run_step(
        &mut self,
        processors: &mut [Box<dyn Processor>],
        step: Step,
        dom: &mut Option<Html>,
        position: usize,
        resets: u8,
        actions: &mut Actions,
    ) {
        for processor in processors.iter_mut() {
            if actions.cancel.is_some() || self.cancel.is_cancelled() {
                break;
            }
            let mut message = ProcessMessage {
                extractor: &mut *self,
                dom: &mut *dom,
                step,
                position,
                resets,
                actions: &mut *actions,
            };
            processor.process(&mut message).await;
        }
    }

    fn apply_actions(&mut self, actions: &mut Actions, position: usize, resets: &mut u8) -> Flow {
        if let Some(reason) = actions.cancel.take() {
            self.cancel_reason = Some(reason);
            self.cancel.cancel();
            return Flow::Canceled;
        }
        for drop in actions.new_drops.drain(..) {
            if self.drops.len() >= MAX_DROPS {
                self.cancel_reason = Some("too many drops".to_string());
                self.cancel.cancel();
                return Flow::Canceled;
            }
            self.drops.push(drop);
        }
        if let Some(replacement) = actions.reset.take() {
            *resets += 1;
            if *resets > MAX_RESETS {
                self.cancel_reason = Some("too many redirects".to_string());
                self.cancel.cancel();
                return Flow::Canceled;
            }
            self.drops[position] = replacement;
            return Flow::Reset;
        }
        Flow::Continue
    }

    fn canceled(&mut self) -> ExtractError {
        ExtractError::Canceled(
            self.cancel_reason
                .take()
                .unwrap_or_else(|| "canceled".to_string()),
        )
    }

    async fn load_drop(&mut self, position: usize) -> Result<(), String> {
        let url = self.drops[position].url.clone();
        let ctx = RequestContext::new(RequestKind::Page);
        let response = self
            .client
            .get(&ctx, &url)
            .await
            .map_err(|err: ClientError| err.to_string())?;

        let status = response.status;
        let final_url = response.final_url.clone();
        let declared = response
            .content_type()
            .and_then(format::parse_content_type);
        let bytes = response
            .bytes()
            .await
            .map_err(|err: ClientError| err.to_string())?;

        let drop = &mut self.drops[position];
        drop.status = status.as_u16();
        if let Some(final_url) = final_url {
            drop.url = crate::archive::resource::canonical_url(&final_url);
        }
        if !status.is_success() {
            return Err(format!("unexpected status {status}"));
        }
        let content_type = declared.unwrap_or_else(|| format::sniff(&bytes));
        if format::is_html(&content_type) || content_type.type_() == mime::TEXT {
            drop.body = format::decode_text(&bytes, Some(&content_type));
        }
        drop.content_type = Some(content_type);
        Ok(())
    }

    /// Per-drop metadata hygiene after Finish: two-letter language, text
    /// direction, and plain-text titles, authors and descriptions.
    fn normalize_drop(&mut self, position: usize) {
        let drop = &mut self.drops[position];
        drop.lang = drop
            .lang
            .trim()
            .chars()
            .take(2)
            .collect::<String>()
            .to_lowercase();
        drop.text_direction = direction_for_language(&drop.lang);
        drop.title = strip_html(&drop.title);
        drop.description = strip_html(&drop.description);
        drop.site = strip_html(&drop.site);
        for author in drop.authors.iter_mut() {
            *author = strip_html(author);
        }
        drop.authors.retain(|author| !author.is_empty());
    }
}

/// Flattens markup to its text content and collapses whitespace.
pub fn strip_html(value: &str) -> String {
    if !value.contains('<') && !value.contains('&') {
        return value.split_whitespace().collect::<Vec<_>>().join(" ");
    }
    let fragment = Html::parse_fragment(value);
    let text = dom::text_content(&fragment.tree.root());
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Renames every attribute starting with `from` to start with `to`
/// instead; the readability scorer must not see `data-*`.
fn rename_data_attrs(dom: &mut Html, from: &str, to: &str) {
    let targets: Vec<(ego_tree::NodeId, Vec<String>)> = dom
        .tree
        .root()
        .descendants()
        .filter_map(|node| {
            let element = node.value().as_element()?;
            let hits: Vec<String> = element
                .attrs()
                .filter(|(name, _)| name.starts_with(from))
                .map(|(name, _)| name.to_string())
                .collect();
            (!hits.is_empty()).then(|| (node.id(), hits))
        })
        .collect();
    for (id, names) in targets {
        for name in names {
            let renamed = format!("{to}{}", &name[from.len()..]);
            dom::rename_attr(&mut dom.tree, id, &name, &renamed);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strip_html_flattens_markup() {
        assert_eq!(strip_html("<b>Jane</b>\n  Doe"), "Jane Doe");
        assert_eq!(strip_html("plain"), "plain");
    }

    #[test]
    fn data_attrs_round_trip() {
        let mut dom = Html::parse_document(
            "<html><body><p data-a=\"1\" data-b=\"2\" id=\"x\">t</p></body></html>",
        );
        rename_data_attrs(&mut dom, "data-", "x-data-");
        let rendered = dom.root_element().html();
        assert!(rendered.contains("x-data-a=\"1\""));
        assert!(!rendered.contains(" data-a"));
        rename_data_attrs(&mut dom, "x-data-", "data-");
        let rendered = dom.root_element().html();
        assert!(rendered.contains("data-a=\"1\""));
        assert!(rendered.contains("data-b=\"2\""));
    }

    #[tokio::test]
    async fn visited_urls_are_skipped() {
        let mut extractor = Extractor::new("http://127.0.0.1:1/page").unwrap();
        extractor.drops.push(Drop::new("http://127.0.0.1:1/page".parse().unwrap()));
        // Both drops share a url; the run fails on the unreachable initial
        // load but must have registered the url exactly once.
        let result = extractor.run().await;
        assert!(result.is_err());
        assert_eq!(extractor.visited.len(), 1);
    }

    use crate::extract::meta::MetaProcessor;
    use crate::extract::readability::ReadabilityProcessor;
    use crate::extract::siteconfig::{SiteConfig, SiteConfigProcessor};
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    struct DoneProbe(Arc<AtomicBool>);

    #[async_trait::async_trait(?Send)]
    impl Processor for DoneProbe {
        fn name(&self) -> &'static str {
            "done-probe"
        }
        async fn process(&mut self, m: &mut ProcessMessage<'_>) {
            if m.step() == Step::Done {
                self.0.store(true, Ordering::SeqCst);
            }
        }
    }

    const PROSE: &str = "A long enough paragraph, with commas, that the scorer counts it as \
        real article prose rather than navigation chrome.";

    #[tokio::test]
    async fn full_pipeline_extracts_and_prefixes() {
        let server = MockServer::start().await;
        let page = format!(
            "<html lang=\"en-US\"><head><title>The Page</title>\
             <meta property=\"og:title\" content=\"An Article\">\
             </head><body>\
             <div class=\"nav\"><a href=\"/elsewhere\">away</a></div>\
             <div class=\"post\"><h1 id=\"intro\"><a href=\"#intro\">Intro</a></h1>\
             <p>{PROSE}</p><p>{PROSE}</p></div>\
             </body></html>"
        );
        Mock::given(method("GET"))
            .and(path("/article"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string(page),
            )
            .mount(&server)
            .await;

        let mut extractor = Extractor::new(&format!("{}/article", server.uri())).unwrap();
        extractor.add_processors([
            Box::new(MetaProcessor) as Box<dyn Processor>,
            Box::new(ReadabilityProcessor::new(true)),
        ]);
        extractor.run().await.unwrap();

        let drop = extractor.root_drop();
        assert_eq!(drop.title, "An Article");
        assert_eq!(drop.lang, "en");

        let body = &drop.body;
        assert!(body.starts_with("<section"), "{body}");
        let token = regex::Regex::new(r#"id="([0-9A-Za-z]{2}\.[0-9A-Za-z]{4})\.intro""#)
            .unwrap()
            .captures(body)
            .unwrap_or_else(|| panic!("no prefixed id in {body}"))[1]
            .to_string();
        assert!(
            body.contains(&format!("href=\"#{token}.intro\"")),
            "{body}"
        );
        assert!(extractor.html().starts_with("<!-- page 1 -->\n"));
    }

    struct EndlessSinglePages;

    impl Respond for EndlessSinglePages {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let n: usize = request
                .url
                .path()
                .trim_start_matches("/p")
                .parse()
                .unwrap_or(0);
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(format!(
                    "<html><body><a class=\"single\" href=\"/p{}\">full</a><p>{PROSE}</p></body></html>",
                    n + 1
                ))
        }
    }

    #[tokio::test]
    async fn endless_single_page_links_hit_the_reset_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/p\d+$"))
            .respond_with(EndlessSinglePages)
            .mount(&server)
            .await;

        let host = server.uri().parse::<url::Url>().unwrap();
        let mut configs: StdHashMap<String, SiteConfig> = StdHashMap::new();
        configs.insert(
            host.host_str().unwrap().to_string(),
            SiteConfig {
                single_page_link_selectors: vec!["a.single".to_string()],
                ..SiteConfig::default()
            },
        );

        let done = Arc::new(AtomicBool::new(false));
        let mut extractor = Extractor::new(&format!("{}/p0", server.uri())).unwrap();
        extractor.add_processors([
            Box::new(SiteConfigProcessor::new(Box::new(configs))) as Box<dyn Processor>,
            Box::new(DoneProbe(done.clone())),
        ]);

        let err = extractor.run().await.unwrap_err();
        assert!(
            matches!(err, ExtractError::Canceled(ref reason) if reason == "too many redirects"),
            "{err:?}"
        );
        assert!(done.load(Ordering::SeqCst), "Done step must still run");
    }

    #[tokio::test]
    async fn next_page_links_chain_drops() {
        let server = MockServer::start().await;
        for n in 1..=2 {
            let next = if n == 1 {
                "<a class=\"next\" href=\"/page2\">next</a>"
            } else {
                ""
            };
            Mock::given(method("GET"))
                .and(path(format!("/page{n}")))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-type", "text/html")
                        .set_body_string(format!(
                            "<html><body><div class=\"post\"><p>page {n}: {PROSE}</p></div>{next}</body></html>"
                        )),
                )
                .mount(&server)
                .await;
        }

        let host = server.uri().parse::<url::Url>().unwrap();
        let mut configs: StdHashMap<String, SiteConfig> = StdHashMap::new();
        configs.insert(
            host.host_str().unwrap().to_string(),
            SiteConfig {
                next_page_link_selectors: vec!["a.next".to_string()],
                ..SiteConfig::default()
            },
        );

        let mut extractor = Extractor::new(&format!("{}/page1", server.uri())).unwrap();
        extractor.add_processors([
            Box::new(SiteConfigProcessor::new(Box::new(configs))) as Box<dyn Processor>,
        ]);
        extractor.run().await.unwrap();

        assert_eq!(extractor.drops().len(), 2);
        assert!(extractor.html().contains("<!-- page 1 -->"));
        assert!(extractor.html().contains("<!-- page 2 -->"));
        assert!(extractor.html().contains("page 2:"));
    }

    #[tokio::test]
    async fn drop_cap_cancels_the_run() {
        struct Flood;
        #[async_trait::async_trait(?Send)]
        impl Processor for Flood {
            fn name(&self) -> &'static str {
                "flood"
            }
            async fn process(&mut self, m: &mut ProcessMessage<'_>) {
                if m.step() == Step::Start {
                    for i in 0..200 {
                        m.add_drop(Drop::new(
                            format!("http://ex.test/{i}").parse().unwrap(),
                        ));
                    }
                }
            }
        }
        let mut extractor = Extractor::new("http://ex.test/").unwrap();
        extractor.add_processors([Box::new(Flood) as Box<dyn Processor>]);
        let err = extractor.run().await.unwrap_err();
        assert!(matches!(err, ExtractError::Canceled(reason) if reason == "too many drops"));
    }
}
