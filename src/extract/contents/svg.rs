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

//! Svg handling.
//!
//! [`SvgInlineProcessor`] turns `<img>` references to external svg files
//! into real inline `<svg>` markup, fetched through the run's client, so
//! vector figures survive as part of the article instead of as one more
//! remote asset. Scripted content is stripped before the markup enters the
//! page. [`apply`] is the size hygiene that runs afterwards: percentage
//! sizes are meaningless outside the source layout and a missing viewBox
//! breaks scaling once they go.

use super::super::process::{ProcessMessage, Processor, Step};
use crate::client::{Client, RequestContext, RequestKind};
use crate::dom;
use crate::format;
use crate::run_warn;
use crate::static_selectors;
use ego_tree::NodeId;
use scraper::Html;
use url::Url;

static_selectors! {
    [
        SVG = "svg"
        IMAGES_WITH_SRC = "img[src]"
    ]
}

/// How many external svg references one page may inline.
const INLINE_LIMIT: usize = 8;

/// Largest svg body worth embedding.
const INLINE_MAX_BYTES: usize = 64 * 1024;

/// Inlines external svg images at the dom step.
pub struct SvgInlineProcessor;

#[async_trait::async_trait(?Send)]
impl Processor for SvgInlineProcessor {
    fn name(&self) -> &'static str {
        "contents/svg-inline"
    }

    async fn process(&mut self, m: &mut ProcessMessage<'_>) {
        if m.step() != Step::Dom {
            return;
        }
        let Some(base) = m.drop().map(|drop| drop.url.clone()) else {
            return;
        };
        let client = m.extractor.client().clone();
        let sink = m.extractor.error_sink().clone();

        let targets: Vec<(NodeId, Url)> = match m.dom() {
            Some(parsed) => collect_targets(parsed, &base),
            None => return,
        };
        if targets.is_empty() {
            return;
        }

        let mut fetched: Vec<(NodeId, String)> = Vec::new();
        for (id, url) in targets {
            match fetch_markup(&client, &url).await {
                Ok(markup) => fetched.push((id, markup)),
                Err(reason) => run_warn!(sink, "svg {url} not inlined: {reason}"),
            }
        }

        if let Some(parsed) = m.dom() {
            for (id, markup) in fetched {
                inline(parsed, id, &markup);
            }
        }
    }
}

/// `<img>` elements whose source resolves to an external `.svg` file.
fn collect_targets(parsed: &Html, base: &Url) -> Vec<(NodeId, Url)> {
    let mut targets = Vec::new();
    for element in parsed.select(&IMAGES_WITH_SRC) {
        if targets.len() == INLINE_LIMIT {
            break;
        }
        let Some(src) = element.attr("src") else { continue };
        let Ok(resolved) = base.join(src.trim()) else { continue };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        if !resolved.path().to_ascii_lowercase().ends_with(".svg") {
            continue;
        }
        targets.push((element.id(), resolved));
    }
    targets
}

async fn fetch_markup(client: &Client, url: &Url) -> Result<String, String> {
    let ctx = RequestContext::new(RequestKind::Image);
    let response = client.get(&ctx, url).await.map_err(|err| err.to_string())?;
    if !response.status.is_success() {
        return Err(format!("unexpected status {}", response.status));
    }
    let declared = response.content_type().map(str::to_owned);
    let body = response.bytes().await.map_err(|err| err.to_string())?;
    if body.len() > INLINE_MAX_BYTES {
        return Err(format!("{} bytes is too large to inline", body.len()));
    }
    let mime = declared
        .as_deref()
        .and_then(format::parse_content_type)
        .unwrap_or_else(|| format::sniff(&body));
    if mime.essence_str() != "image/svg+xml" {
        return Err(format!("not an svg but {mime}"));
    }
    Ok(format::decode_text(&body, Some(&mime)))
}

/// Replaces the referencing `<img>` with the fetched markup. Scripts,
/// foreignObject payloads and inline handlers never cross into the page.
fn inline(parsed: &mut Html, img: NodeId, markup: &str) {
    let mut fragment = Html::parse_fragment(markup);

    let doomed: Vec<NodeId> = fragment
        .tree
        .root()
        .descendants()
        .filter(|node| matches!(dom::tag_name(node), Some("script") | Some("foreignObject")))
        .map(|node| node.id())
        .collect();
    for id in doomed {
        dom::detach(&mut fragment.tree, id);
    }
    let handlers: Vec<(NodeId, Vec<String>)> = fragment
        .tree
        .root()
        .descendants()
        .filter_map(|node| {
            let element = node.value().as_element()?;
            let hits: Vec<String> = element
                .attrs()
                .filter(|(name, _)| name.starts_with("on"))
                .map(|(name, _)| name.to_string())
                .collect();
            (!hits.is_empty()).then(|| (node.id(), hits))
        })
        .collect();
    for (id, names) in handlers {
        for name in names {
            dom::remove_attr(&mut fragment.tree, id, &name);
        }
    }

    let Some(svg) = fragment.select(&SVG).next() else { return };

    // The img's presentation attributes win where the svg has none.
    let carried: Vec<(String, String)> = dom::as_element(parsed, img)
        .map(|el| {
            el.value()
                .attrs()
                .filter(|(name, _)| matches!(*name, "class" | "width" | "height"))
                .filter(|(name, _)| svg.attr(name).is_none())
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let inlined = {
        let Some(mut anchor) = parsed.tree.get_mut(img) else { return };
        let mut new = anchor.insert_before(scraper::Node::Element(svg.value().clone()));
        dom::graft_children(&mut new, *svg);
        new.id()
    };
    for (name, value) in carried {
        dom::set_attr(&mut parsed.tree, inlined, &name, &value);
    }
    dom::detach(&mut parsed.tree, img);
}

/// Size hygiene for inline svg, fetched or native.
pub fn apply(parsed: &mut Html) {
    for id in dom::select_ids(parsed, &SVG) {
        let Some(element) = dom::as_element(parsed, id) else { continue };
        let width = element.attr("width").map(str::to_owned);
        let height = element.attr("height").map(str::to_owned);
        let has_view_box = element.attr("viewBox").is_some() || element.attr("viewbox").is_some();

        let numeric = |value: &Option<String>| {
            value
                .as_deref()
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| *v > 0.0)
        };
        if !has_view_box {
            if let (Some(w), Some(h)) = (numeric(&width), numeric(&height)) {
                dom::set_attr(&mut parsed.tree, id, "viewBox", &format!("0 0 {w} {h}"));
            }
        }
        for (name, value) in [("width", width), ("height", height)] {
            if value.map(|v| v.trim().ends_with('%')).unwrap_or(false) {
                dom::remove_attr(&mut parsed.tree, id, name);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::extract::Extractor;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn percent_sizes_drop_and_viewbox_appears() {
        let mut parsed = Html::parse_document(
            "<html><body>\
             <svg width=\"100%\" height=\"100%\"><circle r=\"1\"></circle></svg>\
             <svg width=\"24\" height=\"24\"><path d=\"M0 0\"></path></svg>\
             </body></html>",
        );
        apply(&mut parsed);
        let body = dom::render_body(&parsed);
        assert!(!body.contains('%'), "{body}");
        assert!(body.contains("viewBox=\"0 0 24 24\""), "{body}");
    }

    #[test]
    fn inline_strips_scripts_and_carries_presentation() {
        let mut parsed = Html::parse_document(
            "<html><body><img src=\"/icon.svg\" class=\"logo\" width=\"24\"><p>t</p></body></html>",
        );
        let img = dom::select_ids(&parsed, &IMAGES_WITH_SRC)[0];
        inline(
            &mut parsed,
            img,
            "<svg viewBox=\"0 0 10 10\"><script>x()</script><circle r=\"4\" onclick=\"y()\"></circle></svg>",
        );
        let body = dom::render_body(&parsed);
        assert!(!body.contains("<img"), "{body}");
        assert!(!body.contains("script"), "{body}");
        assert!(!body.contains("onclick"), "{body}");
        assert!(body.contains("<circle r=\"4\"></circle>"), "{body}");
        assert!(body.contains("class=\"logo\""), "{body}");
        assert!(body.contains("width=\"24\""), "{body}");
    }

    #[test]
    fn only_svg_sources_are_targeted() {
        let parsed = Html::parse_document(
            "<html><body>\
             <img src=\"/a.svg\"><img src=\"/b.png\"><img src=\"c.svg?v=2\">\
             </body></html>",
        );
        let base: Url = "http://ex.test/dir/page".parse().unwrap();
        let targets = collect_targets(&parsed, &base);
        let urls: Vec<String> = targets.iter().map(|(_, url)| url.to_string()).collect();
        assert_eq!(
            urls,
            vec!["http://ex.test/a.svg", "http://ex.test/dir/c.svg?v=2"]
        );
    }

    #[tokio::test]
    async fn external_svg_images_inline_through_the_pipeline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(
                        "<html><body><img src=\"/icon.svg\"><p>text</p></body></html>",
                    ),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/icon.svg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/svg+xml")
                    .set_body_string(
                        "<svg viewBox=\"0 0 10 10\"><circle r=\"4\"></circle></svg>",
                    ),
            )
            .mount(&server)
            .await;

        let mut extractor = Extractor::new(&format!("{}/page", server.uri())).unwrap();
        extractor.add_processors([Box::new(SvgInlineProcessor) as Box<dyn Processor>]);
        extractor.run().await.unwrap();

        let body = &extractor.root_drop().body;
        assert!(!body.contains("<img"), "{body}");
        assert!(body.contains("<svg"), "{body}");
        assert!(body.contains("<circle r=\"4\"></circle>"), "{body}");
    }
}
