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

//! The best-image pass.
//!
//! A `<picture>` offers several renditions of one image; an archive wants
//! exactly one. Every candidate gets a metadata probe (no body retained)
//! and the widest one wins, ties broken by format preference. The element
//! collapses to a plain `<img>` pointing at the winner, which the resource
//! walk then downloads like any other image.

use super::fetch::FetchError;
use super::resource::Resource;
use super::{srcset, Archiver};
use crate::client::RequestKind;
use crate::dom;
use crate::format;
use crate::static_selectors;
use ego_tree::NodeId;
use futures::StreamExt;
use scraper::Html;
use url::Url;

static_selectors! {
    [
        PICTURE = "picture"
        PICTURE_SOURCE = "source"
        PICTURE_IMG = "img"
        IMG_WITH_SRCSET = "img[srcset]"
    ]
}

/// Images above this pixel area are rejected outright.
const MAX_AREA: u64 = 30_000_000;

pub async fn process(archiver: &Archiver, dom: &mut Html) -> Result<(), FetchError> {
    for picture in dom::select_ids(dom, &PICTURE) {
        let Some(candidates) = picture_candidates(dom, picture) else {
            continue;
        };
        let Some(best) = probe(archiver, &candidates).await else {
            continue;
        };
        let attrs = inner_img_attrs(dom, picture);
        replace_with_img(dom, picture, &best, attrs);
    }

    for img in dom::select_ids(dom, &IMG_WITH_SRCSET) {
        let Some(element) = dom::as_element(dom, img) else { continue };
        let mut candidates: Vec<String> = Vec::new();
        if let Some(src) = element.attr("src") {
            candidates.push(src.to_string());
        }
        if let Some(set) = element.attr("srcset") {
            candidates.extend(srcset::parse(set).into_iter().map(|c| c.url));
        }
        let Some(best) = probe(archiver, &candidates).await else {
            continue;
        };
        let preset = element.attr("width").is_some() && element.attr("height").is_some();
        dom::set_attr(&mut dom.tree, img, "src", best.url.as_str());
        dom::remove_attr(&mut dom.tree, img, "srcset");
        if !(best.is_svg() && preset) {
            dom::set_attr(&mut dom.tree, img, "width", &best.width.to_string());
            dom::set_attr(&mut dom.tree, img, "height", &best.height.to_string());
        }
    }
    Ok(())
}

/// Candidate urls of one `<picture>`: every `<source>` srcset entry whose
/// declared type we can keep, plus the fallback `<img>`.
fn picture_candidates(dom: &Html, picture: NodeId) -> Option<Vec<String>> {
    let element = dom::as_element(dom, picture)?;
    let mut candidates = Vec::new();
    for source in element.select(&PICTURE_SOURCE) {
        if let Some(kind) = source.attr("type") {
            if !format::is_supported_image(kind.trim()) {
                continue;
            }
        }
        if let Some(set) = source.attr("srcset") {
            candidates.extend(srcset::parse(set).into_iter().map(|c| c.url));
        }
    }
    if let Some(img) = element.select(&PICTURE_IMG).next() {
        if let Some(src) = img.attr("src") {
            candidates.push(src.to_string());
        }
        if let Some(set) = img.attr("srcset") {
            candidates.extend(srcset::parse(set).into_iter().map(|c| c.url));
        }
    }
    (!candidates.is_empty()).then_some(candidates)
}

fn inner_img_attrs(dom: &Html, picture: NodeId) -> Vec<(String, String)> {
    dom::as_element(dom, picture)
        .and_then(|el| el.select(&PICTURE_IMG).next())
        .map(|img| {
            img.value()
                .attrs()
                .filter(|(name, _)| {
                    !matches!(*name, "src" | "srcset" | "sizes" | "width" | "height")
                })
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn replace_with_img(dom: &mut Html, picture: NodeId, best: &Resource, attrs: Vec<(String, String)>) {
    let mut attrs = attrs;
    attrs.insert(0, ("src".to_string(), best.url.to_string()));
    if !best.is_svg() {
        attrs.push(("width".to_string(), best.width.to_string()));
        attrs.push(("height".to_string(), best.height.to_string()));
    }
    let img = dom::element("img", attrs);
    {
        let Some(mut node) = dom.tree.get_mut(picture) else { return };
        node.insert_before(img);
    }
    dom::detach(&mut dom.tree, picture);
}

/// Probes all candidates and picks the winner.
async fn probe(archiver: &Archiver, candidates: &[String]) -> Option<Resource> {
    let ctx = archiver.request_context(RequestKind::Image);
    let mut targets: Vec<Url> = Vec::new();
    for candidate in candidates {
        if let Ok(url) = candidate.trim().parse::<Url>() {
            if matches!(url.scheme(), "http" | "https" | "data") && !targets.contains(&url) {
                targets.push(url);
            }
        }
    }

    let probed: Vec<Option<Resource>> = futures::stream::iter(targets)
        .map(|target| {
            let ctx = ctx.clone();
            async move {
                match archiver.fetcher().fetch_info(archiver.collector(), &ctx, &target).await {
                    Ok(resource) => Some(resource),
                    Err(err) => {
                        log::debug!("image probe of {target} failed: {err}");
                        None
                    }
                }
            }
        })
        .buffer_unordered(4)
        .collect()
        .await;

    choose(probed.into_iter().flatten().collect())
}

/// Widest first, format preference as tie breaker. Svg passes the area
/// gate unconditionally.
fn choose(mut resources: Vec<Resource>) -> Option<Resource> {
    resources.retain(|resource| {
        if !resource.is_image() {
            return false;
        }
        if resource.is_svg() {
            return true;
        }
        resource.area() > 0 && resource.area() <= MAX_AREA
    });
    resources.sort_by(|a, b| {
        b.width.cmp(&a.width).then_with(|| {
            format::image_priority(a.content_type.essence_str())
                .cmp(&format::image_priority(b.content_type.essence_str()))
        })
    });
    resources.into_iter().next()
}

#[cfg(test)]
mod test {
    use super::*;

    fn image(url: &str, essence: &str, width: u32, height: u32) -> Resource {
        let mut resource = Resource::new(&url.parse().unwrap());
        resource.content_type = essence.parse().unwrap();
        resource.width = width;
        resource.height = height;
        resource
    }

    #[test]
    fn wider_wins() {
        let chosen = choose(vec![
            image("http://t/a.jpg", "image/jpeg", 800, 600),
            image("http://t/b.webp", "image/webp", 400, 300),
        ])
        .unwrap();
        assert_eq!(chosen.url.as_str(), "http://t/a.jpg");
    }

    #[test]
    fn jpeg_beats_webp_at_equal_width() {
        let chosen = choose(vec![
            image("http://t/b.webp", "image/webp", 1600, 900),
            image("http://t/a.jpg", "image/jpeg", 1600, 900),
        ])
        .unwrap();
        assert_eq!(chosen.url.as_str(), "http://t/a.jpg");
    }

    #[test]
    fn unknown_dimensions_and_monsters_are_rejected() {
        assert!(choose(vec![image("http://t/a.jpg", "image/jpeg", 0, 0)]).is_none());
        assert!(choose(vec![image("http://t/a.jpg", "image/jpeg", 10_000, 10_000)]).is_none());
    }

    #[test]
    fn svg_survives_without_dimensions() {
        let chosen = choose(vec![
            image("http://t/a.svg", "image/svg+xml", 0, 0),
            image("http://t/b.jpg", "image/jpeg", 0, 0),
        ])
        .unwrap();
        assert!(chosen.is_svg());
    }

    #[test]
    fn picture_candidates_respect_source_type() {
        let dom = Html::parse_document(
            "<html><body><picture>\
             <source srcset=\"/big.webp\" type=\"image/webp\">\
             <source srcset=\"/doc.pdf\" type=\"application/pdf\">\
             <img src=\"/small.jpg\">\
             </picture></body></html>",
        );
        let picture = dom::select_ids(&dom, &PICTURE)[0];
        let candidates = picture_candidates(&dom, picture).unwrap();
        assert_eq!(candidates, vec!["/big.webp", "/small.jpg"]);
    }
}
