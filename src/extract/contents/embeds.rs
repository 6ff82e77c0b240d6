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

//! Converts video embeds into poster links. An archive cannot play an
//! iframe player, but it can keep where the video lives and what it looks
//! like: the link wraps a thumbnail where one is known (the host's poster
//! convention, or the element's own `poster` attribute) and falls back to a
//! text anchor.

use crate::dom;
use crate::static_selectors;
use ego_tree::NodeId;
use scraper::{Html, Node};
use url::Url;

static_selectors! {
    [
        EMBED_FRAMES = "iframe[src], embed[src]"
        POSTERED_VIDEOS = "video[poster]"
        VIDEO_SOURCES = "source[src]"
    ]
}

const VIDEO_HOSTS: [&str; 6] = [
    "youtube.com",
    "youtube-nocookie.com",
    "youtu.be",
    "vimeo.com",
    "dailymotion.com",
    "peertube.tv",
];

fn video_host(url: &Url) -> Option<&'static str> {
    let host = url.host_str()?;
    VIDEO_HOSTS
        .iter()
        .find(|candidate| host == **candidate || host.ends_with(&format!(".{candidate}")))
        .copied()
}

fn youtube_id(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    if host.contains("youtube") {
        return url.path().strip_prefix("/embed/").map(str::to_owned);
    }
    if host == "youtu.be" {
        let id = url.path().trim_start_matches('/');
        return (!id.is_empty()).then(|| id.to_owned());
    }
    None
}

/// The address a viewer would open, derived from the embed url.
fn watch_url(url: &Url) -> String {
    if let Some(id) = youtube_id(url).filter(|_| url.path().starts_with("/embed/")) {
        return format!("https://www.youtube.com/watch?v={id}");
    }
    url.to_string()
}

/// A thumbnail for the embed, where the host has a poster convention.
fn poster_url(url: &Url) -> Option<String> {
    youtube_id(url).map(|id| format!("https://i.ytimg.com/vi/{id}/hqdefault.jpg"))
}

/// Builds the replacement node: an anchor around the poster image, or
/// around the title text when no poster is known.
fn replace_node(parsed: &mut Html, target: NodeId, href: &str, poster: Option<&str>, title: &str) {
    let link = dom::element(
        "a",
        vec![
            ("href".to_string(), href.to_string()),
            ("class".to_string(), "video-embed".to_string()),
        ],
    );
    {
        let Some(mut anchor) = parsed.tree.get_mut(target) else { return };
        let mut link = anchor.insert_before(link);
        match poster {
            Some(poster) => {
                link.append(dom::element(
                    "img",
                    vec![
                        ("src".to_string(), poster.to_string()),
                        ("alt".to_string(), title.to_string()),
                    ],
                ));
            }
            None => {
                link.append(Node::Text(scraper::node::Text {
                    text: title.into(),
                }));
            }
        }
    }
    dom::detach(&mut parsed.tree, target);
}

pub fn apply(parsed: &mut Html) {
    for id in dom::select_ids(parsed, &EMBED_FRAMES) {
        let Some(element) = dom::as_element(parsed, id) else { continue };
        let Some(src) = element.attr("src") else { continue };
        let Ok(url) = src.parse::<Url>() else { continue };
        let Some(host) = video_host(&url) else { continue };

        let target = watch_url(&url);
        let title = element
            .attr("title")
            .map(str::to_owned)
            .unwrap_or_else(|| format!("Video on {host}"));
        let poster = poster_url(&url);
        replace_node(parsed, id, &target, poster.as_deref(), &title);
    }

    // A `<video poster=...>` already names its own thumbnail.
    for id in dom::select_ids(parsed, &POSTERED_VIDEOS) {
        let Some(element) = dom::as_element(parsed, id) else { continue };
        let Some(poster) = element.attr("poster").map(str::to_owned) else { continue };
        let source = element
            .attr("src")
            .map(str::to_owned)
            .or_else(|| {
                element
                    .select(&VIDEO_SOURCES)
                    .next()
                    .and_then(|source| source.attr("src").map(str::to_owned))
            });
        let title = element.attr("title").unwrap_or("Video").to_owned();
        match source {
            Some(source) => replace_node(parsed, id, &source, Some(&poster), &title),
            None => {
                // No address to link; the poster image alone has to do.
                {
                    let Some(mut anchor) = parsed.tree.get_mut(id) else { continue };
                    anchor.insert_before(dom::element(
                        "img",
                        vec![("src".to_string(), poster), ("alt".to_string(), title)],
                    ));
                }
                dom::detach(&mut parsed.tree, id);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn youtube_embeds_become_poster_links() {
        let mut parsed = Html::parse_document(
            "<html><body><iframe src=\"https://www.youtube.com/embed/abc123\" title=\"The clip\"></iframe></body></html>",
        );
        apply(&mut parsed);
        let body = dom::render_body(&parsed);
        assert!(!body.contains("iframe"));
        assert!(
            body.contains(
                "<a href=\"https://www.youtube.com/watch?v=abc123\" class=\"video-embed\">"
            ),
            "{body}"
        );
        assert!(
            body.contains("<img src=\"https://i.ytimg.com/vi/abc123/hqdefault.jpg\" alt=\"The clip\">"),
            "{body}"
        );
    }

    #[test]
    fn unknown_hosts_fall_back_to_text_anchors() {
        let mut parsed = Html::parse_document(
            "<html><body><iframe src=\"https://player.vimeo.com/video/9\" title=\"V\"></iframe></body></html>",
        );
        apply(&mut parsed);
        let body = dom::render_body(&parsed);
        assert!(!body.contains("iframe"));
        assert!(
            body.contains("<a href=\"https://player.vimeo.com/video/9\" class=\"video-embed\">V</a>"),
            "{body}"
        );
    }

    #[test]
    fn postered_videos_become_poster_links() {
        let mut parsed = Html::parse_document(
            "<html><body><video poster=\"/shot.jpg\"><source src=\"/clip.mp4\"></video></body></html>",
        );
        apply(&mut parsed);
        let body = dom::render_body(&parsed);
        assert!(!body.contains("<video"), "{body}");
        assert!(
            body.contains("<a href=\"/clip.mp4\" class=\"video-embed\"><img src=\"/shot.jpg\" alt=\"Video\"></a>"),
            "{body}"
        );
    }

    #[test]
    fn ordinary_iframes_stay() {
        let mut parsed = Html::parse_document(
            "<html><body><iframe src=\"https://maps.example.com/x\"></iframe></body></html>",
        );
        apply(&mut parsed);
        assert!(dom::render_body(&parsed).contains("iframe"));
    }
}
