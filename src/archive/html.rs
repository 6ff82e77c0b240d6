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

//! The html processor of the archiver.
//!
//! Runs a fixed sequence of preparation passes over the parsed document
//! (charset, csp, flag stripping, noscript lifting, lazy image repair, url
//! resolution), then fans out one fetch per discovered resource reference
//! and rewrites the references to local names. Mutation follows the
//! gather/mutate split of [`crate::dom`]: node ids are collected first,
//! edits applied afterwards, network work happens in between on plain data.

use super::collector::INDEX_NAME;
use super::fetch::FetchError;
use super::flags::ArchiveFlags;
use super::picture;
use super::resource::Resource;
use super::{css, relative_name, srcset, Archiver};
use crate::client::RequestKind;
use crate::dom;
use crate::static_selectors;
use ego_tree::NodeId;
use futures::StreamExt;
use html5ever::tendril::StrTendril;
use scraper::node::Text;
use scraper::{Html, Node};
use std::sync::LazyLock;
use url::Url;

static_selectors! {
    pub(crate) [
        BASE = "base[href]"
        HEAD = "head"
        META_CHARSET = "meta[charset], meta[http-equiv=\"Content-Type\" i]"
        META_CSP = "meta[http-equiv=\"Content-Security-Policy\" i]"
        SCRIPTS = "script"
        STYLES = "style"
        STYLESHEET_LINKS = "link[rel=\"stylesheet\"]"
        ICON_LINKS = "link[rel~=\"icon\"], link[rel~=\"apple-touch-icon\"]"
        EMBEDS = "object, embed, iframe"
        IMAGES = "img, picture"
        MEDIA = "video, audio"
        NOSCRIPT = "noscript"
        NOSCRIPT_DIV = "div[data-x-noscript]"
        LINK_HINTS = "link[rel=\"preload\"], link[rel=\"preconnect\"], link[rel=\"dns-prefetch\"]"
        INTEGRITY = "link[integrity], script[integrity]"
        LAZY_SOURCES = "img, source"
        FIGURES = "figure"
        IMG = "img"
        WALK_STYLE_ATTR = "[style]"
        WALK_LINKS = "link[rel=\"stylesheet\"], link[rel~=\"icon\"], link[rel~=\"apple-touch-icon\"]"
        WALK_SCRIPTS = "script[src]"
        WALK_OBJECTS = "object[data]"
        WALK_EMBED_SRC = "embed[src], iframe[src]"
        WALK_MEDIA = "img, source, video, audio"
        WALK_USE = "use[href]"
    ]
}

static IMAGE_URL: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)^\S+\.(jpe?g|png|gif|webp|avif|svg)(\?\S*)?$").unwrap()
});

/// Longest data uri that still counts as a lazy-loading placeholder.
const PLACEHOLDER_LIMIT: usize = 133;

/// Runs the whole html pass for one document.
pub async fn process(archiver: &Archiver, dom: &mut Html, url: &Url) -> Result<(), FetchError> {
    let flags = archiver.flags();
    let base = read_base(dom, url);

    normalize_charset(dom);
    inject_csp(dom, flags);
    strip_flagged(dom, flags);
    lift_noscript(dom);
    remove_link_hints(dom);
    remove_comments(dom);
    fix_lazy_images(dom);
    resolve_urls(dom, &base, url);
    remove_integrity(dom);

    if flags.contains(ArchiveFlags::BEST_IMAGE) {
        picture::process(archiver, dom).await?;
    }

    walk_resources(archiver, dom, &base).await?;

    revert_noscript(dom, flags);
    strip_data_attributes(dom, flags);
    mark_images_lazy(dom);
    Ok(())
}

/// The effective base url, honouring the first `<base href>`. The base
/// elements themselves are dropped since every reference ends up resolved.
fn read_base(dom: &mut Html, url: &Url) -> Url {
    let mut base = url.clone();
    let ids = dom::select_ids(dom, &BASE);
    if let Some(first) = ids.first() {
        if let Some(href) = dom::as_element(dom, *first).and_then(|el| el.attr("href").map(str::to_owned)) {
            if let Ok(resolved) = url.join(&href) {
                base = resolved;
            }
        }
    }
    for id in ids {
        dom::detach(&mut dom.tree, id);
    }
    base
}

fn normalize_charset(dom: &mut Html) {
    for id in dom::select_ids(dom, &META_CHARSET) {
        dom::detach(&mut dom.tree, id);
    }
    prepend_to_head(dom, dom::element("meta", vec![("charset".into(), "utf-8".into())]));
}

fn csp_value(flags: ArchiveFlags) -> String {
    let mut directives = vec![
        "default-src 'self' 'unsafe-inline' data:".to_string(),
        "connect-src 'none'".to_string(),
    ];
    if !flags.contains(ArchiveFlags::JS) {
        directives.push("script-src 'none'".to_string());
    }
    if !flags.contains(ArchiveFlags::CSS) {
        directives.push("style-src 'none'".to_string());
    }
    if !flags.contains(ArchiveFlags::EMBEDS) {
        directives.push("frame-src 'none'".to_string());
        directives.push("child-src 'none'".to_string());
    }
    if !flags.contains(ArchiveFlags::IMAGES) {
        directives.push("img-src 'none'".to_string());
    }
    if !flags.contains(ArchiveFlags::MEDIA) {
        directives.push("media-src 'none'".to_string());
    }
    directives.join("; ")
}

fn inject_csp(dom: &mut Html, flags: ArchiveFlags) {
    for id in dom::select_ids(dom, &META_CSP) {
        dom::detach(&mut dom.tree, id);
    }
    prepend_to_head(
        dom,
        dom::element(
            "meta",
            vec![
                ("http-equiv".into(), "Content-Security-Policy".into()),
                ("content".into(), csp_value(flags)),
            ],
        ),
    );
}

fn prepend_to_head(dom: &mut Html, node: Node) {
    let Some(head) = dom::select_ids(dom, &HEAD).into_iter().next() else {
        return;
    };
    if let Some(mut head) = dom.tree.get_mut(head) {
        head.prepend(node);
    }
}

fn strip_flagged(dom: &mut Html, flags: ArchiveFlags) {
    if !flags.contains(ArchiveFlags::JS) {
        for id in dom::select_ids(dom, &SCRIPTS) {
            dom::detach(&mut dom.tree, id);
        }
        let everything = all_elements(dom);
        for (id, attrs) in everything {
            for (name, value) in attrs {
                if name.starts_with("on") {
                    dom::remove_attr(&mut dom.tree, id, &name);
                } else if name == "href"
                    && value.trim_start().to_ascii_lowercase().starts_with("javascript:")
                {
                    dom::remove_attr(&mut dom.tree, id, "href");
                }
            }
        }
    }
    if !flags.contains(ArchiveFlags::CSS) {
        for id in dom::select_ids(dom, &STYLES) {
            dom::detach(&mut dom.tree, id);
        }
        for id in dom::select_ids(dom, &STYLESHEET_LINKS) {
            dom::detach(&mut dom.tree, id);
        }
        for (id, attrs) in all_elements(dom) {
            if attrs.iter().any(|(name, _)| name == "style") {
                dom::remove_attr(&mut dom.tree, id, "style");
            }
        }
    }
    if !flags.contains(ArchiveFlags::EMBEDS) {
        for id in dom::select_ids(dom, &EMBEDS) {
            dom::detach(&mut dom.tree, id);
        }
    }
    if !flags.contains(ArchiveFlags::IMAGES) {
        for id in dom::select_ids(dom, &IMAGES) {
            dom::detach(&mut dom.tree, id);
        }
        for id in dom::select_ids(dom, &ICON_LINKS) {
            dom::detach(&mut dom.tree, id);
        }
    }
    if !flags.contains(ArchiveFlags::MEDIA) {
        for id in dom::select_ids(dom, &MEDIA) {
            dom::detach(&mut dom.tree, id);
        }
    }
}

/// Replaces `<noscript>` with a marked `<div>` holding the parsed content,
/// so images hidden behind noscript take part in the archive.
fn lift_noscript(dom: &mut Html) {
    for id in dom::select_ids(dom, &NOSCRIPT) {
        let Some(node) = dom.tree.get(id) else { continue };
        let markup = dom::text_content(&node);
        let fragment = Html::parse_fragment(&markup);
        let div = dom::element(
            "div",
            vec![("data-x-noscript".into(), "true".into())],
        );
        {
            let Some(mut anchor) = dom.tree.get_mut(id) else { continue };
            let mut div = anchor.insert_before(div);
            dom::graft_fragment(&mut div, &fragment);
        }
        dom::detach(&mut dom.tree, id);
    }
}

/// Turns the lifted divs back into `<noscript>`. With scripts stripped the
/// lift stays one-way and only the marker goes away.
fn revert_noscript(dom: &mut Html, flags: ArchiveFlags) {
    for id in dom::select_ids(dom, &NOSCRIPT_DIV) {
        if flags.contains(ArchiveFlags::JS) {
            dom::rename_element(&mut dom.tree, id, "noscript");
        }
        dom::remove_attr(&mut dom.tree, id, "data-x-noscript");
    }
}

fn remove_link_hints(dom: &mut Html) {
    for id in dom::select_ids(dom, &LINK_HINTS) {
        dom::detach(&mut dom.tree, id);
    }
}

fn remove_comments(dom: &mut Html) {
    let ids: Vec<NodeId> = dom
        .tree
        .root()
        .descendants()
        .filter(|node| node.value().is_comment())
        .map(|node| node.id())
        .collect();
    for id in ids {
        dom::detach(&mut dom.tree, id);
    }
}

fn remove_integrity(dom: &mut Html) {
    for id in dom::select_ids(dom, &INTEGRITY) {
        dom::remove_attr(&mut dom.tree, id, "integrity");
    }
}

fn looks_like_image_url(value: &str) -> bool {
    IMAGE_URL.is_match(value.trim())
}

fn looks_like_srcset(value: &str) -> bool {
    srcset::parse(value)
        .iter()
        .any(|candidate| looks_like_image_url(&candidate.url))
        && value.contains(|c: char| c == ',' || c.is_whitespace())
}

fn is_placeholder(value: &str) -> bool {
    value.starts_with("data:image/")
        && !value.starts_with("data:image/svg")
        && value.len() < PLACEHOLDER_LIMIT
}

/// Repairs lazy-loading markup: drops tiny base64 placeholders when a real
/// image hides in another attribute, promotes that attribute on `lazy`
/// classed elements, and gives imageless figures an `<img>`.
fn fix_lazy_images(dom: &mut Html) {
    for id in dom::select_ids(dom, &LAZY_SOURCES) {
        let Some(el) = dom::as_element(dom, id) else { continue };
        let attrs: Vec<(String, String)> = el
            .value()
            .attrs()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        let has_hidden_image = attrs.iter().any(|(name, value)| {
            name != "src" && name != "srcset" && (looks_like_image_url(value) || looks_like_srcset(value))
        });
        if !has_hidden_image {
            continue;
        }
        for attr in ["src", "srcset"] {
            if let Some((_, value)) = attrs.iter().find(|(name, _)| name == attr) {
                if is_placeholder(value) {
                    dom::remove_attr(&mut dom.tree, id, attr);
                }
            }
        }
    }

    for (id, attrs) in all_elements(dom) {
        let lazy_class = attrs
            .iter()
            .any(|(name, value)| name == "class" && value.to_ascii_lowercase().contains("lazy"));
        if !lazy_class {
            continue;
        }
        let has_src = attrs.iter().any(|(name, _)| name == "src" || name == "srcset");
        if has_src {
            continue;
        }
        for (name, value) in &attrs {
            if name == "class" {
                continue;
            }
            if looks_like_srcset(value) {
                dom::set_attr(&mut dom.tree, id, "srcset", value);
                break;
            }
            if looks_like_image_url(value) {
                dom::set_attr(&mut dom.tree, id, "src", value);
                break;
            }
        }
    }

    for id in dom::select_ids(dom, &FIGURES) {
        let Some(el) = dom::as_element(dom, id) else { continue };
        let has_image = el
            .descendants()
            .filter_map(|node| dom::tag_name(&node))
            .any(|tag| tag == "img" || tag == "picture");
        if has_image {
            continue;
        }
        let source = el
            .value()
            .attrs()
            .find(|(_, value)| looks_like_image_url(value))
            .map(|(_, value)| value.to_string());
        if let Some(source) = source {
            if let Some(mut figure) = dom.tree.get_mut(id) {
                figure.append(dom::element("img", vec![("src".into(), source)]));
            }
        }
    }
}

/// Makes every reference absolute against the effective base and shortens
/// same-document links to bare fragments.
fn resolve_urls(dom: &mut Html, base: &Url, doc_url: &Url) {
    let doc = super::resource::canonical_url(doc_url);
    for (id, attrs) in all_elements(dom) {
        for (name, value) in &attrs {
            match name.as_str() {
                "href" | "src" | "poster" | "data" => {
                    if value.starts_with('#') {
                        continue;
                    }
                    let Ok(resolved) = base.join(value) else { continue };
                    if name == "href" {
                        let mut same_doc = resolved.clone();
                        same_doc.set_fragment(None);
                        if same_doc == doc {
                            if let Some(fragment) = resolved.fragment() {
                                dom::set_attr(&mut dom.tree, id, "href", &format!("#{fragment}"));
                                continue;
                            }
                        }
                    }
                    dom::set_attr(&mut dom.tree, id, name, resolved.as_str());
                }
                "srcset" => {
                    let rewritten = srcset::map_urls(value, |entry| {
                        base.join(entry).map(|u| u.to_string()).ok()
                    });
                    dom::set_attr(&mut dom.tree, id, "srcset", &rewritten);
                }
                _ => {}
            }
        }
    }
}

fn strip_data_attributes(dom: &mut Html, flags: ArchiveFlags) {
    if flags.contains(ArchiveFlags::DATA_ATTRIBUTES) {
        return;
    }
    for (id, attrs) in all_elements(dom) {
        for (name, _) in attrs {
            if name.starts_with("data-") {
                dom::remove_attr(&mut dom.tree, id, &name);
            }
        }
    }
}

fn mark_images_lazy(dom: &mut Html) {
    for id in dom::select_ids(dom, &IMG) {
        dom::set_first_attr(&mut dom.tree, id, "loading", "lazy");
    }
}

fn all_elements(dom: &Html) -> Vec<(NodeId, Vec<(String, String)>)> {
    dom.tree
        .root()
        .descendants()
        .filter_map(|node| {
            let element = node.value().as_element()?;
            let attrs = element
                .attrs()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect();
            Some((node.id(), attrs))
        })
        .collect()
}

enum Job {
    InlineStyle { node: NodeId, css: String },
    StyleText { node: NodeId, css: String },
    Fetch { node: NodeId, attr: &'static str, kind: RequestKind, url: String },
    SrcSet { node: NodeId, value: String },
}

enum Edit {
    Attr { node: NodeId, name: String, value: String },
    CssText { node: NodeId, css: String },
}

fn attr_of(dom: &Html, id: NodeId, name: &str) -> Option<String> {
    dom::as_element(dom, id)?.attr(name).map(str::to_owned)
}

fn collect_jobs(dom: &Html, flags: ArchiveFlags) -> Vec<Job> {
    let mut jobs = Vec::new();

    if flags.contains(ArchiveFlags::CSS) {
        for id in dom::select_ids(dom, &WALK_STYLE_ATTR) {
            if let Some(css) = attr_of(dom, id, "style").filter(|css| !css.trim().is_empty()) {
                jobs.push(Job::InlineStyle { node: id, css });
            }
        }
        for id in dom::select_ids(dom, &STYLES) {
            let Some(node) = dom.tree.get(id) else { continue };
            let css = dom::text_content(&node);
            if !css.trim().is_empty() {
                jobs.push(Job::StyleText { node: id, css });
            }
        }
    }
    for id in dom::select_ids(dom, &WALK_LINKS) {
        if let Some(url) = attr_of(dom, id, "href") {
            jobs.push(Job::Fetch { node: id, attr: "href", kind: RequestKind::Resource, url });
        }
    }
    for id in dom::select_ids(dom, &WALK_SCRIPTS) {
        if let Some(url) = attr_of(dom, id, "src") {
            jobs.push(Job::Fetch { node: id, attr: "src", kind: RequestKind::Resource, url });
        }
    }
    for id in dom::select_ids(dom, &WALK_OBJECTS) {
        if let Some(url) = attr_of(dom, id, "data") {
            jobs.push(Job::Fetch { node: id, attr: "data", kind: RequestKind::Resource, url });
        }
    }
    for id in dom::select_ids(dom, &WALK_EMBED_SRC) {
        if let Some(url) = attr_of(dom, id, "src") {
            jobs.push(Job::Fetch { node: id, attr: "src", kind: RequestKind::Resource, url });
        }
    }
    for id in dom::select_ids(dom, &WALK_MEDIA) {
        if let Some(url) = attr_of(dom, id, "src") {
            jobs.push(Job::Fetch { node: id, attr: "src", kind: RequestKind::Image, url });
        }
        if let Some(url) = attr_of(dom, id, "poster") {
            jobs.push(Job::Fetch { node: id, attr: "poster", kind: RequestKind::Image, url });
        }
        if let Some(value) = attr_of(dom, id, "srcset") {
            jobs.push(Job::SrcSet { node: id, value });
        }
    }
    for id in dom::select_ids(dom, &WALK_USE) {
        if let Some(url) = attr_of(dom, id, "href") {
            jobs.push(Job::Fetch { node: id, attr: "href", kind: RequestKind::Resource, url });
        }
    }
    jobs
}

/// Whether a reference is worth a network round trip at all.
fn archivable(url: &str) -> Option<Url> {
    let trimmed = url.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let parsed: Url = trimmed.parse().ok()?;
    matches!(parsed.scheme(), "http" | "https" | "data").then_some(parsed)
}

/// The string a rewritten reference receives: the inlined `data:` uri in
/// single-file mode, the archive-relative name otherwise.
fn local_ref(resource: &Resource) -> String {
    match &resource.contents {
        Some(contents) => String::from_utf8_lossy(contents).into_owned(),
        None => relative_name(INDEX_NAME, &resource.name),
    }
}

fn is_fatal(err: &FetchError) -> bool {
    match err {
        FetchError::Canceled | FetchError::Io(_) => true,
        FetchError::Shared(inner) => is_fatal(inner),
        _ => false,
    }
}

async fn run_job(archiver: &Archiver, job: Job, base: &Url) -> Result<Vec<Edit>, FetchError> {
    match job {
        Job::InlineStyle { node, css: style } => {
            let rewritten = css::process(archiver, &style, base, INDEX_NAME).await;
            Ok(vec![Edit::Attr { node, name: "style".into(), value: rewritten }])
        }
        Job::StyleText { node, css: style } => {
            let rewritten = css::process(archiver, &style, base, INDEX_NAME).await;
            Ok(vec![Edit::CssText { node, css: rewritten }])
        }
        Job::Fetch { node, attr, kind, url } => {
            let Some(target) = archivable(&url) else { return Ok(Vec::new()) };
            let ctx = archiver.request_context(kind);
            match archiver.process_url(&ctx, &target).await {
                Ok(resource) => Ok(vec![Edit::Attr {
                    node,
                    name: attr.to_string(),
                    value: local_ref(&resource),
                }]),
                Err(err) if is_fatal(&err) => Err(err),
                Err(err) => {
                    crate::run_warn!(archiver.errors(), "resource {target} not archived: {err}");
                    Ok(Vec::new())
                }
            }
        }
        Job::SrcSet { node, value } => {
            let ctx = archiver.request_context(RequestKind::Image);
            let mut rewritten: Vec<srcset::Candidate> = Vec::new();
            for mut candidate in srcset::parse(&value) {
                if let Some(target) = archivable(&candidate.url) {
                    match archiver.process_url(&ctx, &target).await {
                        Ok(resource) => candidate.url = local_ref(&resource),
                        Err(err) if is_fatal(&err) => return Err(err),
                        Err(err) => {
                            crate::run_warn!(
                                archiver.errors(),
                                "srcset entry {target} not archived: {err}"
                            );
                        }
                    }
                }
                rewritten.push(candidate);
            }
            Ok(vec![Edit::Attr {
                node,
                name: "srcset".into(),
                value: srcset::render(&rewritten),
            }])
        }
    }
}

async fn walk_resources(archiver: &Archiver, dom: &mut Html, base: &Url) -> Result<(), FetchError> {
    let jobs = collect_jobs(dom, archiver.flags());

    let mut edits = Vec::new();
    {
        let mut stream = futures::stream::iter(
            jobs.into_iter().map(|job| run_job(archiver, job, base)),
        )
        .buffer_unordered(16);
        while let Some(result) = stream.next().await {
            match result {
                Ok(batch) => edits.extend(batch),
                Err(err) => {
                    // First hard failure stops the walk; pending sibling
                    // fetches observe the token.
                    archiver.cancel_token().cancel();
                    return Err(err);
                }
            }
        }
    }

    for edit in edits {
        match edit {
            Edit::Attr { node, name, value } => dom::set_attr(&mut dom.tree, node, &name, &value),
            Edit::CssText { node, css } => {
                loop {
                    let Some(child) = dom.tree.get(node).and_then(|n| n.first_child()).map(|c| c.id()) else {
                        break;
                    };
                    dom::detach(&mut dom.tree, child);
                }
                if let Some(mut style) = dom.tree.get_mut(node) {
                    style.append(Node::Text(Text {
                        text: StrTendril::from(css.as_str()),
                    }));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn doc(body: &str) -> Html {
        Html::parse_document(&format!("<html><head></head><body>{body}</body></html>"))
    }

    #[test]
    fn csp_depends_on_flags() {
        let value = csp_value(ArchiveFlags::default());
        assert!(value.contains("script-src 'none'"));
        assert!(value.contains("style-src 'none'"));
        assert!(!value.contains("img-src 'none'"));
        let value = csp_value(ArchiveFlags::all());
        assert!(!value.contains("script-src 'none'"));
    }

    #[test]
    fn exactly_one_csp_meta_after_injection() {
        let mut dom = Html::parse_document(
            "<html><head><meta http-equiv=\"Content-Security-Policy\" content=\"default-src *\"></head><body></body></html>",
        );
        inject_csp(&mut dom, ArchiveFlags::default());
        let rendered = dom.root_element().html();
        assert_eq!(rendered.matches("Content-Security-Policy").count(), 1);
        assert!(rendered.contains("connect-src 'none'"));
    }

    #[test]
    fn charset_is_forced_to_utf8() {
        let mut dom = Html::parse_document(
            "<html><head><meta charset=\"latin-1\"></head><body></body></html>",
        );
        normalize_charset(&mut dom);
        let rendered = dom.root_element().html();
        assert_eq!(rendered.matches("<meta charset").count(), 1);
        assert!(rendered.contains("<meta charset=\"utf-8\">"));
    }

    #[test]
    fn scripts_and_handlers_go_away_without_js() {
        let mut dom = doc(
            "<script>evil()</script><p onclick=\"x()\">t</p><a href=\"javascript:void(0)\">l</a>",
        );
        strip_flagged(&mut dom, ArchiveFlags::default());
        let rendered = dom.root_element().html();
        assert!(!rendered.contains("<script"));
        assert!(!rendered.contains("onclick"));
        assert!(!rendered.contains("javascript:"));
    }

    #[test]
    fn noscript_content_is_lifted_and_marker_cleared() {
        let mut dom = doc("<noscript>&lt;img src=\"/real.png\"&gt;</noscript>");
        lift_noscript(&mut dom);
        assert!(dom.root_element().html().contains("data-x-noscript"));
        assert!(dom.root_element().html().contains("<img src=\"/real.png\">"));
        revert_noscript(&mut dom, ArchiveFlags::default());
        let rendered = dom.root_element().html();
        assert!(!rendered.contains("data-x-noscript"));
        assert!(!rendered.contains("<noscript>"));
    }

    #[test]
    fn noscript_round_trips_with_js_enabled() {
        let mut dom = doc("<noscript>&lt;b&gt;x&lt;/b&gt;</noscript>");
        lift_noscript(&mut dom);
        revert_noscript(&mut dom, ArchiveFlags::default() | ArchiveFlags::JS);
        assert!(dom.root_element().html().contains("<noscript><b>x</b></noscript>"));
    }

    #[test]
    fn comments_are_removed_recursively() {
        let mut dom = doc("<div><!-- a --><p>keep<!-- b --></p></div>");
        remove_comments(&mut dom);
        assert!(!dom.root_element().html().contains("<!--"));
    }

    #[test]
    fn urls_resolve_against_base_tag() {
        let url: Url = "http://ex.test/dir/page".parse().unwrap();
        let mut dom = Html::parse_document(
            "<html><head><base href=\"/other/\"></head><body><img src=\"pic.png\"><a href=\"http://ex.test/dir/page#sec\">s</a></body></html>",
        );
        let base = read_base(&mut dom, &url);
        assert_eq!(base.as_str(), "http://ex.test/other/");
        resolve_urls(&mut dom, &base, &url);
        let rendered = dom.root_element().html();
        assert!(rendered.contains("src=\"http://ex.test/other/pic.png\""));
        assert!(rendered.contains("href=\"#sec\""));
        assert!(!rendered.contains("<base"));
    }

    #[test]
    fn srcset_entries_resolve_individually() {
        let url: Url = "http://ex.test/p".parse().unwrap();
        let mut dom = doc("<img srcset=\"a.jpg 1x, b.jpg 2x\">");
        resolve_urls(&mut dom, &url, &url);
        assert!(dom
            .root_element()
            .html()
            .contains("srcset=\"http://ex.test/a.jpg 1x, http://ex.test/b.jpg 2x\""));
    }

    #[test]
    fn placeholder_src_is_dropped_when_real_image_hides() {
        let mut dom = doc(
            "<img src=\"data:image/gif;base64,R0lGODlhAQABAAAAACw=\" data-src=\"/real.jpg\">",
        );
        fix_lazy_images(&mut dom);
        let rendered = dom.root_element().html();
        assert!(!rendered.contains("data:image/gif"));
        assert!(rendered.contains("data-src=\"/real.jpg\""));
    }

    #[test]
    fn lazy_class_promotes_hidden_source() {
        let mut dom = doc("<img class=\"lazyload\" data-original=\"/real.jpg\">");
        fix_lazy_images(&mut dom);
        assert!(dom.root_element().html().contains("src=\"/real.jpg\""));
    }

    #[test]
    fn figures_without_images_get_one() {
        let mut dom = doc("<figure data-img=\"/shot.png\"><figcaption>c</figcaption></figure>");
        fix_lazy_images(&mut dom);
        assert!(dom.root_element().html().contains("<img src=\"/shot.png\">"));
    }

    #[test]
    fn loading_lazy_is_first_attribute() {
        let mut dom = doc("<img src=\"/a.png\" alt=\"x\">");
        mark_images_lazy(&mut dom);
        assert!(dom.root_element().html().contains("<img loading=\"lazy\""));
    }

    #[test]
    fn data_attributes_stripped_unless_enabled() {
        let mut dom = doc("<p data-test=\"1\" id=\"k\">x</p>");
        strip_data_attributes(&mut dom, ArchiveFlags::default());
        assert!(!dom.root_element().html().contains("data-test"));
        let mut dom = doc("<p data-test=\"1\">x</p>");
        strip_data_attributes(&mut dom, ArchiveFlags::default() | ArchiveFlags::DATA_ATTRIBUTES);
        assert!(dom.root_element().html().contains("data-test"));
    }

    #[test]
    fn job_collection_honours_flags() {
        let dom = doc(
            "<p style=\"background:url(/x.png)\">t</p><img src=\"http://ex.test/a.png\">",
        );
        let jobs = collect_jobs(&dom, ArchiveFlags::default());
        assert_eq!(jobs.len(), 1);
        let jobs = collect_jobs(&dom, ArchiveFlags::default() | ArchiveFlags::CSS);
        assert_eq!(jobs.len(), 2);
    }
}
