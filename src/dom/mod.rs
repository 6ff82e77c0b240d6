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

//! Helpers for mutating the [`scraper`] tree.
//!
//! [`scraper::Html`] exposes its [`ego_tree::Tree`], which is all we need to
//! edit a parsed page in place. Everything here works on [`NodeId`]s so the
//! callers can collect the ids during an immutable traversal and mutate
//! afterwards.

use ego_tree::iter::Edge;
use ego_tree::{NodeId, NodeMut, NodeRef, Tree};
use html5ever::tendril::StrTendril;
use html5ever::{ns, namespace_url, Attribute, LocalName, QualName};
use scraper::node::Element;
use scraper::{ElementRef, Html, Node};

/// Builds lazily initialized, pre-parsed css selectors.
#[macro_export]
macro_rules! static_selectors {
    (
        $($vis:vis [
            $($name: ident = $selector: literal)+
        ])?
    ) => {
        $($(
            $vis static $name: std::sync::LazyLock<scraper::Selector> =
                std::sync::LazyLock::new(|| scraper::Selector::parse($selector).unwrap());
        )+)?
    };
}

/// Iterator over descendent text nodes.
#[derive(Debug, Clone)]
pub struct Text<'a> {
    inner: ego_tree::iter::Traverse<'a, Node>,
}

impl<'a> Text<'a> {
    pub fn traverse(node: &NodeRef<'a, Node>) -> Self {
        Self {
            inner: node.traverse(),
        }
    }
}

impl<'a> Iterator for Text<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        for edge in &mut self.inner {
            if let Edge::Open(node) = edge {
                if let Node::Text(ref text) = node.value() {
                    return Some(&**text);
                }
            }
        }
        None
    }
}

/// The qualified name of an html element.
pub fn element_name(name: &str) -> QualName {
    QualName::new(None, ns!(html), LocalName::from(name))
}

/// The qualified name of an attribute. Attributes live in no namespace.
pub fn attr_name(name: &str) -> QualName {
    QualName::new(None, ns!(), LocalName::from(name))
}

/// Creates a detached element node.
pub fn element(name: &str, attrs: Vec<(String, String)>) -> Node {
    let attrs = attrs
        .into_iter()
        .map(|(name, value)| Attribute {
            name: attr_name(&name),
            value: StrTendril::from(value.as_str()),
        })
        .collect();
    Node::Element(Element::new(element_name(name), attrs))
}

fn rebuild<F>(tree: &mut Tree<Node>, id: NodeId, edit: F)
where
    F: FnOnce(&mut Vec<Attribute>),
{
    let Some(mut node) = tree.get_mut(id) else {
        return;
    };
    if let Node::Element(el) = node.value() {
        let name = el.name.clone();
        let mut attrs: Vec<Attribute> = el
            .attrs
            .iter()
            .map(|(name, value)| Attribute {
                name: name.clone(),
                value: value.clone(),
            })
            .collect();
        edit(&mut attrs);
        // A fresh element drops the cached id/class lookups of the old one.
        *node.value() = Node::Element(Element::new(name, attrs));
    }
}

/// Sets (or replaces) an attribute.
pub fn set_attr(tree: &mut Tree<Node>, id: NodeId, name: &str, value: &str) {
    let qual = attr_name(name);
    let tendril = StrTendril::from(value);
    rebuild(tree, id, |attrs| {
        if let Some(found) = attrs.iter_mut().find(|a| a.name == qual) {
            found.value = tendril;
        } else {
            attrs.push(Attribute {
                name: qual,
                value: tendril,
            });
        }
    });
}

/// Sets an attribute and moves it to the first position.
pub fn set_first_attr(tree: &mut Tree<Node>, id: NodeId, name: &str, value: &str) {
    let qual = attr_name(name);
    let tendril = StrTendril::from(value);
    rebuild(tree, id, |attrs| {
        attrs.retain(|a| a.name != qual);
        attrs.insert(
            0,
            Attribute {
                name: qual,
                value: tendril,
            },
        );
    });
}

/// Removes an attribute if present.
pub fn remove_attr(tree: &mut Tree<Node>, id: NodeId, name: &str) {
    let qual = attr_name(name);
    rebuild(tree, id, |attrs| attrs.retain(|a| a.name != qual));
}

/// Renames an attribute, keeping its value and position.
pub fn rename_attr(tree: &mut Tree<Node>, id: NodeId, from: &str, to: &str) {
    let from = attr_name(from);
    let to = attr_name(to);
    rebuild(tree, id, |attrs| {
        for attr in attrs.iter_mut() {
            if attr.name == from {
                attr.name = to.clone();
            }
        }
    });
}

/// Changes the tag of an element, attributes survive.
pub fn rename_element(tree: &mut Tree<Node>, id: NodeId, name: &str) {
    let qual = element_name(name);
    let Some(mut node) = tree.get_mut(id) else {
        return;
    };
    if let Node::Element(el) = node.value() {
        let attrs = el
            .attrs
            .iter()
            .map(|(name, value)| Attribute {
                name: name.clone(),
                value: value.clone(),
            })
            .collect();
        *node.value() = Node::Element(Element::new(qual, attrs));
    }
}

/// Detaches the node from the tree. The arena keeps the allocation.
pub fn detach(tree: &mut Tree<Node>, id: NodeId) {
    if let Some(mut node) = tree.get_mut(id) {
        node.detach();
    }
}

/// Replaces a node by its own children.
pub fn unwrap_node(tree: &mut Tree<Node>, id: NodeId) {
    loop {
        let Some(child) = tree.get(id).and_then(|n| n.first_child()).map(|c| c.id()) else {
            break;
        };
        move_before(tree, child, id);
    }
    detach(tree, id);
}

/// Moves `id` (with its whole subtree) in front of `target`. Returns the
/// node's new id; moving re-homes the value in the arena.
pub fn move_before(tree: &mut Tree<Node>, id: NodeId, target: NodeId) -> Option<NodeId> {
    let value = tree.get(id)?.value().clone();
    let new_id = {
        let mut target = tree.get_mut(target)?;
        let mut new = target.insert_before(value);
        new.reparent_from_id_append(id);
        new.id()
    };
    detach(tree, id);
    Some(new_id)
}

/// Moves `id` (with its whole subtree) to the end of `target`'s children.
/// Returns the node's new id.
pub fn move_append(tree: &mut Tree<Node>, id: NodeId, target: NodeId) -> Option<NodeId> {
    let value = tree.get(id)?.value().clone();
    tree.get(target)?;
    let new_id = {
        let mut target = tree.get_mut(target).unwrap();
        let mut new = target.append(value);
        new.reparent_from_id_append(id);
        new.id()
    };
    detach(tree, id);
    Some(new_id)
}

/// Moves every child of `id` into `target`, preserving order.
pub fn move_children(tree: &mut Tree<Node>, id: NodeId, target: NodeId) {
    if let Some(mut target) = tree.get_mut(target) {
        target.reparent_from_id_append(id);
    }
}

/// Deep-copies `src` (a node of another tree) beneath `dst`.
pub fn graft(dst: &mut NodeMut<'_, Node>, src: NodeRef<'_, Node>) {
    let mut new = dst.append(src.value().clone());
    for child in src.children() {
        graft(&mut new, child);
    }
}

/// Deep-copies the children of `src` beneath `dst`.
pub fn graft_children(dst: &mut NodeMut<'_, Node>, src: NodeRef<'_, Node>) {
    for child in src.children() {
        graft(dst, child);
    }
}

/// Deep-copies the content of a parsed fragment beneath `dst`.
///
/// Fragments parse into a synthetic `<html>` wrapper, which is skipped here.
pub fn graft_fragment(dst: &mut NodeMut<'_, Node>, fragment: &Html) {
    for child in fragment.root_element().children() {
        graft(dst, child);
    }
}

/// The local tag name of an element node, if it is one.
pub fn tag_name<'a>(node: &NodeRef<'a, Node>) -> Option<&'a str> {
    node.value().as_element().map(|el| el.name.local.as_ref())
}

/// Collects the ids of every element matching `selector`.
///
/// Selection borrows the whole tree, so mutation has to happen after the
/// traversal. This is the gather half of the gather/mutate split used all
/// over the crate.
pub fn select_ids(html: &Html, selector: &scraper::Selector) -> Vec<NodeId> {
    html.select(selector).map(|el| el.id()).collect()
}

/// Concatenated descendent text.
pub fn text_content(node: &NodeRef<'_, Node>) -> String {
    Text::traverse(node).collect()
}

/// Whether the node contains nothing but whitespace text.
pub fn is_blank(node: &NodeRef<'_, Node>) -> bool {
    Text::traverse(node).all(|t| t.trim().is_empty())
}

/// Serialises a whole document with the doctype prefix.
pub fn render_document(html: &Html) -> String {
    format!("<!DOCTYPE html>\n{}", html.root_element().html())
}

/// Serialises the children of `<body>`.
pub fn render_body(html: &Html) -> String {
    static_selectors! {
        [
            BODY = "body"
        ]
    }
    html.select(&BODY)
        .next()
        .map(|body| body.inner_html())
        .unwrap_or_default()
}

/// Wraps a node id back into an [`ElementRef`] if it still is an element.
pub fn as_element<'a>(html: &'a Html, id: NodeId) -> Option<ElementRef<'a>> {
    html.tree.get(id).and_then(ElementRef::wrap)
}

#[cfg(test)]
mod test {
    use super::*;
    use scraper::{Html, Selector};

    fn doc() -> Html {
        Html::parse_document(
            "<html><head></head><body><div id=\"a\"><p>one</p><p>two</p></div></body></html>",
        )
    }

    #[test]
    fn set_and_remove_attr() {
        let mut html = doc();
        let sel = Selector::parse("div").unwrap();
        let id = html.select(&sel).next().unwrap().id();
        set_attr(&mut html.tree, id, "class", "x");
        assert!(html.root_element().html().contains("class=\"x\""));
        remove_attr(&mut html.tree, id, "class");
        assert!(!html.root_element().html().contains("class=\"x\""));
    }

    #[test]
    fn unwrap_keeps_children_in_order() {
        let mut html = doc();
        let sel = Selector::parse("div").unwrap();
        let id = html.select(&sel).next().unwrap().id();
        unwrap_node(&mut html.tree, id);
        let body = render_body(&html);
        assert_eq!(body, "<p>one</p><p>two</p>");
    }

    #[test]
    fn rename_element_keeps_attrs() {
        let mut html = doc();
        let sel = Selector::parse("div").unwrap();
        let id = html.select(&sel).next().unwrap().id();
        rename_element(&mut html.tree, id, "section");
        let body = render_body(&html);
        assert!(body.starts_with("<section id=\"a\">"), "{body}");
    }

    #[test]
    fn graft_copies_across_trees() {
        let mut html = doc();
        let fragment = Html::parse_fragment("<span>hi</span>");
        let sel = Selector::parse("div").unwrap();
        let id = html.select(&sel).next().unwrap().id();
        let mut dst = html.tree.get_mut(id).unwrap();
        graft_fragment(&mut dst, &fragment);
        assert!(render_body(&html).contains("<span>hi</span>"));
    }

    #[test]
    fn move_before_preserves_subtree() {
        let mut html = doc();
        let p = Selector::parse("p").unwrap();
        let ids: Vec<_> = html.select(&p).map(|e| e.id()).collect();
        move_before(&mut html.tree, ids[1], ids[0]);
        assert_eq!(
            render_body(&html),
            "<div id=\"a\"><p>two</p><p>one</p></div>"
        );
    }
}
