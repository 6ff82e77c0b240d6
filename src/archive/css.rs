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

//! The css side of archiving.
//!
//! Tokenises a stylesheet, archives everything its `url(...)` tokens point
//! at (stylesheets recurse through [`Archiver::process_url`]) and rewrites
//! the tokens to the local names. With fonts disabled, whole `@font-face`
//! rules are dropped from the output.

use super::{relative_name, Archiver};
use crate::client::RequestKind;
use cssparser::{ParseError, Parser, ParserInput, Token};
use futures::StreamExt;
use std::collections::HashMap;
use std::ops::Range;
use url::Url;

/// Concurrency cap for the references of one stylesheet.
const CSS_FAN_OUT: usize = 5;

enum CssRef {
    /// A `url(...)` token to rewrite.
    Url { span: Range<usize>, url: String },
    /// A span to drop entirely (`@font-face` with fonts disabled).
    Strip(Range<usize>),
}

/// Rewrites one stylesheet. Unresolvable or failed references keep their
/// original text; that is the skip policy for css.
pub async fn process(archiver: &Archiver, css: &str, parent_url: &Url, parent_name: &str) -> String {
    let fonts = archiver.flags().contains(crate::ArchiveFlags::FONTS);
    let mut refs = Vec::new();
    {
        let mut input = ParserInput::new(css);
        let mut parser = Parser::new(&mut input);
        collect(&mut parser, fonts, &mut refs);
    }

    // One fetch per distinct resolvable url.
    let mut targets: Vec<Url> = Vec::new();
    for reference in &refs {
        if let CssRef::Url { url, .. } = reference {
            if let Some(resolved) = resolve(parent_url, url) {
                if !targets.contains(&resolved) {
                    targets.push(resolved);
                }
            }
        }
    }

    let ctx = archiver.request_context(RequestKind::Resource);
    let fetched: Vec<(Url, Option<String>)> = futures::stream::iter(targets)
        .map(|target| {
            let ctx = ctx.clone();
            async move {
                let replacement = match archiver.process_url(&ctx, &target).await {
                    Ok(resource) => Some(match resource.contents {
                        Some(contents) => String::from_utf8_lossy(&contents).into_owned(),
                        None => relative_name(parent_name, &resource.name),
                    }),
                    Err(err) => {
                        crate::run_warn!(
                            archiver.errors(),
                            "css resource {target} not archived: {err}"
                        );
                        None
                    }
                };
                (target, replacement)
            }
        })
        .buffer_unordered(CSS_FAN_OUT)
        .collect()
        .await;
    let replacements: HashMap<Url, String> = fetched
        .into_iter()
        .filter_map(|(url, replacement)| Some((url, replacement?)))
        .collect();

    render(css, refs, parent_url, &replacements)
}

fn render(
    css: &str,
    refs: Vec<CssRef>,
    parent_url: &Url,
    replacements: &HashMap<Url, String>,
) -> String {
    let mut out = String::with_capacity(css.len());
    let mut cursor = 0usize;
    for reference in refs {
        match reference {
            CssRef::Strip(span) => {
                out.push_str(&css[cursor..span.start]);
                cursor = span.end;
            }
            CssRef::Url { span, url } => {
                let replacement = resolve(parent_url, &url)
                    .and_then(|resolved| replacements.get(&resolved));
                if let Some(name) = replacement {
                    out.push_str(&css[cursor..span.start]);
                    out.push_str(&format!("url(\"{name}\")"));
                    cursor = span.end;
                }
            }
        }
    }
    out.push_str(&css[cursor..]);
    out
}

/// Resolves a raw `url(...)` value against the stylesheet it came from.
/// Empty and fragment-only values are skipped.
fn resolve(parent: &Url, raw: &str) -> Option<Url> {
    let trimmed = raw.trim().trim_matches(['"', '\'']).trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    parent.join(trimmed).ok()
}

fn collect<'i>(parser: &mut Parser<'i, '_>, fonts: bool, refs: &mut Vec<CssRef>) {
    loop {
        parser.skip_whitespace();
        let start = parser.position();
        let token = match parser.next() {
            Ok(token) => token.clone(),
            Err(_) => return,
        };
        match token {
            Token::AtKeyword(ref name) if !fonts && name.eq_ignore_ascii_case("font-face") => {
                // Swallow the prelude and the block; the rule vanishes.
                loop {
                    match parser.next() {
                        Ok(Token::CurlyBracketBlock) => {
                            let _ = parser.parse_nested_block(
                                |block| -> Result<(), ParseError<'i, ()>> {
                                    while block.next().is_ok() {}
                                    Ok(())
                                },
                            );
                            break;
                        }
                        Ok(_) => {}
                        Err(_) => break,
                    }
                }
                refs.push(CssRef::Strip(start.byte_index()..parser.position().byte_index()));
            }
            Token::UnquotedUrl(ref url) => {
                refs.push(CssRef::Url {
                    span: start.byte_index()..parser.position().byte_index(),
                    url: url.as_ref().to_string(),
                });
            }
            Token::Function(ref name) if name.eq_ignore_ascii_case("url") => {
                let url = parser.parse_nested_block(
                    |block| -> Result<String, ParseError<'i, ()>> {
                        let url = block.expect_string()?.as_ref().to_string();
                        while block.next().is_ok() {}
                        Ok(url)
                    },
                );
                if let Ok(url) = url {
                    refs.push(CssRef::Url {
                        span: start.byte_index()..parser.position().byte_index(),
                        url,
                    });
                }
            }
            Token::Function(_)
            | Token::ParenthesisBlock
            | Token::SquareBracketBlock
            | Token::CurlyBracketBlock => {
                let _ = parser.parse_nested_block(|block| -> Result<(), ParseError<'i, ()>> {
                    collect(block, fonts, refs);
                    Ok(())
                });
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn refs_of(css: &str, fonts: bool) -> Vec<String> {
        let mut refs = Vec::new();
        let mut input = ParserInput::new(css);
        let mut parser = Parser::new(&mut input);
        collect(&mut parser, fonts, &mut refs);
        refs.iter()
            .filter_map(|r| match r {
                CssRef::Url { url, .. } => Some(url.clone()),
                CssRef::Strip(_) => None,
            })
            .collect()
    }

    #[test]
    fn finds_urls_in_nested_rules() {
        let css = "body { background: url(/bg.png); } @media screen { .x { background-image: url(\"deep.gif\"); } }";
        assert_eq!(refs_of(css, true), vec!["/bg.png", "deep.gif"]);
    }

    #[test]
    fn font_face_is_skipped_without_fonts() {
        let css = "@font-face { src: url(/f.woff); } p { background: url(/bg.png); }";
        assert_eq!(refs_of(css, false), vec!["/bg.png"]);
        assert_eq!(refs_of(css, true), vec!["/f.woff", "/bg.png"]);
    }

    #[test]
    fn render_strips_font_face_spans() {
        let css = "@font-face { src: url(/f.woff); } p { color: red; }";
        let mut refs = Vec::new();
        let mut input = ParserInput::new(css);
        let mut parser = Parser::new(&mut input);
        collect(&mut parser, false, &mut refs);
        let parent: Url = "http://ex.test/a.css".parse().unwrap();
        let out = render(css, refs, &parent, &HashMap::new());
        assert!(!out.contains("f.woff"), "{out}");
        assert!(out.contains("color: red"));
    }

    #[test]
    fn resolve_skips_fragments_and_empties() {
        let parent: Url = "http://ex.test/css/site.css".parse().unwrap();
        assert!(resolve(&parent, "").is_none());
        assert!(resolve(&parent, "#mask").is_none());
        assert_eq!(
            resolve(&parent, "../img/x.png").unwrap().as_str(),
            "http://ex.test/img/x.png"
        );
    }
}
