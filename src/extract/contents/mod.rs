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

//! Content processors: dom transformations running at the dom step of the
//! pipeline. Most are a single pure tree rewrite; svg inlining also
//! fetches the referenced files through the run's client.

pub mod anchors;
pub mod embeds;
pub mod icons;
pub mod mathml;
pub mod picture;
pub mod svg;

use super::process::{ProcessMessage, Processor, Step};
use async_trait::async_trait;
use scraper::Html;

/// Wraps a tree rewrite function as a pipeline processor.
pub struct ContentProcessor {
    name: &'static str,
    apply: fn(&mut Html),
}

impl ContentProcessor {
    pub fn new(name: &'static str, apply: fn(&mut Html)) -> Self {
        Self { name, apply }
    }
}

#[async_trait(?Send)]
impl Processor for ContentProcessor {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn process(&mut self, m: &mut ProcessMessage<'_>) {
        if m.step() != Step::Dom {
            return;
        }
        let apply = self.apply;
        if let Some(parsed) = m.dom() {
            apply(parsed);
        }
    }
}

/// The standard content processor set, in pipeline order. Svg inlining
/// runs before the svg size hygiene so fetched markup gets the same
/// treatment as native markup.
pub fn standard() -> Vec<Box<dyn Processor>> {
    vec![
        Box::new(ContentProcessor::new("contents/picture", picture::apply)),
        Box::new(ContentProcessor::new("contents/icons", icons::apply)),
        Box::new(ContentProcessor::new("contents/anchors", anchors::apply)),
        Box::new(ContentProcessor::new("contents/embeds", embeds::apply)),
        Box::new(svg::SvgInlineProcessor),
        Box::new(ContentProcessor::new("contents/svg", svg::apply)),
        Box::new(ContentProcessor::new("contents/mathml", mathml::apply)),
    ]
}
