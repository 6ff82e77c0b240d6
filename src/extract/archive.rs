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

//! The archival stage of the pipeline: at post-process it wraps the
//! concatenated article html into a document and hands it to the
//! [`Archiver`], which downloads every subresource into the configured
//! collector.

use super::process::{ProcessMessage, Processor, Step};
use crate::archive::collector::Collector;
use crate::archive::flags::ArchiveFlags;
use crate::archive::Archiver;
use crate::run_error;
use async_trait::async_trait;
use scraper::Html;
use std::sync::Arc;

pub struct ArchiveProcessor {
    collector: Arc<dyn Collector>,
    flags: ArchiveFlags,
}

impl ArchiveProcessor {
    pub fn new(collector: Arc<dyn Collector>) -> Self {
        Self {
            collector,
            flags: ArchiveFlags::default(),
        }
    }

    pub fn with_flags(mut self, flags: ArchiveFlags) -> Self {
        self.flags = flags;
        self
    }
}

#[async_trait(?Send)]
impl Processor for ArchiveProcessor {
    fn name(&self) -> &'static str {
        "archive"
    }

    async fn process(&mut self, m: &mut ProcessMessage<'_>) {
        if m.step() != Step::PostProcess {
            return;
        }
        if !m.extractor.root_drop().is_html() {
            return;
        }
        if m.extractor.html().is_empty() {
            return;
        }

        let root = m.extractor.root_drop();
        let url = root.url.clone();
        let page = document_for(
            &root.title,
            &root.lang,
            &root.text_direction.to_string(),
            m.extractor.html(),
        );
        let mut parsed = Html::parse_document(&page);

        let archiver = Archiver::with_cancel(
            self.collector.clone(),
            m.extractor.cancel_token().child_token(),
        )
        .with_flags(self.flags)
        .with_referer(Some(url.clone()))
        .with_error_sink(m.extractor.error_sink().clone());

        if let Err(err) = archiver.archive(&mut parsed, &url).await {
            run_error!(m.extractor.error_sink(), "archiving {url} failed: {err}");
        }
    }
}

/// The standalone document around the extracted pages.
fn document_for(title: &str, lang: &str, dir: &str, body: &str) -> String {
    let title = escape(title);
    let lang_attr = if lang.is_empty() {
        String::new()
    } else {
        format!(" lang=\"{}\"", escape(lang))
    };
    format!(
        "<!DOCTYPE html>\n<html{lang_attr} dir=\"{dir}\"><head><title>{title}</title></head><body>{body}</body></html>"
    )
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn document_wrapper_escapes_and_tags() {
        let page = document_for("A <b> title", "en", "ltr", "<section><p>x</p></section>");
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<title>A &lt;b&gt; title</title>"));
        assert!(page.contains("<html lang=\"en\" dir=\"ltr\">"));
        assert!(page.contains("<section><p>x</p></section>"));
    }
}
