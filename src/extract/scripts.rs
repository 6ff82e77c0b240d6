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

//! The contract between the pipeline and user supplied content scripts.
//!
//! The scripting runtime itself lives with the embedding application; the
//! pipeline only promises three hooks: `document_ready` when the dom is
//! parsed, `document_done` when every other dom mutation has happened, and
//! `process_meta` once per run. Hook failures are logged and swallowed; a
//! broken user script never kills an extraction.

use super::drop::Drop;
use super::process::{ProcessMessage, Processor, Step};
use crate::run_warn;
use async_trait::async_trait;
use scraper::Html;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
#[error("script error: {0}")]
pub struct ScriptError(pub String);

/// A user script attached to one extraction run.
pub trait ContentScript: Send {
    fn name(&self) -> &str;

    /// The dom is parsed, nothing has touched it yet.
    fn document_ready(&mut self, _dom: &mut Html, _drop: &mut Drop) -> Result<(), ScriptError> {
        Ok(())
    }

    /// Every pipeline mutation is in; last chance to edit the dom.
    fn document_done(&mut self, _dom: &mut Html, _drop: &mut Drop) -> Result<(), ScriptError> {
        Ok(())
    }

    /// Invoked once per run, after metadata derivation.
    fn process_meta(&mut self, _drop: &mut Drop) -> Result<(), ScriptError> {
        Ok(())
    }
}

/// The shared script set behind both pipeline hooks.
pub type ScriptSet = Arc<Mutex<Vec<Box<dyn ContentScript>>>>;

pub fn script_set(scripts: Vec<Box<dyn ContentScript>>) -> ScriptSet {
    Arc::new(Mutex::new(scripts))
}

enum Hook {
    Ready,
    Done,
}

/// Runs one of the dom hooks; register a Ready processor before the dom
/// mutating stages and a Done processor after them.
pub struct ScriptProcessor {
    scripts: ScriptSet,
    hook: Hook,
    meta_done: bool,
}

impl ScriptProcessor {
    pub fn ready(scripts: ScriptSet) -> Self {
        Self {
            scripts,
            hook: Hook::Ready,
            meta_done: false,
        }
    }

    pub fn done(scripts: ScriptSet) -> Self {
        Self {
            scripts,
            hook: Hook::Done,
            meta_done: false,
        }
    }
}

#[async_trait(?Send)]
impl Processor for ScriptProcessor {
    fn name(&self) -> &'static str {
        match self.hook {
            Hook::Ready => "scripts/ready",
            Hook::Done => "scripts/done",
        }
    }

    async fn process(&mut self, m: &mut ProcessMessage<'_>) {
        match m.step() {
            Step::Dom => {
                let sink = m.extractor.error_sink().clone();
                let position = m.position();
                let mut scripts = self.scripts.lock().await;
                let ProcessMessage { extractor, dom, .. } = m;
                let (Some(parsed), Some(drop)) = (dom.as_mut(), extractor.drop_at_mut(position))
                else {
                    return;
                };
                for script in scripts.iter_mut() {
                    let outcome = match self.hook {
                        Hook::Ready => script.document_ready(parsed, drop),
                        Hook::Done => script.document_done(parsed, drop),
                    };
                    if let Err(err) = outcome {
                        run_warn!(sink, "content script {} failed: {err}", script.name());
                    }
                }
            }
            Step::Finish => {
                if !matches!(self.hook, Hook::Done) || self.meta_done {
                    return;
                }
                self.meta_done = true;
                let sink = m.extractor.error_sink().clone();
                let mut scripts = self.scripts.lock().await;
                let Some(drop) = m.drop_mut() else { return };
                for script in scripts.iter_mut() {
                    if let Err(err) = script.process_meta(drop) {
                        run_warn!(sink, "content script {} failed: {err}", script.name());
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Upcase;
    impl ContentScript for Upcase {
        fn name(&self) -> &str {
            "upcase"
        }
        fn process_meta(&mut self, drop: &mut Drop) -> Result<(), ScriptError> {
            drop.title = drop.title.to_uppercase();
            Ok(())
        }
    }

    struct Faulty;
    impl ContentScript for Faulty {
        fn name(&self) -> &str {
            "faulty"
        }
        fn process_meta(&mut self, _drop: &mut Drop) -> Result<(), ScriptError> {
            Err(ScriptError("nope".to_string()))
        }
    }

    #[tokio::test]
    async fn script_failures_are_not_fatal() {
        let scripts = script_set(vec![Box::new(Faulty), Box::new(Upcase)]);
        let mut scripts = scripts.lock().await;
        let mut drop = Drop::new("http://ex.test/".parse().unwrap());
        drop.title = "t".to_string();
        for script in scripts.iter_mut() {
            let _ = script.process_meta(&mut drop);
        }
        assert_eq!(drop.title, "T");
    }
}
