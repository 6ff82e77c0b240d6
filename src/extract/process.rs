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

//! The processor contract of the extraction pipeline.

use super::drop::Drop;
use super::Extractor;
use async_trait::async_trait;
use scraper::Html;
use strum::Display;

/// Where the pipeline currently stands for a drop. Linear per drop, with
/// one [`Step::PostProcess`] after the queue drains and [`Step::Done`]
/// closing every run.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display)]
pub enum Step {
    Start,
    Body,
    Dom,
    Finish,
    PostProcess,
    Done,
}

/// Control-flow requests a processor files during a step. The run loop
/// applies them after the step completes, which keeps the drop list stable
/// while processors iterate over it.
#[derive(Debug, Default)]
pub struct Actions {
    pub(super) reset: Option<Drop>,
    pub(super) new_drops: Vec<Drop>,
    pub(super) cancel: Option<String>,
}

/// Per-iteration state handed to every processor.
pub struct ProcessMessage<'a> {
    pub extractor: &'a mut Extractor,
    pub(super) dom: &'a mut Option<Html>,
    pub(super) step: Step,
    pub(super) position: usize,
    pub(super) resets: u8,
    pub(super) actions: &'a mut Actions,
}

impl<'a> ProcessMessage<'a> {
    pub fn step(&self) -> Step {
        self.step
    }

    /// Index of the current drop in the queue.
    pub fn position(&self) -> usize {
        self.position
    }

    /// How often this run was already reset to start.
    pub fn resets(&self) -> u8 {
        self.resets
    }

    pub fn drop(&self) -> Option<&Drop> {
        self.extractor.drops().get(self.position)
    }

    pub fn drop_mut(&mut self) -> Option<&mut Drop> {
        self.extractor.drop_at_mut(self.position)
    }

    pub fn dom(&mut self) -> Option<&mut Html> {
        self.dom.as_mut()
    }

    pub fn has_dom(&self) -> bool {
        self.dom.is_some()
    }

    /// Replaces the current drop and re-enters the pipeline at
    /// [`Step::Start`]; how single-page variants of an article are chased.
    /// Bounded; too many resets cancel the run.
    pub fn reset_position(&mut self, replacement: Drop) {
        self.actions.reset = Some(replacement);
    }

    /// Appends a follow-up page to the queue (next-page chasing).
    pub fn add_drop(&mut self, drop: Drop) {
        self.actions.new_drops.push(drop);
    }

    pub fn cancel(&mut self, reason: impl Into<String>) {
        self.actions.cancel = Some(reason.into());
    }

    pub fn is_canceled(&self) -> bool {
        self.actions.cancel.is_some()
    }
}

/// A pipeline stage. Stages see every step of every drop and pick the ones
/// they care about.
#[async_trait(?Send)]
pub trait Processor: Send {
    fn name(&self) -> &'static str;

    async fn process(&mut self, m: &mut ProcessMessage<'_>);
}
