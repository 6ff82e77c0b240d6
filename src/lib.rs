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

//! caddis turns a live web page into a self contained snapshot suitable for
//! offline reading.
//!
//! The two halves of the crate:
//!
//! * [`extract`] drives a page (or a chain of pages) through an ordered
//!   processor pipeline, isolates the readable article and gathers metadata.
//! * [`archive`] walks the resulting document, fetches every subresource with
//!   bounded concurrency and rewrites the references so the snapshot can be
//!   stored by a pluggable [`archive::collector::Collector`].

pub mod archive;
pub mod client;
pub mod dom;
pub mod extract;
pub mod format;
pub mod logging;
#[cfg(test)]
pub(crate) mod test_support;

pub use archive::flags::ArchiveFlags;
pub use archive::resource::Resource;
pub use extract::{Extractor, Step};
