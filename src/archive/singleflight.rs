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

//! Keyed coalescing of concurrent work.
//!
//! Concurrent calls for the same key share one execution and all observe its
//! result. An entry is forgotten as soon as its flight lands, so a later
//! call starts fresh; long-lived caching is the resource table's job, not
//! ours.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

#[derive(Debug, Default)]
pub struct SingleFlight<T> {
    inflight: Mutex<HashMap<String, Arc<OnceCell<T>>>>,
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `work` unless a flight for `key` is already up, in which case
    /// the caller waits for that flight's result instead.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let cell = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let value = cell.get_or_init(work).await.clone();

        let mut inflight = self.inflight.lock().await;
        if let Some(current) = inflight.get(key) {
            // Only the cell we flew with may be evicted; a newer flight for
            // the same key must keep its entry.
            if Arc::ptr_eq(current, &cell) {
                inflight.remove(key);
            }
        }
        value
    }
}
