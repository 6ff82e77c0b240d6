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

//! Error-teeing on top of the [`log`] facade.
//!
//! The extractor wants two things from its logging: the usual records for
//! whoever initialised the global logger, and a copy of every Warn+ message
//! so the embedding application can inspect what went wrong during a run
//! without scraping log output. [`ErrorSink`] is the per-run side channel,
//! [`Tee`] the decorator for applications that install their own
//! [`log::Log`].

use log::{Level, Log, Metadata, Record};
use std::fmt::Arguments;
use std::sync::{Arc, Mutex};

/// A cloneable collection of the Warn+ records of one extraction run.
#[derive(Debug, Clone, Default)]
pub struct ErrorSink {
    records: Arc<Mutex<Vec<String>>>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs at Warn and records the message.
    pub fn warn(&self, args: Arguments<'_>) {
        let message = args.to_string();
        log::warn!("{message}");
        self.push(message);
    }

    /// Logs at Error and records the message.
    pub fn error(&self, args: Arguments<'_>) {
        let message = args.to_string();
        log::error!("{message}");
        self.push(message);
    }

    fn push(&self, message: String) {
        self.records.lock().expect("error sink poisoned").push(message);
    }

    /// All recorded messages, oldest first.
    pub fn records(&self) -> Vec<String> {
        self.records.lock().expect("error sink poisoned").clone()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().expect("error sink poisoned").is_empty()
    }
}

/// Records a warning into `sink` and forwards it to the global logger.
#[macro_export]
macro_rules! run_warn {
    ($sink:expr, $($arg:tt)+) => {
        $sink.warn(format_args!($($arg)+))
    };
}

/// Records an error into `sink` and forwards it to the global logger.
#[macro_export]
macro_rules! run_error {
    ($sink:expr, $($arg:tt)+) => {
        $sink.error(format_args!($($arg)+))
    };
}

/// A [`Log`] decorator that copies Warn+ records into an [`ErrorSink`].
///
/// For applications that initialise the global logger themselves and want
/// facade-level teeing instead of the per-run sink.
pub struct Tee<L> {
    inner: L,
    sink: ErrorSink,
}

impl<L: Log> Tee<L> {
    pub fn new(inner: L, sink: ErrorSink) -> Self {
        Self { inner, sink }
    }
}

impl<L: Log> Log for Tee<L> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata) || metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if record.level() <= Level::Warn {
            self.sink.push(record.args().to_string());
        }
        self.inner.log(record);
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sink_records_warnings() {
        let sink = ErrorSink::new();
        crate::run_warn!(sink, "lost {}", "resource");
        crate::run_error!(sink, "fatal-ish");
        assert_eq!(sink.records(), vec!["lost resource", "fatal-ish"]);
    }

    struct Silent;
    impl Log for Silent {
        fn enabled(&self, _: &Metadata) -> bool {
            false
        }
        fn log(&self, _: &Record) {}
        fn flush(&self) {}
    }

    #[test]
    fn tee_copies_warn_and_above() {
        let sink = ErrorSink::new();
        let tee = Tee::new(Silent, sink.clone());
        tee.log(
            &Record::builder()
                .args(format_args!("boom"))
                .level(Level::Warn)
                .build(),
        );
        tee.log(
            &Record::builder()
                .args(format_args!("fine"))
                .level(Level::Info)
                .build(),
        );
        assert_eq!(sink.records(), vec!["boom"]);
    }
}
