// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Dispatch and flush orchestration.
//!
//! The collector subscribes to the bus, turns every delivered event into a
//! bucket write (interval mode) or an emitted line (immediate mode), and decides
//! when the bucket is flushed:
//!
//! - time trigger: `interval` seconds have passed since the last flush
//! - size trigger: the bucket holds `max_buffer_size` entries
//! - an external tick calling [`Collector::flush`] with `force = false`
//! - [`Collector::shutdown`], once
//!
//! Triggers fire synchronously on whichever thread crosses them. Flushes are
//! serialized: the interval check, the drain and the write to the sink happen
//! under one lock, so a tick and a time trigger racing at the interval boundary
//! emit once, and lines reach the sink in drain order. A sink must therefore not
//! record metrics through the collector that feeds it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::{debug, trace};

use crate::bucket::Bucket;
use crate::config::{BatchingMode, Config};
use crate::event_bus::{EventBus, Subscription};
use crate::formatter::Formatter;
use crate::instrument::{Instrument, Recorder};
use crate::metric::{Entry, MetricKind, Payload, RawValue};
use crate::sink::Sink;

/// Prefix of every event name the collector listens to.
pub const NAMESPACE: &str = "logmetrics.";

pub struct Collector {
    config: Arc<Config>,
    recorder: Recorder,
    sink: Arc<dyn Sink>,
    bucket: Bucket,
    last_flush: Mutex<Instant>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("config", &self.config)
            .field("buffered", &self.bucket.len())
            .finish_non_exhaustive()
    }
}

impl Collector {
    pub fn new(config: Arc<Config>, bus: Arc<EventBus>, sink: Arc<dyn Sink>) -> Self {
        Collector {
            config,
            recorder: Recorder::new(bus),
            sink,
            bucket: Bucket::new(),
            last_flush: Mutex::new(Instant::now()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        self.recorder.bus()
    }

    /// A publishing handle bound to this collector's bus.
    pub fn recorder(&self) -> Recorder {
        self.recorder.clone()
    }

    /// Number of entries waiting for the next flush.
    pub fn buffered(&self) -> usize {
        self.bucket.len()
    }

    /// Routes every namespaced bus event to [`Collector::deliver`].
    ///
    /// The subscription holds only a weak reference, so it never keeps the
    /// collector alive. It stays registered until passed to [`Collector::detach`].
    pub fn attach(self: &Arc<Self>) -> Subscription {
        let collector = Arc::downgrade(self);
        self.bus().subscribe(NAMESPACE, move |name, payload| {
            if let Some(collector) = collector.upgrade() {
                collector.deliver(name, payload);
            }
        })
    }

    pub fn detach(&self, subscription: Subscription) -> bool {
        self.bus().unsubscribe(subscription)
    }

    /// Handles one inbound event.
    pub fn deliver(&self, name: &str, payload: &Payload) {
        if self.config.silent() {
            return;
        }

        let key = name.strip_prefix(NAMESPACE).unwrap_or(name);
        let Some(kind) = payload.kind else {
            trace!("Dropping {key}: unrecognized metric kind");
            return;
        };

        match self.config.batching_mode() {
            BatchingMode::Immediate => {
                let entry = Entry::new(kind, key, payload.value.coerce());
                self.emit(&[entry]);
            }
            BatchingMode::Interval => {
                self.bucket.add(kind, key, payload.value.clone());
                self.flush_if_due();
            }
        }
    }

    fn flush_if_due(&self) {
        if self.interval_elapsed() {
            debug!("Flush interval elapsed, flushing");
            self.flush(false);
        }

        let max_buffer_size = self.config.max_buffer_size();
        if max_buffer_size > 0 && self.bucket.len() >= max_buffer_size {
            debug!(
                "Bucket reached {max_buffer_size} entries, flushing early (overflow policy: {})",
                self.config.overflow_policy()
            );
            self.flush(true);
        }
    }

    fn interval_elapsed(&self) -> bool {
        match self.config.interval_duration() {
            Some(interval) => self.last_flush().elapsed() >= interval,
            None => false,
        }
    }

    fn last_flush(&self) -> Instant {
        *self.last_flush.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drains the bucket and emits its contents. Returns how many entries were
    /// emitted.
    ///
    /// Without `force`, and with an interval configured, this does nothing
    /// until `interval` seconds have passed since the last flush that emitted
    /// something. That lets a periodic tick call it freely.
    pub fn flush(&self, force: bool) -> usize {
        let mut last_flush = self.last_flush.lock().unwrap_or_else(PoisonError::into_inner);
        if !force {
            if let Some(interval) = self.config.interval_duration() {
                if last_flush.elapsed() < interval {
                    return 0;
                }
            }
        }

        let entries = self.bucket.drain();
        if entries.is_empty() {
            return 0;
        }

        *last_flush = Instant::now();
        debug!("Flushing {} metric entries", entries.len());
        self.emit(&entries);
        entries.len()
    }

    fn emit(&self, entries: &[Entry]) {
        let source = self.config.source();
        let formatter = Formatter::new(source.as_deref(), self.config.max_line_length());
        self.sink.emit(&formatter.format_lines(entries));
    }

    /// Final flush for process shutdown. Only the first call does anything.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let flushed = self.flush(true);
        debug!("Collector shut down after flushing {flushed} entries");
    }
}

impl Instrument for Collector {
    fn record(&self, event: &str, kind: MetricKind, value: RawValue) {
        self.recorder.record(event, kind, value);
    }

    fn record_with<T, F>(&self, event: &str, work: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.recorder.record_with(event, work)
    }
}
