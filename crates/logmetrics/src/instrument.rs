// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Call-site API for publishing metric events.
//!
//! ```rust
//! use std::sync::Arc;
//! use logmetrics::event_bus::EventBus;
//! use logmetrics::instrument::{Instrument, Recorder};
//!
//! let recorder = Recorder::new(Arc::new(EventBus::new()));
//! recorder.increment("requests");
//! recorder.count("bytes_sent", 512);
//! recorder.sample("queue.depth", 12);
//! let answer = recorder.time("compute", || 6 * 7);
//! assert_eq!(answer, 42);
//! ```

use std::sync::Arc;
use std::time::Instant;

use crate::collector::NAMESPACE;
use crate::event_bus::EventBus;
use crate::metric::{MetricKind, Payload, RawValue};

/// Publishes metric events under the collector namespace.
///
/// Implementors provide [`Instrument::record`] and [`Instrument::record_with`];
/// the per-kind helpers are built on top of them.
pub trait Instrument {
    /// Publishes `value` as a `kind` event named `event`.
    fn record(&self, event: &str, kind: MetricKind, value: RawValue);

    /// Runs `work`, publishes its wall-clock duration in seconds as a measure
    /// named `event`, and returns whatever `work` returned.
    fn record_with<T, F>(&self, event: &str, work: F) -> T
    where
        F: FnOnce() -> T;

    fn count(&self, event: &str, by: impl Into<RawValue>) {
        self.record(event, MetricKind::Count, by.into());
    }

    /// Counts one occurrence of `event`.
    fn increment(&self, event: &str) {
        self.count(event, 1);
    }

    fn measure(&self, event: &str, value: impl Into<RawValue>) {
        self.record(event, MetricKind::Measure, value.into());
    }

    fn sample(&self, event: &str, value: impl Into<RawValue>) {
        self.record(event, MetricKind::Sample, value.into());
    }

    fn time<T, F>(&self, event: &str, work: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.record_with(event, work)
    }
}

/// Cheap, cloneable publishing handle. Hand one to every component that
/// records metrics instead of reaching for a global.
#[derive(Debug, Clone)]
pub struct Recorder {
    bus: Arc<EventBus>,
}

impl Recorder {
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Recorder { bus }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}

impl Instrument for Recorder {
    fn record(&self, event: &str, kind: MetricKind, value: RawValue) {
        let name = format!("{NAMESPACE}{event}");
        self.bus.publish(
            &name,
            &Payload {
                kind: Some(kind),
                value,
            },
        );
    }

    fn record_with<T, F>(&self, event: &str, work: F) -> T
    where
        F: FnOnce() -> T,
    {
        let started = Instant::now();
        let result = work();
        self.record(event, MetricKind::Measure, started.elapsed().into());
        result
    }
}
