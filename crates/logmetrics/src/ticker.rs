// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Optional background tick for interval mode.
//!
//! Without it, a quiet process keeps its last entries buffered until the next
//! event arrives. The ticker calls [`Collector::flush`] with `force = false`, so
//! it only emits once the configured interval has actually passed.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::collector::Collector;

const MIN_PERIOD: Duration = Duration::from_millis(10);
const MAX_PERIOD: Duration = Duration::from_secs(1);

pub struct FlushTicker {
    collector: Arc<Collector>,
    period: Duration,
    cancel_token: CancellationToken,
}

impl FlushTicker {
    #[must_use]
    pub fn new(collector: Arc<Collector>, period: Duration, cancel_token: CancellationToken) -> Self {
        FlushTicker {
            collector,
            period: period.max(MIN_PERIOD),
            cancel_token,
        }
    }

    /// Half of `interval`, clamped to `[10ms, 1s]`.
    #[must_use]
    pub fn period_for(interval: Duration) -> Duration {
        (interval / 2).clamp(MIN_PERIOD, MAX_PERIOD)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Ticks until the cancel token fires. The first tick is skipped.
    pub async fn run(self) {
        let mut ticks = interval(self.period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticks.tick().await;

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    let flushed = self.collector.flush(false);
                    if flushed > 0 {
                        debug!("Tick flushed {flushed} entries");
                    }
                }
                () = self.cancel_token.cancelled() => {
                    debug!("Flush ticker stopped");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatchingMode, Config, Settings};
    use crate::event_bus::EventBus;
    use crate::metric::MetricKind;
    use crate::metric::Payload;
    use crate::sink::{MemorySink, Sink};

    fn interval_collector(secs: f64) -> (Arc<Collector>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let config = Config::from(Settings {
            batching_mode: BatchingMode::Interval,
            interval: secs,
            ..Default::default()
        });
        let collector = Collector::new(
            Arc::new(config),
            Arc::new(EventBus::new()),
            Arc::clone(&sink) as Arc<dyn Sink>,
        );
        (Arc::new(collector), sink)
    }

    #[test]
    fn period_is_half_the_interval_within_bounds() {
        assert_eq!(
            FlushTicker::period_for(Duration::from_secs(1)),
            Duration::from_millis(500)
        );
        assert_eq!(
            FlushTicker::period_for(Duration::from_millis(4)),
            Duration::from_millis(10)
        );
        assert_eq!(
            FlushTicker::period_for(Duration::from_secs(60)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn zero_period_is_raised_to_the_minimum() {
        let (collector, _) = interval_collector(1.0);
        let ticker = FlushTicker::new(collector, Duration::ZERO, CancellationToken::new());
        assert_eq!(ticker.period(), MIN_PERIOD);
    }

    #[tokio::test]
    async fn ticker_flushes_a_quiet_bucket() {
        let (collector, sink) = interval_collector(0.05);
        collector.deliver("logmetrics.requests", &Payload::new(MetricKind::Count, 5));
        assert!(sink.lines().is_empty());

        let cancel_token = CancellationToken::new();
        let ticker = FlushTicker::new(
            Arc::clone(&collector),
            FlushTicker::period_for(Duration::from_millis(50)),
            cancel_token.clone(),
        );
        let handle = tokio::spawn(ticker.run());

        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel_token.cancel();
        handle.await.expect("ticker task panicked");

        assert_eq!(sink.lines(), vec!["count#requests=5.0"]);
    }

    #[tokio::test]
    async fn cancelled_ticker_returns() {
        let (collector, sink) = interval_collector(60.0);
        collector.deliver("logmetrics.requests", &Payload::new(MetricKind::Count, 5));

        let cancel_token = CancellationToken::new();
        cancel_token.cancel();
        FlushTicker::new(collector, Duration::from_millis(10), cancel_token)
            .run()
            .await;

        assert!(sink.lines().is_empty());
    }
}
