// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log-based metrics.
//!
//! Instrumented code publishes named events (`logmetrics.<key>`) on an
//! [`event_bus::EventBus`]. A [`collector::Collector`] subscribed to the bus
//! turns them into entries, aggregates them in a [`bucket::Bucket`] and writes
//! them through a [`sink::Sink`] as single-line, space-separated tokens:
//!
//! ```text
//! source=web.1 count#requests=42.0 measure#db.query=12.5 sample#queue.depth=7.0
//! ```
//!
//! Counts are summed per key, samples keep the latest value per key and every
//! measure observation is kept. Lines never exceed the configured byte length
//! unless a single token is longer on its own.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod bucket;
pub mod collector;
pub mod config;
pub mod errors;
pub mod event_bus;
pub mod formatter;
pub mod instrument;
pub mod metric;
pub mod sink;
pub mod ticker;
