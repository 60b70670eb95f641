// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Concurrency-safe storage for one flush window.
//!
//! Entries live in a single insertion-ordered list. Counts and samples are
//! upserted through an index keyed by `(kind, key)` so repeated writes to the
//! same metric are O(1) no matter how many distinct keys the window holds.
//! Measures are appended unconditionally and never indexed.
//!
//! All mutation happens under one lock, and [`Bucket::drain`] swaps the whole
//! list and index out under that same lock, so every `add` is observed by
//! exactly one drain.

use std::hash::BuildHasherDefault;
use std::sync::{Mutex, MutexGuard, PoisonError};

use fnv::FnvHasher;
use hashbrown::HashMap;
use tracing::trace;
use ustr::Ustr;

use crate::metric::{Entry, MetricKind, RawValue};

type SlotIndex = HashMap<(MetricKind, Ustr), usize, BuildHasherDefault<FnvHasher>>;

#[derive(Debug, Default)]
struct Window {
    entries: Vec<Entry>,
    slots: SlotIndex,
}

impl Window {
    fn insert(&mut self, kind: MetricKind, key: Ustr, value: f64) {
        if kind == MetricKind::Measure {
            self.entries.push(Entry { kind, key, value });
            return;
        }

        match self.slots.get(&(kind, key)) {
            Some(&slot) => {
                let entry = &mut self.entries[slot];
                if kind == MetricKind::Count {
                    entry.value += value;
                } else {
                    entry.value = value;
                }
            }
            None => {
                self.slots.insert((kind, key), self.entries.len());
                self.entries.push(Entry { kind, key, value });
            }
        }
    }
}

/// In-memory aggregator holding the entries of the current flush window.
#[derive(Debug, Default)]
pub struct Bucket {
    window: Mutex<Window>,
}

impl Bucket {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // The window holds plain data, so a panic while it was locked cannot leave
    // it half-updated in a way later callers would care about.
    fn window(&self) -> MutexGuard<'_, Window> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Coerces `value` and folds it into the window: counts sum, samples keep
    /// the last value, measures append.
    pub fn add(&self, kind: MetricKind, key: &str, value: impl Into<RawValue>) {
        let value = value.into().coerce();
        let key = Ustr::from(key);
        self.window().insert(kind, key, value);
    }

    /// Same as [`Bucket::add`] for a free-form kind label. Labels that are not
    /// a known metric kind are ignored.
    pub fn add_labeled(&self, label: &str, key: &str, value: impl Into<RawValue>) {
        match label.parse() {
            Ok(kind) => self.add(kind, key, value),
            Err(e) => trace!("Ignoring {key}: {e}"),
        }
    }

    /// Number of entries in the window. Every measure counts individually.
    pub fn len(&self) -> usize {
        self.window().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window().entries.is_empty()
    }

    /// Takes every entry in first-insertion order and leaves the bucket empty.
    pub fn drain(&self) -> Vec<Entry> {
        let taken = std::mem::take(&mut *self.window());
        taken.entries
    }

    pub fn clear(&self) {
        let mut window = self.window();
        window.entries.clear();
        window.slots.clear();
    }
}
