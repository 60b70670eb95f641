// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Metric kinds, inbound payloads and the aggregated entries emitted on flush.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use derive_more::Display;
use serde::{Deserialize, Deserializer};
use ustr::Ustr;

use crate::errors::ParseError;

/// The three metric types understood by the bucket. No other kinds exist:
/// labels that do not parse into one of these are dropped at ingestion.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Summed across a flush window.
    #[display("count")]
    Count,
    /// Individual observation of a distribution, kept one entry per call.
    #[display("measure")]
    Measure,
    /// Instantaneous gauge, last write wins.
    #[display("sample")]
    Sample,
}

impl FromStr for MetricKind {
    type Err = ParseError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let label = label.trim();
        if label.eq_ignore_ascii_case("count") {
            Ok(MetricKind::Count)
        } else if label.eq_ignore_ascii_case("measure") {
            Ok(MetricKind::Measure)
        } else if label.eq_ignore_ascii_case("sample") {
            Ok(MetricKind::Sample)
        } else {
            Err(ParseError::UnsupportedKind(label.to_string()))
        }
    }
}

/// A value as it arrives from a call site, before coercion.
///
/// Coercion never fails. Text is read up to the end of its leading decimal
/// number (`"12ms"` is `12.0`, `"1.0.0"` is `1.0`) and anything without one,
/// like a missing value, becomes `0.0`. This keeps the metrics path from ever
/// rejecting a call, at the cost of turning garbage input into zeros that are
/// indistinguishable from real ones downstream.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
    #[default]
    Missing,
}

impl RawValue {
    #[must_use]
    pub fn coerce(&self) -> f64 {
        match self {
            RawValue::Number(n) => *n,
            RawValue::Text(text) => leading_number(text),
            RawValue::Missing => 0.0,
        }
    }
}

/// Longest prefix of `text` (after leading whitespace) that reads as a decimal
/// float, or `0.0` when there is none.
fn leading_number(text: &str) -> f64 {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let digits_from = |mut at: usize| {
        while at < bytes.len() && bytes[at].is_ascii_digit() {
            at += 1;
        }
        at
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let integral_start = end;
    end = digits_from(end);
    let mut has_digits = end > integral_start;

    if bytes.get(end) == Some(&b'.') {
        let fraction_end = digits_from(end + 1);
        if fraction_end > end + 1 {
            has_digits = true;
            end = fraction_end;
        } else if has_digits {
            // "5." reads as 5
            end += 1;
        }
    }
    if !has_digits {
        return 0.0;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exponent = end + 1;
        if matches!(bytes.get(exponent), Some(b'+' | b'-')) {
            exponent += 1;
        }
        let exponent_end = digits_from(exponent);
        if exponent_end > exponent {
            end = exponent_end;
        }
    }

    text[..end].parse().unwrap_or(0.0)
}

macro_rules! raw_value_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for RawValue {
                #[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
                fn from(value: $t) -> Self {
                    RawValue::Number(value as f64)
                }
            }
        )*
    };
}

raw_value_from_number!(f64, f32, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<Duration> for RawValue {
    fn from(value: Duration) -> Self {
        RawValue::Number(value.as_secs_f64())
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(RawValue::Missing, Into::into)
    }
}

/// What travels on the bus for a single metric event.
///
/// `kind` is `None` when the publisher used a label that is not a known
/// metric kind; the collector drops those without error.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Payload {
    #[serde(default, deserialize_with = "lenient_kind")]
    pub kind: Option<MetricKind>,
    #[serde(default)]
    pub value: RawValue,
}

impl Payload {
    pub fn new(kind: MetricKind, value: impl Into<RawValue>) -> Self {
        Payload {
            kind: Some(kind),
            value: value.into(),
        }
    }

    /// Builds a payload from a free-form kind label.
    pub fn labeled(label: &str, value: impl Into<RawValue>) -> Self {
        Payload {
            kind: label.parse().ok(),
            value: value.into(),
        }
    }
}

fn lenient_kind<'de, D>(deserializer: D) -> Result<Option<MetricKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let label = Option::<String>::deserialize(deserializer)?;
    Ok(label.and_then(|label| label.parse().ok()))
}

/// One aggregated row of a bucket, as handed to the formatter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    pub kind: MetricKind,
    pub key: Ustr,
    pub value: f64,
}

impl Entry {
    pub fn new(kind: MetricKind, key: impl AsRef<str>, value: f64) -> Self {
        Entry {
            kind,
            key: Ustr::from(key.as_ref()),
            value,
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}=", self.kind, self.key)?;
        write_value(f, self.value)
    }
}

// Integral values keep a trailing ".0" so counts read as floats on the wire.
const INTEGRAL_RENDER_LIMIT: f64 = 1e16;

fn write_value(f: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < INTEGRAL_RENDER_LIMIT {
        write!(f, "{value:.1}")
    } else {
        write!(f, "{value}")
    }
}
