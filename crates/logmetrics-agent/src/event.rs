// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Stdin wire format: one JSON object per line.
//!
//! ```text
//! {"name": "requests", "kind": "count", "value": 1}
//! {"name": "db.query", "kind": "measure", "value": "12.5"}
//! ```

use logmetrics::instrument::Instrument;
use logmetrics::metric::Payload;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundEvent {
    pub name: String,
    #[serde(flatten)]
    pub payload: Payload,
}

/// Parses one stdin line. Blank and malformed lines yield `None`.
pub fn parse_line(line: &str) -> Option<InboundEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<InboundEvent>(line) {
        Ok(event) if event.name.trim().is_empty() => {
            debug!("Skipping event without a name: {line}");
            None
        }
        Ok(event) => Some(event),
        Err(e) => {
            debug!("Skipping malformed event {line}: {e}");
            None
        }
    }
}

/// Publishes a parsed event. Returns `false` when its kind is not recognized.
pub fn publish(instrument: &impl Instrument, event: InboundEvent) -> bool {
    match event.payload.kind {
        Some(kind) => {
            instrument.record(event.name.trim(), kind, event.payload.value);
            true
        }
        None => {
            debug!("Skipping {}: unrecognized metric kind", event.name);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logmetrics::metric::{MetricKind, RawValue};
    use std::cell::RefCell;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct Recorded(RefCell<Vec<(String, MetricKind, RawValue)>>);

    impl Instrument for Recorded {
        fn record(&self, event: &str, kind: MetricKind, value: RawValue) {
            self.0.borrow_mut().push((event.to_string(), kind, value));
        }

        fn record_with<T, F>(&self, _event: &str, work: F) -> T
        where
            F: FnOnce() -> T,
        {
            work()
        }
    }

    #[test]
    fn parses_numeric_and_text_values() {
        let event = parse_line(r#"{"name":"requests","kind":"count","value":5}"#);
        assert_eq!(
            event,
            Some(InboundEvent {
                name: "requests".to_string(),
                payload: Payload::new(MetricKind::Count, 5),
            })
        );

        let event = parse_line(r#" {"name":"version","kind":"Sample","value":"1.0.0"} "#);
        assert_eq!(
            event.map(|e| e.payload),
            Some(Payload::new(MetricKind::Sample, "1.0.0"))
        );
    }

    #[test]
    fn missing_or_null_values_are_kept_as_missing() {
        for line in [
            r#"{"name":"requests","kind":"count"}"#,
            r#"{"name":"requests","kind":"count","value":null}"#,
        ] {
            let event = parse_line(line).unwrap();
            assert_eq!(event.payload.value, RawValue::Missing);
        }
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("   "), None);
    }

    #[test]
    #[traced_test]
    fn malformed_lines_are_logged_and_skipped() {
        assert_eq!(parse_line("not json"), None);
        assert_eq!(parse_line(r#"{"kind":"count","value":1}"#), None);
        assert_eq!(parse_line(r#"{"name":"  ","kind":"count","value":1}"#), None);
        assert!(logs_contain("Skipping malformed event not json"));
        assert!(logs_contain("Skipping event without a name"));
    }

    #[test]
    fn unknown_kinds_parse_but_are_not_published() {
        let event = parse_line(r#"{"name":"latency","kind":"histogram","value":3}"#).unwrap();
        assert_eq!(event.payload.kind, None);

        let recorded = Recorded::default();
        assert!(!publish(&recorded, event));
        assert!(recorded.0.borrow().is_empty());
    }

    #[test]
    fn known_kinds_are_published_by_name() {
        let recorded = Recorded::default();
        let event = parse_line(r#"{"name":"db.query","kind":"measure","value":"12.5"}"#).unwrap();

        assert!(publish(&recorded, event));
        assert_eq!(
            recorded.0.borrow().as_slice(),
            &[(
                "db.query".to_string(),
                MetricKind::Measure,
                RawValue::Text("12.5".to_string())
            )]
        );
    }
}
