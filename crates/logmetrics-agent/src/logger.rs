// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Diagnostic log format for the agent.
//!
//! ```text
//! LOGMETRICS | LEVEL | [(target) ][span_name{span_fields}:] message {event_fields}
//! ```
//!
//! Events from the logmetrics crates carry no target; anything else (tokio,
//! a host library) is tagged with its target so it stands out. Diagnostics go
//! to stderr; stdout carries only metric lines.

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

fn is_own_target(target: &str) -> bool {
    target
        .split("::")
        .next()
        .is_some_and(|krate| krate == "logmetrics" || krate == "logmetrics_agent")
}

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "LOGMETRICS | {} | ", metadata.level())?;
        if !is_own_target(metadata.target()) {
            write!(writer, "({}) ", metadata.target())?;
        }

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn own_targets_are_recognized() {
        assert!(is_own_target("logmetrics::collector"));
        assert!(is_own_target("logmetrics_agent"));
        assert!(!is_own_target("logmetrics_extra::x"));
        assert!(!is_own_target("tokio::runtime"));
    }

    #[test]
    fn lines_carry_prefix_level_and_spans() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt::Subscriber::builder()
            .with_ansi(false)
            .event_format(Formatter)
            .with_writer(captured.clone())
            .with_max_level(tracing::Level::DEBUG)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("agent started");
            tracing::warn!(target: "tokio::signal", "handler lost");
            let span = tracing::debug_span!("flush", entries = 3);
            let _guard = span.enter();
            tracing::debug!(lines = 1, "Flushed");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines[0], "LOGMETRICS | INFO | agent started");
        assert_eq!(lines[1], "LOGMETRICS | WARN | (tokio::signal) handler lost");
        assert_eq!(lines[2], "LOGMETRICS | DEBUG | flush{entries=3}: Flushed lines=1");
    }
}
