// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Packs aggregated entries into byte-bounded text lines.
//!
//! ```text
//! [source=<id> ]<kind>#<key>=<value>[ <kind>#<key>=<value>]*
//! ```
//!
//! Tokens are packed greedily: each one joins the current line, separated by a
//! single space, while the line stays within `max_line_length` bytes. A token
//! that does not fit starts the next line. A token too long to fit even on an
//! empty line is still emitted whole on a line of its own; nothing is ever
//! truncated or dropped.

use crate::metric::Entry;

pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatter {
    prefix: String,
    max_line_length: usize,
}

impl Default for Formatter {
    fn default() -> Self {
        Formatter::new(None, DEFAULT_MAX_LINE_LENGTH)
    }
}

impl Formatter {
    /// `source`, when present, is prepended to every line as `source=<id> `
    /// and counts toward that line's byte limit.
    #[must_use]
    pub fn new(source: Option<&str>, max_line_length: usize) -> Self {
        Formatter {
            prefix: source.map(|s| format!("source={s} ")).unwrap_or_default(),
            max_line_length,
        }
    }

    pub fn format_lines(&self, entries: &[Entry]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current = String::new();

        for entry in entries {
            let token = entry.to_string();
            if current.is_empty() {
                current = self.start_line(&token);
            } else if current.len() + 1 + token.len() > self.max_line_length {
                lines.push(std::mem::replace(&mut current, self.start_line(&token)));
            } else {
                current.push(' ');
                current.push_str(&token);
            }
        }

        if !current.is_empty() {
            lines.push(current);
        }
        lines
    }

    fn start_line(&self, token: &str) -> String {
        let mut line = String::with_capacity(self.prefix.len() + token.len());
        line.push_str(&self.prefix);
        line.push_str(token);
        line
    }
}
