use chrono::{DateTime, Local};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub kind: EntryKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Connection and save status.
    Info,
    /// A record that made it into the accumulator.
    Record,
    /// Lesser problems, e.g. a record without a usable RSSI.
    Notice,
    Error,
}

impl EntryKind {
    fn prefix(&self) -> &'static str {
        match self {
            EntryKind::Info => "",
            EntryKind::Record => "RX: ",
            EntryKind::Notice => "NOTE: ",
            EntryKind::Error => "ERR: ",
        }
    }
}

/// Scrolling event log shown to the user. Oldest entries fall off once
/// `max_entries` is reached.
pub struct LogStore {
    entries: VecDeque<LogEntry>,
    max_entries: usize,
}

impl LogStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn push(&mut self, kind: EntryKind, text: impl Into<String>) {
        self.entries.push_back(LogEntry {
            timestamp: Local::now(),
            kind,
            text: text.into(),
        });

        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, kind: EntryKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn to_text(&self, show_timestamp: bool) -> String {
        let mut result = String::new();
        for entry in &self.entries {
            if show_timestamp {
                result.push_str(&entry.timestamp.format("[%H:%M:%S%.3f] ").to_string());
            }
            result.push_str(entry.kind.prefix());
            result.push_str(&entry.text);
            if !entry.text.ends_with('\n') {
                result.push('\n');
            }
        }
        result
    }
}
