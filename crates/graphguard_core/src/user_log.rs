//! User-visible notification channel.
//!
//! # Responsibility
//! - Collect invariant/signal violations, fix failures and warnings for the
//!   surrounding request layer.
//! - Mirror every entry to the diagnostic log.

use crate::rules::Violation;
use log::{error, info, warn};
use serde::Serialize;
use std::cell::RefCell;

/// Channel an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserLogLevel {
    Error,
    Warning,
    Info,
    Invariant,
    Signal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserLogEntry {
    pub level: UserLogLevel,
    pub message: String,
}

/// Append-only message list, drained by the caller.
#[derive(Debug, Default)]
pub struct UserLog {
    entries: RefCell<Vec<UserLogEntry>>,
}

impl UserLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!("event=user_log module=user_log level=error message={message}");
        self.push(UserLogLevel::Error, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("event=user_log module=user_log level=warning message={message}");
        self.push(UserLogLevel::Warning, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!("event=user_log module=user_log level=info message={message}");
        self.push(UserLogLevel::Info, message);
    }

    /// Reports a violation on the invariant or signal channel of its rule.
    pub fn violation(&self, violation: &Violation<'_>) {
        let rule = violation.rule();
        let level = if rule.is_invariant() {
            UserLogLevel::Invariant
        } else {
            UserLogLevel::Signal
        };
        let message = format!("{}: {}", rule.violation_heading(), violation.message());
        info!(
            "event=user_log module=user_log level={:?} rule={} src={} tgt={}",
            level,
            rule.id(),
            violation.src(),
            violation.tgt()
        );
        self.push(level, message);
    }

    fn push(&self, level: UserLogLevel, message: String) {
        self.entries.borrow_mut().push(UserLogEntry { level, message });
    }

    pub fn entries(&self) -> Vec<UserLogEntry> {
        self.entries.borrow().clone()
    }

    pub fn count(&self, level: UserLogLevel) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.level == level)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Returns and clears all entries.
    pub fn drain(&self) -> Vec<UserLogEntry> {
        std::mem::take(&mut *self.entries.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::{UserLog, UserLogLevel};

    #[test]
    fn drain_empties_the_log() {
        let log = UserLog::new();
        log.error("boom");
        log.warning("careful");

        assert_eq!(log.count(UserLogLevel::Error), 1);
        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1].level, UserLogLevel::Warning);
        assert!(log.is_empty());
    }
}
