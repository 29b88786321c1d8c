//! Internal error channel.
//!
//! Every failed request verification and every internal resource error ends up in the
//! [ErrorLog]. The log keeps the most recent entries and counts all entries ever logged.
use super::tc::RequestId;
use super::ErrorCode;
use alloc::collections::VecDeque;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

pub const DEFAULT_ERROR_LOG_CAPACITY: usize = 64;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    Acceptance,
    Start,
    Progress,
    Completion,
    Routing,
    /// Resource errors like full tables, which are not reported to the requester.
    Internal,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LoggedError {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub request: Option<RequestId>,
    pub step: Option<u16>,
}

/// Bounded log of the most recent errors. The oldest entry is dropped once the log is full.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    entries: VecDeque<LoggedError>,
    capacity: usize,
    total: u64,
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_LOG_CAPACITY)
    }
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            total: 0,
        }
    }

    pub fn log(&mut self, entry: LoggedError) {
        match entry.kind {
            ErrorKind::Internal => error!(code = ?entry.code, "internal error"),
            kind => warn!(
                ?kind,
                code = ?entry.code,
                request = entry.request.map(|id| id.raw()),
                step = entry.step,
                "request verification failure"
            ),
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        self.total += 1;
    }

    /// Log an internal error which is not related to a specific request.
    pub fn log_internal(&mut self, code: ErrorCode) {
        self.log(LoggedError {
            kind: ErrorKind::Internal,
            code,
            request: None,
            step: None,
        });
    }

    /// Retained entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &LoggedError> {
        self.entries.iter()
    }

    #[inline]
    pub fn last(&self) -> Option<&LoggedError> {
        self.entries.back()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of errors logged since creation, including dropped entries.
    #[inline]
    pub fn total_count(&self) -> u64 {
        self.total
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
