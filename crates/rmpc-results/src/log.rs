//! Append-only closed-loop trajectory log.

use crate::types::LogEntry;
use crate::{ResultsError, ResultsResult};

/// Ordered record of closed-loop steps. Entries are only ever appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrajectoryLog {
    entries: Vec<LogEntry>,
}

impl TrajectoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next step. Step indices must be consecutive from zero and
    /// time must not go backwards.
    pub fn append(&mut self, entry: LogEntry) -> ResultsResult<()> {
        if entry.step != self.entries.len() {
            return Err(ResultsError::OutOfOrder {
                what: format!(
                    "expected step {}, got {}",
                    self.entries.len(),
                    entry.step
                ),
            });
        }
        if let Some(last) = self.entries.last()
            && !(entry.time >= last.time)
        {
            return Err(ResultsError::OutOfOrder {
                what: format!("time {} after {}", entry.time, last.time),
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    /// Rebuild a log from stored entries, re-checking their order.
    pub fn from_entries(entries: impl IntoIterator<Item = LogEntry>) -> ResultsResult<Self> {
        let mut log = Self::new();
        for e in entries {
            log.append(e)?;
        }
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmpc_solver::SolveStatus;

    fn entry(step: usize, time: f64) -> LogEntry {
        LogEntry {
            step,
            time,
            state: vec![time],
            input: vec![1.0],
            status: SolveStatus::Solved,
            fallback: false,
            snapshot: None,
        }
    }

    #[test]
    fn appends_in_order() {
        let mut log = TrajectoryLog::new();
        log.append(entry(0, 0.0)).unwrap();
        log.append(entry(1, 0.5)).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.last().unwrap().step, 1);
    }

    #[test]
    fn rejects_gaps_and_time_reversal() {
        let mut log = TrajectoryLog::new();
        log.append(entry(0, 1.0)).unwrap();
        assert!(log.append(entry(2, 2.0)).is_err());
        assert!(log.append(entry(1, 0.5)).is_err());
        assert_eq!(log.len(), 1);
    }
}
