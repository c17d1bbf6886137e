//! Per-function call accounting.

/// Attempt counters for the overloads of one function.
///
/// Slot `i` counts the calls that tried overload `i`, whether or not it
/// matched. A trailing slot counts calls that no overload accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallLedger {
    counts: Vec<u64>,
}

impl CallLedger {
    /// A ledger for a function with `overloads` overloads.
    pub fn new(overloads: usize) -> Self {
        Self {
            counts: vec![0; overloads + 1],
        }
    }

    /// Number of overloads tracked.
    pub fn overloads(&self) -> usize {
        self.counts.len() - 1
    }

    /// How many calls tried the overload at `index`.
    pub fn attempts(&self, index: usize) -> u64 {
        if index < self.overloads() {
            self.counts[index]
        } else {
            0
        }
    }

    /// How many calls matched no overload.
    pub fn unmatched(&self) -> u64 {
        self.counts[self.counts.len() - 1]
    }

    /// Count an attempt of overload `index` and return the new count.
    pub(crate) fn record_attempt(&mut self, index: usize) -> u64 {
        let count = &mut self.counts[index];
        *count = count.saturating_add(1);
        *count
    }

    pub(crate) fn record_unmatched(&mut self) {
        let last = self.counts.len() - 1;
        self.counts[last] = self.counts[last].saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ledger_is_zeroed() {
        let ledger = CallLedger::new(2);
        assert_eq!(ledger.overloads(), 2);
        assert_eq!(ledger.attempts(0), 0);
        assert_eq!(ledger.attempts(1), 0);
        assert_eq!(ledger.unmatched(), 0);
    }

    #[test]
    fn test_record_attempt() {
        let mut ledger = CallLedger::new(2);
        assert_eq!(ledger.record_attempt(1), 1);
        assert_eq!(ledger.record_attempt(1), 2);
        assert_eq!(ledger.attempts(0), 0);
        assert_eq!(ledger.attempts(1), 2);
    }

    #[test]
    fn test_unmatched_slot_is_separate() {
        let mut ledger = CallLedger::new(1);
        ledger.record_unmatched();
        assert_eq!(ledger.unmatched(), 1);
        assert_eq!(ledger.attempts(0), 0);
        assert_eq!(ledger.attempts(1), 0);
    }

    #[test]
    fn test_counter_saturates() {
        let mut ledger = CallLedger::new(1);
        ledger.counts[0] = u64::MAX;
        assert_eq!(ledger.record_attempt(0), u64::MAX);
    }
}
