// ===============================
// src/activity.rs
// ===============================
use std::collections::VecDeque;

use chrono::Utc;

use crate::domain::ActivityEntry;

/// Bounded append-only event log; the oldest entry is evicted once `cap` is
/// reached. Sequence numbers keep increasing across evictions.
#[derive(Debug)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
    cap: usize,
    next_seq: u64,
}

impl ActivityLog {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self { entries: VecDeque::with_capacity(cap), cap, next_seq: 0 }
    }

    pub fn push(&mut self, message: String) -> &ActivityEntry {
        if self.entries.len() == self.cap {
            self.entries.pop_front();
        }
        let entry = ActivityEntry {
            seq: self.next_seq,
            ts_ms: Utc::now().timestamp_millis(),
            message,
        };
        self.next_seq += 1;
        self.entries.push_back(entry);
        &self.entries[self.entries.len() - 1]
    }

    /// Last `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> Vec<ActivityEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<ActivityEntry> { self.entries.iter().cloned().collect() }
    pub fn appended(&self) -> u64 { self.next_seq }
}
