// ===============================
// src/market.rs (shared state satu run)
// ===============================
//
// Semua state lintas-aktor (pool, ledger vendor/customer, activity log)
// ada di sini, di balik satu Mutex per run. Setiap tick aktor berjalan
// sinkron di bawah lock tsb, jadi tryEnqueueMany / tryDequeueOne / size
// tidak pernah saling menyela.
//
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ahash::AHashMap as HashMap;
use tokio::sync::mpsc;
use tracing::info;

use crate::activity::ActivityLog;
use crate::domain::{
    customer_label, vendor_label, ActivityEntry, Event, RunSummary, SimConfig, Tallies, Ticket,
};
use crate::metrics::POOL_SIZE;
use crate::pool::TicketPool;

pub type SharedMarket = Arc<Mutex<Market>>;

/// Lock the market, recovering the guard if a previous holder panicked.
pub fn lock(market: &Mutex<Market>) -> MutexGuard<'_, Market> {
    market.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase { Running, Stopped }

/// `Draining` = last tick found no pool capacity; it retries next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorPhase { Active, Draining, Exhausted }

#[derive(Debug, Clone)]
pub struct VendorLedger {
    pub id: String,
    pub phase: VendorPhase,
    pub released: u64,
    pub sold: u64,
}

#[derive(Debug, Clone)]
pub struct CustomerLedger {
    pub id: String,
    pub exhausted: bool,
    /// ids of tickets this customer now owns
    pub tickets: Vec<String>,
}

#[derive(Debug)]
pub struct Market {
    pub config: SimConfig,
    pub pool: TicketPool,
    pub vendors: Vec<VendorLedger>,
    pub customers: Vec<CustomerLedger>,
    vendor_index: HashMap<String, usize>,
    log: ActivityLog,
    recorder: Option<mpsc::Sender<Event>>,
    phase: RunPhase,
    summary: Option<RunSummary>,
}

impl Market {
    /// `slices` is only inspected for emptiness: a vendor with nothing
    /// assigned starts out `Exhausted`.
    pub fn new(
        config: SimConfig,
        slices: &[VecDeque<Ticket>],
        log_capacity: usize,
        recorder: Option<mpsc::Sender<Event>>,
    ) -> Self {
        let vendors: Vec<VendorLedger> = slices
            .iter()
            .enumerate()
            .map(|(i, s)| VendorLedger {
                id: vendor_label(i),
                phase: if s.is_empty() { VendorPhase::Exhausted } else { VendorPhase::Active },
                released: 0,
                sold: 0,
            })
            .collect();
        let vendor_index = vendors.iter().enumerate().map(|(i, v)| (v.id.clone(), i)).collect();
        let customers = (0..config.customer_count)
            .map(|i| CustomerLedger { id: customer_label(i), exhausted: false, tickets: Vec::new() })
            .collect();

        Self {
            pool: TicketPool::new(config.max_ticket_capacity),
            config,
            vendors,
            customers,
            vendor_index,
            log: ActivityLog::new(log_capacity),
            recorder,
            phase: RunPhase::Running,
            summary: None,
        }
    }

    /// Append to the activity log, mirror to tracing and the recorder.
    pub fn note(&mut self, message: String) {
        let entry = self.log.push(message);
        info!(seq = entry.seq, "{}", entry.message);
        if let Some(tx) = &self.recorder {
            // recorder lambat -> event dibuang, tick tidak boleh blok
            let _ = tx.try_send(Event::Activity(entry.clone()));
        }
    }

    pub fn vendor_index_of(&self, vendor_id: &str) -> Option<usize> {
        self.vendor_index.get(vendor_id).copied()
    }

    pub fn is_running(&self) -> bool { self.phase == RunPhase::Running }

    pub fn all_vendors_exhausted(&self) -> bool {
        self.vendors.iter().all(|v| v.phase == VendorPhase::Exhausted)
    }

    pub fn tickets_sold(&self) -> u64 { self.vendors.iter().map(|v| v.sold).sum() }

    pub fn tickets_purchased(&self) -> u64 {
        self.customers.iter().map(|c| c.tickets.len() as u64).sum()
    }

    pub fn sync_pool_gauge(&self) { POOL_SIZE.set(self.pool.size() as i64); }

    pub fn summary(&self) -> Option<&RunSummary> { self.summary.as_ref() }

    pub fn log_tail(&self, n: usize) -> Vec<ActivityEntry> { self.log.tail(n) }
    pub fn log_snapshot(&self) -> Vec<ActivityEntry> { self.log.snapshot() }
    pub fn log_appended(&self) -> u64 { self.log.appended() }

    /// Transition to `Stopped` and freeze the summary. Every later tick sees
    /// `is_running() == false` and retires without touching state. Calling it
    /// again returns the frozen summary.
    pub fn finish(&mut self, completed: bool) -> RunSummary {
        if let Some(s) = &self.summary {
            return s.clone();
        }
        if completed {
            self.note("All tickets sold. Simulation complete.".to_string());
        } else {
            self.note("Stopping simulation...".to_string());
        }
        self.phase = RunPhase::Stopped;

        let summary = RunSummary {
            vendor_sales: Tallies(self.vendors.iter().map(|v| (v.id.clone(), v.sold)).collect()),
            vendor_releases: Tallies(self.vendors.iter().map(|v| (v.id.clone(), v.released)).collect()),
            customer_purchases: Tallies(
                self.customers.iter().map(|c| (c.id.clone(), c.tickets.len() as u64)).collect(),
            ),
            total_tickets_sold: self.tickets_sold(),
            total_tickets_purchased: self.tickets_purchased(),
            completed,
            config: self.config.clone(),
        };
        if let Some(tx) = &self.recorder {
            let _ = tx.try_send(Event::Summary(summary.clone()));
        }
        self.summary = Some(summary.clone());
        summary
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::inventory::partition;

    pub(crate) fn cfg(total: usize, cap: usize, per_release: usize, vendors: usize, customers: usize) -> SimConfig {
        SimConfig {
            total_tickets: total,
            max_ticket_capacity: cap,
            tickets_per_release: per_release,
            release_interval_ms: 100,
            retrieval_interval_ms: 50,
            vendor_count: vendors,
            customer_count: customers,
        }
    }

    #[test]
    fn empty_slices_start_exhausted() {
        let slices = partition(1, 3);
        let m = Market::new(cfg(1, 5, 5, 3, 1), &slices, 10, None);
        let phases: Vec<VendorPhase> = m.vendors.iter().map(|v| v.phase).collect();
        assert_eq!(phases, vec![VendorPhase::Active, VendorPhase::Exhausted, VendorPhase::Exhausted]);
        assert_eq!(m.vendor_index_of("Vendor-2"), Some(2));
        assert_eq!(m.vendor_index_of("Vendor-9"), None);
    }

    #[test]
    fn finish_is_frozen_after_first_call() {
        let slices = partition(4, 2);
        let mut m = Market::new(cfg(4, 5, 5, 2, 2), &slices, 10, None);
        let first = m.finish(false);
        let appended = m.log_appended();
        let second = m.finish(true);
        assert_eq!(first, second);
        assert!(!first.completed);
        assert!(!m.is_running());
        assert_eq!(m.log_appended(), appended);
    }

    #[test]
    fn recorder_receives_activity_and_summary() {
        let (tx, mut rx) = mpsc::channel(16);
        let slices = partition(2, 1);
        let mut m = Market::new(cfg(2, 5, 5, 1, 1), &slices, 10, Some(tx));
        m.note("hello".into());
        m.finish(false);
        assert!(matches!(rx.try_recv(), Ok(Event::Activity(e)) if e.message == "hello"));
        assert!(matches!(rx.try_recv(), Ok(Event::Activity(_))));
        assert!(matches!(rx.try_recv(), Ok(Event::Summary(s)) if s.total_tickets_sold == 0));
    }
}
