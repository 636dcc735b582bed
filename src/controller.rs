// ===============================
// src/controller.rs
// ===============================
//
// Satu SimulationController = satu run: Running -> Stopped (terminal).
// Run baru selalu instance baru, tidak pernah melanjutkan yang Stopped.
//
// Semua task aktor ada di satu JoinSet dan berbagi satu watch channel
// sebagai cancellation token. stop() = set phase Stopped di bawah lock
// market, broadcast token, lalu join semua task.
//
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use tokio::time::Duration;
use tracing::{info, warn};

use crate::customer::{self, CustomerActor};
use crate::domain::{ActivityEntry, Event, RunSummary, SimConfig, StatusSnapshot};
use crate::error::SimError;
use crate::inventory;
use crate::market::{lock, Market, SharedMarket, VendorPhase};
use crate::metrics::{publish_config, RUNS_STARTED, RUNS_STOPPED};
use crate::vendor::{self, VendorActor};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub log_capacity: usize,
    pub status_tail: usize,
    pub recorder: Option<mpsc::Sender<Event>>,
}

impl Default for RunOptions {
    fn default() -> Self { Self { log_capacity: 200, status_tail: 50, recorder: None } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    /// supply exhausted
    Completed,
    /// a newer run took its place
    Replaced,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Requested => "requested",
            StopReason::Completed => "completed",
            StopReason::Replaced => "replaced",
        }
    }
}

struct Inner {
    config: SimConfig,
    market: SharedMarket,
    cancel: watch::Sender<bool>,
    tasks: AsyncMutex<JoinSet<()>>,
    status_tail: usize,
}

#[derive(Clone)]
pub struct SimulationController {
    inner: Arc<Inner>,
}

impl SimulationController {
    /// Validate `config`, build the inventory and spawn every actor.
    /// Vendors tick from now on; customers start one release interval later.
    /// Must be called from within a Tokio runtime.
    pub fn start(config: SimConfig, opts: RunOptions) -> Result<Self, SimError> {
        config.validate()?;

        let slices = inventory::partition(config.total_tickets, config.vendor_count);
        let mut market = Market::new(config.clone(), &slices, opts.log_capacity, opts.recorder);
        market.note(format!(
            "Starting simulation: {} tickets across {} vendors, {} customers.",
            config.total_tickets, config.vendor_count, config.customer_count
        ));
        for (i, s) in slices.iter().enumerate() {
            if s.is_empty() {
                market.note(format!("{} has no tickets assigned.", market.vendors[i].id));
            }
        }
        market.sync_pool_gauge();
        let market: SharedMarket = Arc::new(Mutex::new(market));

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (sold_out_tx, sold_out_rx) = mpsc::channel::<()>(1);
        let release_every = Duration::from_millis(config.release_interval_ms);
        let retrieve_every = Duration::from_millis(config.retrieval_interval_ms);

        let mut tasks = JoinSet::new();
        for (idx, slice) in slices.into_iter().enumerate() {
            if slice.is_empty() {
                continue;
            }
            let actor = VendorActor::new(idx, slice, config.tickets_per_release);
            tasks.spawn(vendor::run(actor, market.clone(), release_every, cancel_rx.clone()));
        }
        for idx in 0..config.customer_count {
            tasks.spawn(customer::run(
                CustomerActor::new(idx),
                market.clone(),
                release_every,
                retrieve_every,
                cancel_rx.clone(),
                sold_out_tx.clone(),
            ));
        }
        drop(sold_out_tx);

        let inner = Arc::new(Inner {
            config: config.clone(),
            market,
            cancel: cancel_tx,
            tasks: AsyncMutex::new(tasks),
            status_tail: opts.status_tail,
        });
        tokio::spawn(supervise(Arc::downgrade(&inner), sold_out_rx, cancel_rx));

        RUNS_STARTED.inc();
        publish_config(&config);
        info!(
            total_tickets = config.total_tickets,
            capacity = config.max_ticket_capacity,
            per_release = config.tickets_per_release,
            release_ms = config.release_interval_ms,
            retrieval_ms = config.retrieval_interval_ms,
            vendors = config.vendor_count,
            customers = config.customer_count,
            "simulation started"
        );
        Ok(Self { inner })
    }

    /// Stop on request. Idempotent: later calls return the same summary.
    pub async fn stop(&self) -> RunSummary {
        self.stop_with(StopReason::Requested).await
    }

    /// When this returns, no vendor or customer tick runs anymore.
    pub async fn stop_with(&self, reason: StopReason) -> RunSummary {
        let (summary, first) = {
            let mut m = lock(&self.inner.market);
            match m.summary() {
                Some(s) => (s.clone(), false),
                None => (m.finish(reason == StopReason::Completed), true),
            }
        };

        // send_replace: nilai tetap ter-update walau semua receiver sudah exit
        self.inner.cancel.send_replace(true);

        let mut tasks = self.inner.tasks.lock().await;
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                if e.is_panic() {
                    warn!(?e, "actor task panicked");
                }
            }
        }
        drop(tasks);

        if first {
            RUNS_STOPPED.with_label_values(&[reason.as_str()]).inc();
            let log_entries = lock(&self.inner.market).log_appended();
            info!(
                reason = reason.as_str(),
                log_entries,
                sold = summary.total_tickets_sold,
                purchased = summary.total_tickets_purchased,
                "Simulation stopped. All actors cleared."
            );
        }
        summary
    }

    /// Pool size plus the tail of the activity log.
    pub fn status(&self) -> Result<StatusSnapshot, SimError> {
        let m = lock(&self.inner.market);
        if !m.is_running() {
            return Err(SimError::NoActiveRun);
        }
        Ok(StatusSnapshot {
            pool_size: m.pool.size(),
            recent_logs: m.log_tail(self.inner.status_tail),
            tickets_sold: m.tickets_sold(),
            active_vendors: m.vendors.iter().filter(|v| v.phase != VendorPhase::Exhausted).count(),
            active_customers: m.customers.iter().filter(|c| !c.exhausted).count(),
        })
    }

    /// Resolves once the run reached `Stopped`, whichever path got it there.
    pub async fn finished(&self) {
        let mut rx = self.inner.cancel.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    pub fn is_running(&self) -> bool { lock(&self.inner.market).is_running() }

    pub fn config(&self) -> &SimConfig { &self.inner.config }

    pub fn activity(&self) -> Vec<ActivityEntry> { lock(&self.inner.market).log_snapshot() }
}

/// Natural-completion path: the customer that sold the last ticket signals
/// here and the run stops itself. Holds only a weak ref so a dropped
/// controller is not kept alive.
async fn supervise(run: Weak<Inner>, mut sold_out: mpsc::Receiver<()>, mut cancel: watch::Receiver<bool>) {
    tokio::select! {
        Some(()) = sold_out.recv() => {
            if let Some(inner) = run.upgrade() {
                SimulationController { inner }.stop_with(StopReason::Completed).await;
            }
        }
        _ = cancel.changed() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn scenario() -> SimConfig {
        SimConfig {
            total_tickets: 10,
            max_ticket_capacity: 5,
            tickets_per_release: 5,
            release_interval_ms: 100,
            retrieval_interval_ms: 50,
            vendor_count: 2,
            customer_count: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_runs_to_natural_completion() {
        let ctl = SimulationController::start(scenario(), RunOptions::default()).unwrap();

        // first vendor tick at 100ms fills the pool to capacity
        tokio::time::sleep(Duration::from_millis(101)).await;
        let st = ctl.status().unwrap();
        assert_eq!(st.pool_size, 5);

        tokio::time::timeout(Duration::from_secs(60), ctl.finished()).await.unwrap();
        assert!(!ctl.is_running());

        let summary = ctl.stop().await;
        assert!(summary.completed);
        assert_eq!(summary.vendor_sales.get("Vendor-0"), Some(5));
        assert_eq!(summary.vendor_sales.get("Vendor-1"), Some(5));
        assert_eq!(summary.vendor_releases.get("Vendor-0"), Some(5));
        assert_eq!(summary.vendor_releases.get("Vendor-1"), Some(5));
        assert_eq!(summary.customer_purchases.get("Customer-0"), Some(10));
        assert_eq!(summary.total_tickets_sold, 10);
        assert_eq!(summary.total_tickets_purchased, 10);
        assert_eq!(summary.config, scenario());
    }

    #[tokio::test(start_paused = true)]
    async fn conservation_and_no_double_sale_under_contention() {
        let cfg = SimConfig {
            total_tickets: 97,
            max_ticket_capacity: 4,
            tickets_per_release: 3,
            release_interval_ms: 7,
            retrieval_interval_ms: 3,
            vendor_count: 5,
            customer_count: 9,
        };
        let ctl = SimulationController::start(cfg, RunOptions::default()).unwrap();
        tokio::time::timeout(Duration::from_secs(600), ctl.finished()).await.unwrap();
        let summary = ctl.stop().await;

        assert_eq!(summary.vendor_sales.total(), 97);
        assert_eq!(summary.vendor_releases.total(), 97);
        assert_eq!(summary.customer_purchases.total(), 97);

        let m = lock(&ctl.inner.market);
        let mut seen = HashSet::new();
        for c in &m.customers {
            for id in &c.tickets {
                assert!(seen.insert(id.clone()), "{id} sold twice");
            }
        }
        assert_eq!(seen.len(), 97);
        assert!(m.pool.is_empty());
        for v in &m.vendors {
            assert_eq!(v.released, v.sold);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn customers_wait_one_release_interval() {
        let ctl = SimulationController::start(scenario(), RunOptions::default()).unwrap();
        // customers' first tick would be at 100 + 50 = 150ms
        tokio::time::sleep(Duration::from_millis(140)).await;
        let bought = ctl.activity().iter().filter(|e| e.message.contains("purchased")).count();
        assert_eq!(bought, 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let bought = ctl.activity().iter().filter(|e| e.message.contains("purchased")).count();
        assert_eq!(bought, 1);
        ctl.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let ctl = SimulationController::start(scenario(), RunOptions::default()).unwrap();
        let a = ctl.stop().await;
        let b = ctl.stop().await;
        assert_eq!(a, b);
        assert!(!a.completed);
        assert_eq!(ctl.status().unwrap_err(), SimError::NoActiveRun);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn no_activity_after_stop_returns() {
        let cfg = SimConfig {
            total_tickets: 100_000,
            max_ticket_capacity: 50,
            tickets_per_release: 5,
            release_interval_ms: 1,
            retrieval_interval_ms: 1,
            vendor_count: 8,
            customer_count: 32,
        };
        let ctl = SimulationController::start(cfg, RunOptions::default()).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let racer = {
            let ctl = ctl.clone();
            tokio::spawn(async move { ctl.stop().await })
        };
        let summary = ctl.stop().await;
        let after_stop = lock(&ctl.inner.market).log_appended();
        let last = ctl.activity().last().cloned().unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(lock(&ctl.inner.market).log_appended(), after_stop);
        assert_eq!(ctl.activity().last().cloned().unwrap(), last);
        assert_eq!(racer.await.unwrap(), summary);
    }

    #[tokio::test]
    async fn invalid_config_never_starts() {
        let mut cfg = scenario();
        cfg.customer_count = 0;
        let err = SimulationController::start(cfg, RunOptions::default()).err().unwrap();
        assert!(matches!(err, SimError::InvalidConfig(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn more_vendors_than_tickets_still_completes() {
        let cfg = SimConfig {
            total_tickets: 3,
            max_ticket_capacity: 2,
            tickets_per_release: 1,
            release_interval_ms: 10,
            retrieval_interval_ms: 10,
            vendor_count: 6,
            customer_count: 5,
        };
        let ctl = SimulationController::start(cfg, RunOptions::default()).unwrap();
        tokio::time::timeout(Duration::from_secs(60), ctl.finished()).await.unwrap();
        let s = ctl.stop().await;
        assert!(s.completed);
        assert_eq!(s.total_tickets_sold, 3);
        assert_eq!(s.vendor_sales.get("Vendor-5"), Some(0));
    }
}
