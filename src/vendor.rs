// ===============================
// src/vendor.rs
// ===============================
//
// Vendor: tiap tick pindahkan maksimal `tickets_per_release` tiket dari slice
// miliknya ke pool, dibatasi sisa kapasitas pool.
//   Active -> Draining (pool penuh, coba lagi tick berikut) -> Exhausted
// Slice hanya disentuh oleh task vendor itu sendiri.
//
use std::collections::VecDeque;

use tokio::sync::watch;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::debug;

use crate::domain::{vendor_label, Ticket};
use crate::market::{lock, Market, SharedMarket, VendorPhase};
use crate::metrics::{POOL_FULL, TICKETS_RELEASED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow { Continue, Retire }

pub struct VendorActor {
    idx: usize,
    id: String,
    slice: VecDeque<Ticket>,
    per_release: usize,
}

impl VendorActor {
    pub fn new(idx: usize, slice: VecDeque<Ticket>, per_release: usize) -> Self {
        Self { idx, id: vendor_label(idx), slice, per_release }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn remaining(&self) -> usize { self.slice.len() }

    /// One scheduled activation. Caller holds the market lock.
    pub fn tick(&mut self, market: &mut Market) -> Flow {
        if !market.is_running() {
            return Flow::Retire;
        }
        if self.slice.is_empty() {
            self.exhaust(market);
            return Flow::Retire;
        }

        let n = self
            .per_release
            .min(market.pool.remaining_capacity())
            .min(self.slice.len());
        if n > 0 {
            let added = market.pool.try_enqueue_many(&mut self.slice, n);
            let ledger = &mut market.vendors[self.idx];
            ledger.released += added as u64;
            ledger.phase = VendorPhase::Active;
            TICKETS_RELEASED.with_label_values(&[&self.id]).inc_by(added as u64);
            market.sync_pool_gauge();
            let pool_size = market.pool.size();
            market.note(format!("{} added {} tickets. Pool size: {}", self.id, added, pool_size));
        } else {
            market.vendors[self.idx].phase = VendorPhase::Draining;
            POOL_FULL.inc();
            market.note(format!("{} cannot add tickets. Max capacity reached.", self.id));
        }

        if self.slice.is_empty() {
            self.exhaust(market);
            return Flow::Retire;
        }
        Flow::Continue
    }

    fn exhaust(&self, market: &mut Market) {
        market.vendors[self.idx].phase = VendorPhase::Exhausted;
        market.note(format!("{} has no more tickets to add.", self.id));
    }
}

/// Periodic vendor task. First tick fires one `every` after spawn.
pub async fn run(
    mut vendor: VendorActor,
    market: SharedMarket,
    every: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    let mut tick = interval_at(Instant::now() + every, every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.changed() => break,
            _ = tick.tick() => {
                let flow = vendor.tick(&mut lock(&market));
                if flow == Flow::Retire {
                    break;
                }
            }
        }
    }
    debug!(vendor = %vendor.id(), remaining = vendor.remaining(), "vendor task exited");
}
