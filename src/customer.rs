// ===============================
// src/customer.rs
// ===============================
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::domain::customer_label;
use crate::market::{lock, Market, SharedMarket};
use crate::metrics::{POOL_EMPTY, PURCHASES, TICKETS_SOLD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Retire,
    /// This purchase sold the last ticket; the run should stop.
    Completed,
}

pub struct CustomerActor {
    idx: usize,
    id: String,
}

impl CustomerActor {
    pub fn new(idx: usize) -> Self { Self { idx, id: customer_label(idx) } }

    pub fn id(&self) -> &str { &self.id }

    /// One scheduled activation. Caller holds the market lock.
    pub fn tick(&mut self, market: &mut Market) -> Flow {
        if !market.is_running() {
            return Flow::Retire;
        }

        if let Some(ticket) = market.pool.try_dequeue_one() {
            match market.vendor_index_of(&ticket.vendor_id) {
                Some(v) => market.vendors[v].sold += 1,
                None => warn!(ticket = %ticket.id, vendor = %ticket.vendor_id, "ticket from unknown vendor"),
            }
            TICKETS_SOLD.with_label_values(&[&ticket.vendor_id]).inc();
            PURCHASES.inc();
            market.sync_pool_gauge();
            market.note(format!("{} purchased ticket {} from {}", self.id, ticket.id, ticket.vendor_id));
            market.customers[self.idx].tickets.push(ticket.id);

            let sold_out = market.pool.is_empty()
                && market.all_vendors_exhausted()
                && market.tickets_purchased() >= market.config.total_tickets as u64;
            return if sold_out { Flow::Completed } else { Flow::Continue };
        }

        if market.all_vendors_exhausted() {
            market.customers[self.idx].exhausted = true;
            market.note(format!("{} stopping: No more tickets available.", self.id));
            return Flow::Retire;
        }

        POOL_EMPTY.inc();
        market.note(format!("{} found no tickets. Waiting for vendors...", self.id));
        Flow::Continue
    }
}

/// Periodic customer task. Waits `start_delay` (one release interval, so the
/// pool gets initial stock) and then ticks every `every`.
pub async fn run(
    mut customer: CustomerActor,
    market: SharedMarket,
    start_delay: Duration,
    every: Duration,
    mut cancel: watch::Receiver<bool>,
    sold_out: mpsc::Sender<()>,
) {
    let mut tick = interval_at(Instant::now() + start_delay + every, every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.changed() => break,
            _ = tick.tick() => {
                let flow = customer.tick(&mut lock(&market));
                match flow {
                    Flow::Continue => {}
                    Flow::Retire => break,
                    Flow::Completed => {
                        let _ = sold_out.try_send(());
                        break;
                    }
                }
            }
        }
    }
    debug!(customer = %customer.id(), "customer task exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::partition;
    use crate::market::tests::cfg;
    use crate::vendor::{self, VendorActor};

    #[test]
    fn purchase_credits_customer_and_owning_vendor() {
        let slices = partition(4, 2);
        let mut m = Market::new(cfg(4, 10, 2, 2, 1), &slices, 100, None);
        let mut vs: Vec<VendorActor> =
            slices.into_iter().enumerate().map(|(i, s)| VendorActor::new(i, s, 2)).collect();
        let mut c = CustomerActor::new(0);

        assert_eq!(vs[1].tick(&mut m), vendor::Flow::Retire);
        assert_eq!(c.tick(&mut m), Flow::Continue);
        assert_eq!(m.vendors[1].sold, 1);
        assert_eq!(m.customers[0].tickets, vec!["Ticket-2".to_string()]);
    }

    #[test]
    fn empty_pool_with_active_vendors_keeps_waiting() {
        let slices = partition(4, 1);
        let mut m = Market::new(cfg(4, 10, 2, 1, 1), &slices, 100, None);
        let mut c = CustomerActor::new(0);
        assert_eq!(c.tick(&mut m), Flow::Continue);
        assert!(!m.customers[0].exhausted);
        let last = m.log_tail(1).pop().unwrap();
        assert!(last.message.contains("found no tickets"));
    }

    #[test]
    fn last_purchase_signals_completion() {
        let slices = partition(2, 1);
        let mut m = Market::new(cfg(2, 10, 5, 1, 2), &slices, 100, None);
        let mut v = VendorActor::new(0, slices[0].clone(), 5);
        let mut a = CustomerActor::new(0);
        let mut b = CustomerActor::new(1);

        assert_eq!(v.tick(&mut m), vendor::Flow::Retire);
        assert_eq!(a.tick(&mut m), Flow::Continue);
        assert_eq!(b.tick(&mut m), Flow::Completed);
        // nothing left: the other customer retires
        assert_eq!(a.tick(&mut m), Flow::Retire);
        assert!(m.customers[0].exhausted);
    }

    #[test]
    fn retires_when_all_vendors_start_empty() {
        // more customers than tickets, vendor 1..=2 own nothing
        let slices = partition(1, 3);
        let mut m = Market::new(cfg(1, 10, 5, 3, 3), &slices, 100, None);
        let mut v = VendorActor::new(0, slices[0].clone(), 5);
        v.tick(&mut m);
        let mut cs: Vec<CustomerActor> = (0..3).map(CustomerActor::new).collect();
        assert_eq!(cs[0].tick(&mut m), Flow::Completed);
        assert_eq!(cs[1].tick(&mut m), Flow::Retire);
        assert_eq!(cs[2].tick(&mut m), Flow::Retire);
    }
}
