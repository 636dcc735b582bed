// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::domain::SimConfig;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Market flow --------
pub static TICKETS_RELEASED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tickets_released_total", "tickets moved from vendor slices into the pool"),
        &["vendor"],
    )
    .unwrap()
});

pub static TICKETS_SOLD: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tickets_sold_total", "tickets withdrawn from the pool, by owning vendor"),
        &["vendor"],
    )
    .unwrap()
});

// per-customer counts stay in the run summary (label cardinality)
pub static PURCHASES: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("ticket_purchases_total", "successful customer withdrawals").unwrap());

pub static POOL_SIZE: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("pool_size", "tickets currently available in the pool").unwrap());

pub static POOL_FULL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("pool_full_total", "vendor ticks that found no pool capacity").unwrap()
});

pub static POOL_EMPTY: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("pool_empty_total", "customer ticks that found the pool empty").unwrap()
});

// -------- Run lifecycle --------
pub static RUNS_STARTED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("runs_started_total", "simulations started").unwrap());

pub static RUNS_STOPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "runs_stopped_total",
            "simulations stopped (label reason: requested | completed | replaced)",
        ),
        &["reason"],
    )
    .unwrap()
});

// ---- Config visibility (active run) ----
pub static CONFIG_VALUE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_value", "configuration of the latest run (label: field)"),
        &["field"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(TICKETS_RELEASED.clone())),
        REGISTRY.register(Box::new(TICKETS_SOLD.clone())),
        REGISTRY.register(Box::new(PURCHASES.clone())),
        REGISTRY.register(Box::new(POOL_SIZE.clone())),
        REGISTRY.register(Box::new(POOL_FULL.clone())),
        REGISTRY.register(Box::new(POOL_EMPTY.clone())),
        REGISTRY.register(Box::new(RUNS_STARTED.clone())),
        REGISTRY.register(Box::new(RUNS_STOPPED.clone())),
        REGISTRY.register(Box::new(CONFIG_VALUE.clone())),
    ] {
        let _ = m;
    }
}

pub fn publish_config(cfg: &SimConfig) {
    for (field, v) in [
        ("totalTickets", cfg.total_tickets as i64),
        ("maxTicketCapacity", cfg.max_ticket_capacity as i64),
        ("ticketsPerRelease", cfg.tickets_per_release as i64),
        ("ticketReleaseInterval", cfg.release_interval_ms as i64),
        ("customerRetrievalInterval", cfg.retrieval_interval_ms as i64),
        ("vendorCount", cfg.vendor_count as i64),
        ("customerCount", cfg.customer_count as i64),
    ] {
        CONFIG_VALUE.with_label_values(&[field]).set(v);
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}
