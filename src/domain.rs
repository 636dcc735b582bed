// ===============================
// src/domain.rs
// ===============================
use serde::{Deserialize, Serialize, Serializer};

use crate::error::SimError;

/// Satu tiket; dibuat sekali saat inventory dibangun, tidak pernah dimutasi.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket { pub id: String, pub vendor_id: String }

pub fn vendor_label(idx: usize) -> String { format!("Vendor-{idx}") }
pub fn customer_label(idx: usize) -> String { format!("Customer-{idx}") }
pub fn ticket_label(seq: usize) -> String { format!("Ticket-{seq}") }

/// Immutable per-run configuration. Field names on the wire follow the web UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(rename = "totalTickets")]
    pub total_tickets: usize,
    #[serde(rename = "maxTicketCapacity")]
    pub max_ticket_capacity: usize,
    #[serde(rename = "ticketsPerRelease")]
    pub tickets_per_release: usize,
    #[serde(rename = "ticketReleaseInterval")]
    pub release_interval_ms: u64,
    #[serde(rename = "customerRetrievalInterval")]
    pub retrieval_interval_ms: u64,
    #[serde(rename = "vendorCount")]
    pub vendor_count: usize,
    #[serde(rename = "customerCount")]
    pub customer_count: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            total_tickets: 500,
            max_ticket_capacity: 100,
            tickets_per_release: 10,
            release_interval_ms: 30,
            retrieval_interval_ms: 20,
            vendor_count: 5,
            customer_count: 50,
        }
    }
}

/// Upper bounds accepted by `validate`. Tickets and vendor slices are built
/// eagerly at start, and every vendor and customer is its own task.
pub const MAX_TOTAL_TICKETS: u64 = 1_000_000;
pub const MAX_POOL_CAPACITY: u64 = 1_000_000;
pub const MAX_VENDORS: u64 = 1_000;
pub const MAX_CUSTOMERS: u64 = 10_000;
/// Satu hari; interval lebih besar bikin deadline timer overflow.
pub const MAX_INTERVAL_MS: u64 = 86_400_000;

impl SimConfig {
    /// Semua field numerik wajib > 0 dan tidak melebihi batas di atas.
    pub fn validate(&self) -> Result<(), SimError> {
        let fields = [
            ("totalTickets", self.total_tickets as u64, MAX_TOTAL_TICKETS),
            ("maxTicketCapacity", self.max_ticket_capacity as u64, MAX_POOL_CAPACITY),
            ("ticketsPerRelease", self.tickets_per_release as u64, MAX_POOL_CAPACITY),
            ("ticketReleaseInterval", self.release_interval_ms, MAX_INTERVAL_MS),
            ("customerRetrievalInterval", self.retrieval_interval_ms, MAX_INTERVAL_MS),
            ("vendorCount", self.vendor_count as u64, MAX_VENDORS),
            ("customerCount", self.customer_count as u64, MAX_CUSTOMERS),
        ];
        for (name, v, max) in fields {
            if v == 0 {
                return Err(SimError::InvalidConfig(format!("{name} must be a positive integer")));
            }
            if v > max {
                return Err(SimError::InvalidConfig(format!("{name} must not exceed {max}")));
            }
        }
        Ok(())
    }
}

/// Lenient request body: every field optional and signed so that missing or
/// negative values produce a named `InvalidConfig` instead of a serde error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimConfigRequest {
    pub total_tickets: Option<i64>,
    pub max_ticket_capacity: Option<i64>,
    pub tickets_per_release: Option<i64>,
    pub ticket_release_interval: Option<i64>,
    pub customer_retrieval_interval: Option<i64>,
    pub vendor_count: Option<i64>,
    pub customer_count: Option<i64>,
}

fn positive(name: &str, v: Option<i64>) -> Result<u64, SimError> {
    match v {
        None => Err(SimError::InvalidConfig(format!("{name} field is missing or invalid"))),
        Some(x) if x <= 0 => Err(SimError::InvalidConfig(format!("{name} must be a positive integer"))),
        Some(x) => Ok(x as u64),
    }
}

impl TryFrom<SimConfigRequest> for SimConfig {
    type Error = SimError;

    fn try_from(r: SimConfigRequest) -> Result<Self, Self::Error> {
        let cfg = SimConfig {
            total_tickets: positive("totalTickets", r.total_tickets)? as usize,
            max_ticket_capacity: positive("maxTicketCapacity", r.max_ticket_capacity)? as usize,
            tickets_per_release: positive("ticketsPerRelease", r.tickets_per_release)? as usize,
            release_interval_ms: positive("ticketReleaseInterval", r.ticket_release_interval)?,
            retrieval_interval_ms: positive("customerRetrievalInterval", r.customer_retrieval_interval)?,
            vendor_count: positive("vendorCount", r.vendor_count)? as usize,
            customer_count: positive("customerCount", r.customer_count)? as usize,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Ordered `(label, count)` pairs, serialized as a JSON object in index order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tallies(pub Vec<(String, u64)>);

impl Tallies {
    pub fn total(&self) -> u64 { self.0.iter().map(|(_, n)| n).sum() }
    pub fn get(&self, label: &str) -> Option<u64> {
        self.0.iter().find(|(k, _)| k == label).map(|(_, n)| *n)
    }
}

impl Serialize for Tallies {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

/// Snapshot dibuat sekali saat stop; immutable setelahnya.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub vendor_sales: Tallies,
    /// tickets each vendor got accepted into the pool
    pub vendor_releases: Tallies,
    pub customer_purchases: Tallies,
    pub total_tickets_sold: u64,
    pub total_tickets_purchased: u64,
    /// true when the run ended by supply exhaustion rather than a stop request.
    pub completed: bool,
    pub config: SimConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry { pub seq: u64, pub ts_ms: i64, pub message: String }

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub pool_size: usize,
    pub recent_logs: Vec<ActivityEntry>,
    pub tickets_sold: u64,
    pub active_vendors: usize,
    pub active_customers: usize,
}

/// Stream item for the JSONL recorder.
#[derive(Debug, Clone, Serialize)]
pub enum Event { Activity(ActivityEntry), Summary(RunSummary) }
