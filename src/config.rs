// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : ticket_market_rust — concurrent ticket marketplace simulator in Rust
Module  : <module_name>.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Vendors release tickets into a capacity-bounded shared pool on their
          own timers while customers withdraw them on theirs, until supply
          runs out. Exposes start/stop/status over HTTP, persists the last
          configuration, exports Prometheus metrics, and records JSONL
          activity.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;

use crate::controller::RunOptions;
use crate::domain::SimConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "ticket_market", version, about = "Ticket marketplace simulator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub service: ServiceArgs,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// HTTP API (default)
    Serve,
    /// Satu simulasi tanpa HTTP, cetak summary JSON ke stdout
    Run(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServiceArgs {
    #[arg(long, env = "HTTP_PORT", default_value_t = 3001, global = true)]
    pub http_port: u16,

    /// Allowed origin for the web UI
    #[arg(long, env = "CORS_ORIGIN", default_value = "http://localhost:3000", global = true)]
    pub cors_origin: String,

    /// Activity log entries kept per run (oldest evicted first)
    #[arg(long, env = "LOG_CAPACITY", default_value_t = 200, global = true)]
    pub log_capacity: usize,

    /// Entries returned by /status
    #[arg(long, env = "STATUS_LOG_TAIL", default_value_t = 50, global = true)]
    pub status_log_tail: usize,

    #[arg(long, env = "CONFIG_STORE_FILE", default_value = "configurations.jsonl", global = true)]
    pub config_store_file: String,

    /// JSONL activity recorder; off when unset
    #[arg(long, env = "RECORD_FILE", global = true)]
    pub record_file: Option<String>,
}

impl ServiceArgs {
    pub fn run_options(&self) -> RunOptions {
        RunOptions { log_capacity: self.log_capacity, status_tail: self.status_log_tail, recorder: None }
    }
}

// Default mengikuti form web UI lama
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, env = "TOTAL_TICKETS", default_value_t = 500)]
    pub total_tickets: usize,
    #[arg(long, env = "MAX_TICKET_CAPACITY", default_value_t = 100)]
    pub max_ticket_capacity: usize,
    #[arg(long, env = "TICKETS_PER_RELEASE", default_value_t = 10)]
    pub tickets_per_release: usize,
    #[arg(long, env = "TICKET_RELEASE_INTERVAL_MS", default_value_t = 30)]
    pub release_interval_ms: u64,
    #[arg(long, env = "CUSTOMER_RETRIEVAL_INTERVAL_MS", default_value_t = 20)]
    pub retrieval_interval_ms: u64,
    #[arg(long, env = "VENDOR_COUNT", default_value_t = 5)]
    pub vendors: usize,
    #[arg(long, env = "CUSTOMER_COUNT", default_value_t = 50)]
    pub customers: usize,
    /// Stop the run after this long even if tickets remain
    #[arg(long, env = "MAX_DURATION_MS")]
    pub max_duration_ms: Option<u64>,
}

impl RunArgs {
    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            total_tickets: self.total_tickets,
            max_ticket_capacity: self.max_ticket_capacity,
            tickets_per_release: self.tickets_per_release,
            release_interval_ms: self.release_interval_ms,
            retrieval_interval_ms: self.retrieval_interval_ms,
            vendor_count: self.vendors,
            customer_count: self.customers,
        }
    }
}

pub fn load() -> Cli {
    // Pastikan .env dibaca sebelum clap membaca env fallback
    let _ = dotenv();
    Cli::parse()
}
