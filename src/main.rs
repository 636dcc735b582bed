// ===============================
// src/main.rs
// ===============================
/*
 # jalankan API (default port 3001)
 cargo run --release

 # satu simulasi headless, summary JSON ke stdout
 cargo run --release -- run --total-tickets 100 --vendors 3 --customers 10

 curl -s -XPOST localhost:3001/api/start -H 'content-type: application/json' \
   -d '{"totalTickets":50,"maxTicketCapacity":10,"ticketsPerRelease":5,"ticketReleaseInterval":100,"customerRetrievalInterval":50,"vendorCount":2,"customerCount":3}'
 curl -s localhost:3001/api/status
 curl -s -XPOST localhost:3001/api/stop
 curl -s localhost:3001/metrics | grep '^tickets_'
*/
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
mod activity;
mod config;
mod controller;
mod customer;
mod domain;
mod error;
mod inventory;
mod market;
mod metrics;
mod pool;
mod recorder;
mod server;
mod store;
mod vendor;

use std::sync::Arc;

use tokio::{
    select,
    sync::mpsc,
    task::JoinHandle,
    time::{interval_at, Duration, Instant},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Command, RunArgs, ServiceArgs};
use crate::controller::{RunOptions, SimulationController};
use crate::domain::Event;
use crate::server::AppState;
use crate::store::ConfigStore;

#[tokio::main]
async fn main() {
    // ---- Logging ----
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // ---- Load config ----
    let cli = config::load();

    // ---- Metrics ----
    metrics::init();

    // ---- Recorder (optional) ----
    let mut run_opts = cli.service.run_options();
    let mut recorder_task: Option<JoinHandle<()>> = None;
    if let Some(path) = cli.service.record_file.clone() {
        let (rec_tx, rec_rx) = mpsc::channel::<Event>(8192);
        recorder_task = Some(tokio::spawn(recorder::run(rec_rx, path)));
        run_opts.recorder = Some(rec_tx);
    }

    let code = match cli.command.clone().unwrap_or(Command::Serve) {
        Command::Serve => serve(&cli.service, run_opts).await,
        Command::Run(args) => run_headless(&args, run_opts).await,
    };

    // semua sender sudah di-drop -> recorder flush lalu selesai
    if let Some(task) = recorder_task {
        if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
            warn!("recorder did not finish flushing in time");
        }
    }
    if code != 0 {
        std::process::exit(code);
    }
}

async fn serve(service: &ServiceArgs, run_opts: RunOptions) -> i32 {
    let store = ConfigStore::new(&service.config_store_file);
    info!(
        http_port = service.http_port,
        cors_origin = %service.cors_origin,
        log_capacity = service.log_capacity,
        status_log_tail = service.status_log_tail,
        config_store = %store.path().display(),
        record_file = ?service.record_file,
        "startup config"
    );

    let state = Arc::new(AppState::new(store, run_opts, &service.cors_origin));

    let code = match server::serve(state.clone(), service.http_port).await {
        Ok(()) => 0,
        Err(e) => {
            error!(?e, "http server failed");
            1
        }
    };
    state.shutdown().await;
    code
}

async fn run_headless(args: &RunArgs, run_opts: RunOptions) -> i32 {
    let ctl = match SimulationController::start(args.sim_config(), run_opts) {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "cannot start simulation");
            return 2;
        }
    };

    let deadline = async {
        match args.max_duration_ms {
            Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);
    let finished = ctl.finished();
    tokio::pin!(finished);

    // ---- Heartbeat ----
    let mut heartbeat = interval_at(Instant::now() + Duration::from_secs(1), Duration::from_secs(1));
    loop {
        select! {
            _ = &mut finished => break,
            _ = &mut deadline => {
                warn!(max_duration_ms = ?args.max_duration_ms, "max duration reached, stopping");
                break;
            }
            _ = heartbeat.tick() => {
                if let Ok(st) = ctl.status() {
                    info!(pool = st.pool_size, sold = st.tickets_sold, "heartbeat");
                }
            }
        }
    }

    let summary = ctl.stop().await;
    info!(
        total_tickets = ctl.config().total_tickets,
        sold = summary.total_tickets_sold,
        completed = summary.completed,
        log_entries = ctl.activity().len(),
        "run finished"
    );
    match serde_json::to_string_pretty(&summary) {
        Ok(s) => {
            println!("{s}");
            0
        }
        Err(e) => {
            error!(?e, "cannot serialize summary");
            1
        }
    }
}
