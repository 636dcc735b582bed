// ===============================
// src/store.rs
// ===============================
//
// Penyimpanan konfigurasi sebagai JSONL append-only:
//   {"id":1,"createdAtMs":...,"config":{...}}
// `load_last` mengambil record valid terakhir; file belum ada = None.
//
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};
use tracing::{info, warn};

use crate::domain::SimConfig;
use crate::error::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredConfig {
    id: u64,
    created_at_ms: i64,
    config: SimConfig,
}

pub struct ConfigStore {
    path: PathBuf,
    /// next id, loaded lazily from the file on first save
    next_id: Mutex<Option<u64>>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), next_id: Mutex::new(None) }
    }

    pub fn path(&self) -> &Path { &self.path }

    async fn records(&self) -> Result<Vec<StoredConfig>, StoreError> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for (n, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredConfig>(line) {
                Ok(r) => out.push(r),
                Err(e) => warn!(?e, line = n + 1, path = %self.path.display(), "config store: skip bad record"),
            }
        }
        Ok(out)
    }

    /// Append `config`, returning its id.
    pub async fn save(&self, config: &SimConfig) -> Result<u64, StoreError> {
        let mut next = self.next_id.lock().await;
        let id = match *next {
            Some(id) => id,
            None => self.records().await?.iter().map(|r| r.id).max().unwrap_or(0) + 1,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let record = StoredConfig { id, created_at_ms: Utc::now().timestamp_millis(), config: config.clone() };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(&line).await?;
        file.flush().await?;

        *next = Some(id + 1);
        info!(id, path = %self.path.display(), "configuration saved");
        Ok(id)
    }

    pub async fn load_last(&self) -> Result<Option<SimConfig>, StoreError> {
        Ok(self.records().await?.pop().map(|r| r.config))
    }
}
