use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{error, info};
use ulid::Ulid;

use crate::storage::LogManager;
use crate::LogEntry;

const BATCH_SIZE: usize = 100;
const FLUSH_TIMEOUT: Duration = Duration::from_millis(50);

pub struct Batcher {
    tx: mpsc::UnboundedSender<LogEntry>,
}

impl Batcher {
    pub fn new(manager: Arc<LogManager>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_loop(rx, manager));
        Self { tx }
    }

    pub fn submit(&self, entry: LogEntry) {
        let _ = self.tx.send(entry);
    }
}

async fn run_loop(mut rx: mpsc::UnboundedReceiver<LogEntry>, manager: Arc<LogManager>) {
    loop {
        let first = match rx.recv().await {
            Some(e) => e,
            None => break,
        };

        let mut batch = Vec::with_capacity(BATCH_SIZE);
        batch.push(first);

        while batch.len() < BATCH_SIZE {
            match timeout(FLUSH_TIMEOUT, rx.recv()).await {
                Ok(Some(entry)) => batch.push(entry),
                Ok(None) | Err(_) => break,
            }
        }

        for entry in &mut batch {
            if entry.timestamp_ns == 0 {
                if let Ok(now) = SystemTime::now().duration_since(UNIX_EPOCH) {
                    entry.timestamp_ns = now.as_nanos() as i64;
                }
            }
            let ms = (entry.timestamp_ns / 1_000_000) as u64;
            entry.id = Ulid::from_parts(ms, rand::random()).to_string();
        }

        let len = batch.len();
        if let Err(e) = manager.append_batch(batch) {
            error!("batch flush failed: {e}");
        } else {
            info!("flushed {len} log entries");
        }

        if rx.is_closed() && rx.is_empty() {
            break;
        }
    }

    info!("batcher shutdown");
}
