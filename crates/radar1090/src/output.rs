/*!
 * Output fan-out: every accepted message is rendered once and offered
 * to each writer through a bounded queue. A writer that cannot keep up
 * loses messages, never the pipeline.
 */
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

const QUEUE_DEPTH: usize = 256;

struct Writer {
    name: &'static str,
    tx: mpsc::Sender<String>,
    dropped: Arc<AtomicU64>,
}

#[derive(Default)]
pub struct OutputHub {
    writers: Vec<Writer>,
}

impl OutputHub {
    pub fn new() -> Self {
        OutputHub::default()
    }

    /// Print one JSON line per message on standard output.
    pub fn add_stdout(&mut self) {
        let (tx, mut rx) = mpsc::channel::<String>(QUEUE_DEPTH);
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                println!("{line}");
            }
        });
        self.writers.push(Writer {
            name: "stdout",
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        });
    }

    /// Append one JSON line per message to a file.
    pub fn add_jsonl(&mut self, path: String) {
        let (tx, mut rx) = mpsc::channel::<String>(QUEUE_DEPTH);
        tokio::spawn(async move {
            let file = fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(&path)
                .await;
            let mut file = match file {
                Ok(file) => file,
                Err(e) => {
                    warn!("cannot open {path}: {e}");
                    return;
                }
            };
            while let Some(line) = rx.recv().await {
                if file.write_all(line.as_bytes()).await.is_err()
                    || file.write_all(b"\n").await.is_err()
                {
                    warn!("write error on {path}, stopping writer");
                    return;
                }
            }
        });
        self.writers.push(Writer {
            name: "jsonl",
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    /// Offer a rendered message to every writer; full queues drop.
    pub fn publish(&self, line: &str) {
        for writer in &self.writers {
            if writer.tx.try_send(line.to_string()).is_err() {
                writer.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Close the queues and report per-writer drop counts.
    pub fn shutdown(self) {
        for writer in self.writers {
            let dropped = writer.dropped.load(Ordering::Relaxed);
            if dropped > 0 {
                info!("{}: {} messages dropped", writer.name, dropped);
            }
        }
    }
}
