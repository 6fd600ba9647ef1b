//! journal.rs
//! Non-blocking journal of PWM register writes with background CSV export.
//!
//! `record()` pushes onto a bounded lock-free queue and returns immediately, so
//! the bus lock is never held for file I/O. A consumer thread drains the queue
//! into `seq,ts_ns,channel,on,off` rows and flushes in batches.

use std::{
    fs::File,
    io::BufWriter,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_queue::ArrayQueue;
use csv::Writer;
use log::{debug, error, info};
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{DriveError, DriveResult};

const JOURNAL_CAPACITY: usize = 4096;
const CONSUMER_POLL_MS: u64 = 5;
const FLUSH_BATCHES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub ts_ns: u64,
    pub channel: u8,
    pub on: u16,
    pub off: u16,
}

pub struct WriteJournal {
    queue: Arc<ArrayQueue<JournalEntry>>,
    run_start: Instant,
    seq_counter: AtomicU64,
    dropped: Arc<AtomicU64>,
    consumer_running: Arc<AtomicBool>,
    consumer_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Default for WriteJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteJournal {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(JOURNAL_CAPACITY)),
            run_start: Instant::now(),
            seq_counter: AtomicU64::new(1),
            dropped: Arc::new(AtomicU64::new(0)),
            consumer_running: Arc::new(AtomicBool::new(false)),
            consumer_handle: Mutex::new(None),
        }
    }

    /// Appends a write. Drops (and counts) it if the queue is full.
    #[inline]
    pub fn record(&self, channel: u8, on: u16, off: u16) {
        let entry = JournalEntry {
            seq: self.seq_counter.fetch_add(1, Ordering::Relaxed),
            ts_ns: self.run_start.elapsed().as_nanos() as u64,
            channel,
            on,
            off,
        };
        if self.queue.push(entry).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Pops everything currently queued. Only meaningful while no exporter runs.
    pub fn drain(&self) -> Vec<JournalEntry> {
        let mut out = Vec::with_capacity(self.queue.len());
        while let Some(entry) = self.queue.pop() {
            out.push(entry);
        }
        out
    }

    /// Spawns the consumer thread writing CSV rows to `output_csv`.
    pub fn start_exporter(&self, output_csv: PathBuf) -> DriveResult<()> {
        let mut guard = self.consumer_handle.lock();
        if guard.is_some() {
            return Err(DriveError::Config("journal exporter already running".into()));
        }

        let file = File::create(&output_csv)?;
        let queue = self.queue.clone();
        let running = self.consumer_running.clone();
        let dropped = self.dropped.clone();
        running.store(true, Ordering::SeqCst);

        info!("[Journal] exporting register writes to {:?}", output_csv);
        let handle = thread::Builder::new()
            .name("journal_export".into())
            .spawn(move || {
                let mut wtr = Writer::from_writer(BufWriter::new(file));
                let mut flush_counter = 0usize;

                while running.load(Ordering::SeqCst) {
                    let mut any = false;
                    for _ in 0..256 {
                        match queue.pop() {
                            Some(entry) => {
                                any = true;
                                if let Err(e) = wtr.serialize(entry) {
                                    error!("[Journal] failed to write row: {}", e);
                                }
                            }
                            None => break,
                        }
                    }
                    if any {
                        flush_counter += 1;
                        if flush_counter >= FLUSH_BATCHES {
                            wtr.flush().ok();
                            flush_counter = 0;
                        }
                    } else {
                        thread::sleep(Duration::from_millis(CONSUMER_POLL_MS));
                    }
                }

                // final drain
                while let Some(entry) = queue.pop() {
                    wtr.serialize(entry).ok();
                }
                wtr.flush().ok();
                debug!(
                    "[Journal::consumer] exiting. dropped={}",
                    dropped.load(Ordering::Relaxed)
                );
            })?;

        *guard = Some(handle);
        Ok(())
    }

    /// Stops the consumer after it has written everything queued so far.
    pub fn stop_exporter(&self) {
        self.consumer_running.store(false, Ordering::SeqCst);
        let handle = self.consumer_handle.lock().take();
        if let Some(h) = handle {
            if h.join().is_err() {
                error!("[Journal] exporter thread panicked");
            }
        }
    }
}

impl Drop for WriteJournal {
    fn drop(&mut self) {
        self.stop_exporter();
    }
}
