//! subscriber.rs
//! Turns a line stream of `speed,steering_angle` records into `DriveCommand`s.
//! - headerless CSV, `#` comment lines and blank lines ignored
//! - malformed records are logged and skipped, never fatal
//! - live input keeps only the newest pending command (queue size 1); replay
//!   input blocks so every record is applied in order
//! - once the `CommandQueue` is dropped, `publish` fails under either policy

use crossbeam::channel::{
    bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError, TrySendError,
};
use csv::{ReaderBuilder, Trim};
use std::{
    io::Read,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};
use log::{debug, info, warn};

use crate::command::message::DriveCommand;
use crate::error::DriveResult;

// how long a blocked publish waits before checking the dispatcher is still there
const SEND_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Replace a command the dispatcher has not picked up yet.
    LatestWins,
    /// Wait for the dispatcher; nothing is dropped.
    Blocking,
}

/// Receiving end of the intake channel. Dropping it tells the subscriber
/// that nobody will consume commands any more.
pub struct CommandQueue {
    rx: Receiver<DriveCommand>,
    _alive: Arc<()>,
}

impl CommandQueue {
    pub fn recv_timeout(&self, timeout: Duration) -> Result<DriveCommand, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<DriveCommand, TryRecvError> {
        self.rx.try_recv()
    }

    /// Blocks for each command until the subscriber is dropped.
    pub fn iter(&self) -> impl Iterator<Item = DriveCommand> + '_ {
        self.rx.iter()
    }
}

pub struct CommandSubscriber {
    tx: Sender<DriveCommand>,
    // LatestWins only: evicts a pending command the dispatcher has not taken
    stale: Option<Receiver<DriveCommand>>,
    consumer: Weak<()>,
    policy: DeliveryPolicy,
    dropped: Arc<AtomicU64>,
    skipped: u64,
}

impl CommandSubscriber {
    /// Subscriber plus the receiving end for the dispatcher.
    pub fn channel(policy: DeliveryPolicy) -> (Self, CommandQueue) {
        let (tx, rx) = bounded(1);
        let alive = Arc::new(());
        let stale = match policy {
            DeliveryPolicy::LatestWins => Some(rx.clone()),
            DeliveryPolicy::Blocking => None,
        };
        let subscriber = Self {
            tx,
            stale,
            consumer: Arc::downgrade(&alive),
            policy,
            dropped: Arc::new(AtomicU64::new(0)),
            skipped: 0,
        };
        (subscriber, CommandQueue { rx, _alive: alive })
    }

    /// True while the `CommandQueue` exists.
    pub fn is_connected(&self) -> bool {
        self.consumer.strong_count() > 0
    }

    /// Hand one command to the dispatcher. Returns false once the dispatcher is gone.
    pub fn publish(&self, cmd: DriveCommand) -> bool {
        if !self.is_connected() {
            return false;
        }
        match self.policy {
            DeliveryPolicy::Blocking => self.publish_blocking(cmd),
            DeliveryPolicy::LatestWins => self.publish_latest(cmd),
        }
    }

    fn publish_blocking(&self, mut cmd: DriveCommand) -> bool {
        loop {
            match self.tx.send_timeout(cmd, SEND_POLL) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(pending)) => {
                    if !self.is_connected() {
                        return false;
                    }
                    cmd = pending;
                }
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    fn publish_latest(&self, cmd: DriveCommand) -> bool {
        match self.tx.try_send(cmd) {
            Ok(()) => true,
            Err(TrySendError::Full(cmd)) => {
                if let Some(Ok(old)) = self.stale.as_ref().map(Receiver::try_recv) {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!("[Subscriber] dropped stale command {:?}", old);
                }
                match self.tx.try_send(cmd) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        true
                    }
                    Err(TrySendError::Disconnected(_)) => false,
                }
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Read records until EOF, `running` goes false, or the dispatcher hangs up.
    /// Returns the number of commands published.
    pub fn run<R: Read>(&mut self, reader: R, running: &AtomicBool) -> DriveResult<u64> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .trim(Trim::All)
            .from_reader(reader);

        let mut published = 0u64;
        for (line, result) in rdr.deserialize::<DriveCommand>().enumerate() {
            if !running.load(Ordering::Acquire) {
                break;
            }
            match result {
                Ok(cmd) => {
                    if !self.publish(cmd) {
                        info!("[Subscriber] dispatcher gone, stopping intake");
                        break;
                    }
                    published += 1;
                }
                Err(e) => {
                    self.skipped += 1;
                    warn!("[Subscriber] skipping record {}: {}", line + 1, e);
                }
            }
        }
        Ok(published)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
