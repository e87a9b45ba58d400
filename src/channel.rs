//! Analysis -> consumer handoff.
//!
//! A bounded single-producer/single-consumer queue with drop-oldest
//! back-pressure. The analysis side never blocks; when the consumer falls
//! behind, stale updates are evicted so the newest always gets through.

use std::sync::{Arc, Weak};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::dsp::SignalQualityReport;
use crate::VoiceMetricsSnapshot;

/// Evict-and-retry rounds before an update is given up on.
const PUBLISH_ATTEMPTS: usize = 4;

/// One analysis window's output.
#[derive(Debug, Clone)]
pub struct EngineUpdate {
    pub snapshot: VoiceMetricsSnapshot,
    pub quality: SignalQualityReport,
}

pub fn update_channel(capacity: usize) -> (UpdateSender, UpdateReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    let alive = Arc::new(());
    (
        UpdateSender {
            tx,
            drain: rx.clone(),
            consumer: Arc::downgrade(&alive),
            dropped: 0,
        },
        UpdateReceiver { rx, _alive: alive },
    )
}

pub struct UpdateSender {
    tx: Sender<EngineUpdate>,
    // Producer-side handle used only to evict the oldest queued update.
    drain: Receiver<EngineUpdate>,
    // The drain handle keeps the channel connected, so consumer liveness is
    // tracked separately.
    consumer: Weak<()>,
    dropped: u64,
}

impl UpdateSender {
    /// Non-blocking publish. Returns `false` if the update could not be queued
    /// (consumer gone, or the queue stayed full).
    pub fn publish(&mut self, update: EngineUpdate) -> bool {
        if !self.is_connected() {
            return false;
        }
        let mut pending = update;
        for _ in 0..PUBLISH_ATTEMPTS {
            match self.tx.try_send(pending) {
                Ok(()) => return true,
                Err(full) => {
                    pending = full.into_inner();
                    if self.drain.try_recv().is_ok() {
                        self.dropped += 1;
                    }
                }
            }
        }
        self.dropped += 1;
        false
    }

    /// Whether the `UpdateReceiver` is still held.
    pub fn is_connected(&self) -> bool {
        self.consumer.strong_count() > 0
    }

    /// Updates evicted or discarded because the consumer lagged.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

pub struct UpdateReceiver {
    rx: Receiver<EngineUpdate>,
    _alive: Arc<()>,
}

impl UpdateReceiver {
    pub fn try_recv(&self) -> Option<EngineUpdate> {
        match self.rx.try_recv() {
            Ok(update) => Some(update),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Drains the queue and keeps only the newest update.
    pub fn latest(&self) -> Option<EngineUpdate> {
        self.rx.try_iter().last()
    }

    /// Everything currently queued, oldest first.
    pub fn drain(&self) -> Vec<EngineUpdate> {
        self.rx.try_iter().collect()
    }

    /// Blocks until the next update or until the engine is dropped.
    pub fn recv(&self) -> Option<EngineUpdate> {
        self.rx.recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
