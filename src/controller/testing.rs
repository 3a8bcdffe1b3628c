//! In-memory driver double for exercising [`crate::controller::StreamController`]
//! without real tuner/player/demux hardware. Not `#[cfg(test)]`-gated so
//! integration tests outside this crate can build on it too.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::driver::{DemuxDriver, PlayerDriver, StreamKind, TunerDriver};
use crate::config::Modulation;
use crate::error::{DvbError, Result};

/// Records every call the controller makes and lets a test inject section
/// bytes and tuner lock events on demand.
pub struct MockDriver {
    next_handle: Mutex<u32>,
    lock_tx: mpsc::UnboundedSender<()>,
    lock_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<()>>,
    section_tx: mpsc::UnboundedSender<Vec<u8>>,
    section_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    /// (pid, table_id) pairs passed to `set_filter`, in call order
    pub filters_set: Mutex<Vec<(u16, u8)>>,
    /// (pid, kind) pairs passed to `stream_create`, in call order
    pub streams_created: Mutex<Vec<(u16, StreamKind)>>,
    /// stream handles passed to `stream_remove`, in call order
    pub streams_removed: Mutex<Vec<u32>>,
    /// scaled volume values passed to `volume_set`, in call order
    pub volumes_set: Mutex<Vec<u32>>,
}

impl MockDriver {
    /// Creates a fresh mock with no pending events.
    pub fn new() -> Arc<Self> {
        let (lock_tx, lock_rx) = mpsc::unbounded_channel();
        let (section_tx, section_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            next_handle: Mutex::new(1),
            lock_tx,
            lock_rx: tokio::sync::Mutex::new(lock_rx),
            section_tx,
            section_rx: tokio::sync::Mutex::new(section_rx),
            filters_set: Mutex::new(Vec::new()),
            streams_created: Mutex::new(Vec::new()),
            streams_removed: Mutex::new(Vec::new()),
            volumes_set: Mutex::new(Vec::new()),
        })
    }

    fn next_handle(&self) -> u32 {
        let mut h = self.next_handle.lock();
        let value = *h;
        *h += 1;
        value
    }

    /// Makes the next (or a pending) `wait_for_lock` call resolve.
    pub fn push_locked(&self) {
        let _ = self.lock_tx.send(());
    }

    /// Queues a raw section buffer for the next `next_section` call.
    pub fn push_section(&self, bytes: Vec<u8>) {
        let _ = self.section_tx.send(bytes);
    }
}

#[async_trait]
impl TunerDriver for MockDriver {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn lock_to_frequency(&self, _frequency: u32, _bandwidth: u32, _module: Modulation) -> Result<()> {
        Ok(())
    }

    async fn wait_for_lock(&self) -> Result<()> {
        let mut rx = self.lock_rx.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| DvbError::Driver("mock tuner event channel closed".into()))
    }

    async fn deinit(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl DemuxDriver for MockDriver {
    async fn set_filter(&self, pid: u16, table_id: u8) -> Result<u32> {
        self.filters_set.lock().push((pid, table_id));
        Ok(self.next_handle())
    }

    async fn free_filter(&self, _filter_handle: u32) -> Result<()> {
        Ok(())
    }

    async fn next_section(&self) -> Result<Vec<u8>> {
        let mut rx = self.section_rx.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| DvbError::Driver("mock section channel closed".into()))
    }
}

#[async_trait]
impl PlayerDriver for MockDriver {
    async fn init(&self) -> Result<u32> {
        Ok(self.next_handle())
    }

    async fn source_open(&self, _player_handle: u32) -> Result<u32> {
        Ok(self.next_handle())
    }

    async fn stream_create(
        &self,
        _player_handle: u32,
        _source_handle: u32,
        pid: u16,
        kind: StreamKind,
    ) -> Result<u32> {
        self.streams_created.lock().push((pid, kind));
        Ok(self.next_handle())
    }

    async fn stream_remove(&self, _player_handle: u32, _source_handle: u32, stream_handle: u32) -> Result<()> {
        self.streams_removed.lock().push(stream_handle);
        Ok(())
    }

    async fn source_close(&self, _player_handle: u32, _source_handle: u32) -> Result<()> {
        Ok(())
    }

    async fn volume_set(&self, _player_handle: u32, scaled_volume: u32) -> Result<()> {
        self.volumes_set.lock().push(scaled_volume);
        Ok(())
    }

    async fn deinit(&self, _player_handle: u32) -> Result<()> {
        Ok(())
    }
}
