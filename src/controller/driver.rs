//! Tuner/player/demux boundary: async traits standing in for the native
//! `Tuner_*`/`Player_*`/`Demux_*` API a set-top box driver would expose over
//! FFI. Implementors own whatever real hardware/driver handles are needed;
//! this crate only ever sees the trait.

use async_trait::async_trait;

use crate::config::Modulation;
use crate::error::Result;

/// Elementary stream kind requested from [`PlayerDriver::stream_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

/// Controls tuner initialization, frequency lock, and lock-status delivery.
#[async_trait]
pub trait TunerDriver: Send + Sync {
    /// Initializes the tuner device.
    async fn init(&self) -> Result<()>;

    /// Requests a frequency lock with the given bandwidth and modulation.
    async fn lock_to_frequency(&self, frequency: u32, bandwidth: u32, module: Modulation) -> Result<()>;

    /// Resolves once the tuner reports a lock. Callers apply their own
    /// timeout; this call never times out on its own.
    async fn wait_for_lock(&self) -> Result<()>;

    /// Releases the tuner device.
    async fn deinit(&self) -> Result<()>;
}

/// Controls demux section filters and delivers matching sections.
#[async_trait]
pub trait DemuxDriver: Send + Sync {
    /// Installs a section filter for `pid`/`table_id`, returning a filter
    /// handle to later pass to [`DemuxDriver::free_filter`].
    async fn set_filter(&self, pid: u16, table_id: u8) -> Result<u32>;

    /// Removes a previously installed filter.
    async fn free_filter(&self, filter_handle: u32) -> Result<()>;

    /// Resolves with the bytes of the next section matching whichever
    /// filter is currently installed. Callers apply their own timeout.
    async fn next_section(&self) -> Result<Vec<u8>>;
}

/// Controls player source/stream lifecycle and volume.
#[async_trait]
pub trait PlayerDriver: Send + Sync {
    /// Initializes the player, returning a player handle.
    async fn init(&self) -> Result<u32>;

    /// Opens a source on an initialized player, returning a source handle.
    async fn source_open(&self, player_handle: u32) -> Result<u32>;

    /// Creates an elementary stream on `pid`, returning a stream handle.
    async fn stream_create(
        &self,
        player_handle: u32,
        source_handle: u32,
        pid: u16,
        kind: StreamKind,
    ) -> Result<u32>;

    /// Removes a previously created stream.
    async fn stream_remove(&self, player_handle: u32, source_handle: u32, stream_handle: u32) -> Result<()>;

    /// Closes a source opened with [`PlayerDriver::source_open`].
    async fn source_close(&self, player_handle: u32, source_handle: u32) -> Result<()>;

    /// Sets the output volume, already scaled by the caller.
    async fn volume_set(&self, player_handle: u32, scaled_volume: u32) -> Result<()>;

    /// Releases the player.
    async fn deinit(&self, player_handle: u32) -> Result<()>;
}

/// The three driver handles a [`crate::controller::StreamController`] drives.
pub struct DriverSet {
    pub tuner: std::sync::Arc<dyn TunerDriver>,
    pub player: std::sync::Arc<dyn PlayerDriver>,
    pub demux: std::sync::Arc<dyn DemuxDriver>,
}
