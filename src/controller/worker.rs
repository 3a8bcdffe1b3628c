//! Acquisition-sequence and channel-change state machine, run as a single
//! background task so the rest of the crate never blocks on tuner/demux
//! I/O directly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use super::driver::{DriverSet, StreamKind};
use crate::config::Config;
use crate::error::{DvbError, Result};
use crate::event_cache::EventCache;
use crate::si::{
    classify_stream_type, PatTable, SectionDecoders, StreamClass, PID_EIT_PF_ACTUAL, PID_PAT, TABLE_ID_EIT_PF_ACTUAL,
    TABLE_ID_PAT, TABLE_ID_PMT,
};

/// Scales a `0..=10` volume level up to the player driver's native units.
pub const VOLUME_SCALE: u32 = 160_400_000;

/// Volume applied by [`acquire`] before the first channel is started.
const DEFAULT_VOLUME: u32 = 5;

const TUNER_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
/// No deadline exists in the original source for the PAT wait; reuses the
/// tuner-lock deadline rather than waiting forever.
const PAT_WAIT_TIMEOUT: Duration = TUNER_LOCK_TIMEOUT;
const PMT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const EIT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of a [`crate::controller::StreamController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    Tuning,
    AwaitingPat,
    Running,
    ChannelSwitching,
    Stopping,
    Terminated,
}

/// Snapshot of the currently playing channel.
///
/// `program_number` is the channel's 1-based position in the acquired PAT
/// (`index + 1`), not the broadcast `program_number` carried by the PAT
/// entry itself — the same naming quirk the original firmware has.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelInfo {
    pub program_number: u16,
    pub audio_pid: Option<u16>,
    pub video_pid: Option<u16>,
    pub has_teletext: bool,
    pub event_name: String,
    pub event_genre: String,
}

pub(super) enum Command {
    ChannelUp,
    ChannelDown,
    ChangeChannel(u16),
    SetVolume(u8),
    Shutdown,
}

/// Shared state the public `StreamController` handle and the worker task
/// both reach into. `parking_lot::Mutex` guards fields that are read/written
/// from synchronous call sites; nothing here is held across an `.await`.
pub(super) struct Shared {
    pub state: parking_lot::Mutex<State>,
    pub pat: parking_lot::Mutex<Option<PatTable>>,
    pub current_channel: parking_lot::Mutex<ChannelInfo>,
    pub event_cache: parking_lot::Mutex<EventCache>,
    #[allow(clippy::type_complexity)]
    pub program_type_callback: parking_lot::Mutex<Option<Box<dyn Fn(i32) + Send + Sync>>>,
    pub channel_acquired_tx: watch::Sender<Option<ChannelInfo>>,
    /// Player/source handles opened once during acquisition and reused for
    /// every channel change; `None` until `acquire` succeeds.
    pub player_handles: parking_lot::Mutex<Option<(u32, u32)>>,
    /// Stream handles created for the currently playing channel, so a
    /// channel change can remove them before creating the new ones.
    pub stream_handles: parking_lot::Mutex<Vec<u32>>,
}

impl Shared {
    pub fn new() -> Self {
        let (channel_acquired_tx, _rx) = watch::channel(None);
        Self {
            state: parking_lot::Mutex::new(State::Uninitialized),
            pat: parking_lot::Mutex::new(None),
            current_channel: parking_lot::Mutex::new(ChannelInfo::default()),
            event_cache: parking_lot::Mutex::new(EventCache::new(0)),
            program_type_callback: parking_lot::Mutex::new(None),
            channel_acquired_tx,
            player_handles: parking_lot::Mutex::new(None),
            stream_handles: parking_lot::Mutex::new(Vec::new()),
        }
    }
}

/// Drives the acquisition sequence once, then handles channel-change
/// commands until told to shut down.
pub(super) async fn run(
    shared: Arc<Shared>,
    drivers: DriverSet,
    config: Config,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let decoders = SectionDecoders::new();
    // `config.program_number` is the 1-based starting channel; internally we
    // track a 0-based index, the same conversion `change_channel` applies.
    let mut current_index = config.program_number.saturating_sub(1);

    match acquire(&shared, &drivers, &decoders, &config).await {
        Ok(()) => {
            start_channel(&shared, &drivers, &decoders, current_index).await;
        }
        Err(e) => {
            log::error!("acquisition failed, stream controller will not run: {e}");
            *shared.state.lock() = State::Terminated;
            return;
        }
    }

    while let Some(command) = commands.recv().await {
        match command {
            Command::ChannelUp => {
                current_index = next_channel_up(&shared, current_index);
                start_channel(&shared, &drivers, &decoders, current_index).await;
            }
            Command::ChannelDown => {
                current_index = next_channel_down(&shared, current_index);
                start_channel(&shared, &drivers, &decoders, current_index).await;
            }
            Command::ChangeChannel(channel_number_1_based) => {
                current_index = channel_number_1_based.saturating_sub(1);
                start_channel(&shared, &drivers, &decoders, current_index).await;
            }
            Command::SetVolume(volume) => {
                if volume > 10 {
                    log::warn!("set_volume: {volume} outside the 0..=10 range, ignoring");
                } else {
                    let player_handle = shared.player_handles.lock().map(|(p, _)| p).unwrap_or(0);
                    if let Err(e) = drivers
                        .player
                        .volume_set(player_handle, volume as u32 * VOLUME_SCALE)
                        .await
                    {
                        log::warn!("set_volume failed: {e}");
                    }
                }
            }
            Command::Shutdown => break,
        }
    }

    *shared.state.lock() = State::Stopping;
    if let Some((player_handle, source_handle)) = shared.player_handles.lock().take() {
        let _ = drivers.player.source_close(player_handle, source_handle).await;
        let _ = drivers.player.deinit(player_handle).await;
    }
    let _ = drivers.tuner.deinit().await;
    *shared.state.lock() = State::Terminated;
    log::info!("stream controller worker terminated");
}

async fn acquire(
    shared: &Arc<Shared>,
    drivers: &DriverSet,
    decoders: &SectionDecoders,
    config: &Config,
) -> Result<()> {
    *shared.state.lock() = State::Tuning;

    drivers.tuner.init().await?;
    drivers
        .tuner
        .lock_to_frequency(config.frequency, config.bandwidth, config.module)
        .await?;

    match tokio::time::timeout(TUNER_LOCK_TIMEOUT, drivers.tuner.wait_for_lock()).await {
        Ok(Ok(())) => log::info!("tuner locked at {} Hz", config.frequency),
        Ok(Err(e)) => return Err(e),
        Err(_) => return Err(DvbError::Timeout("tuner lock")),
    }

    let player_handle = drivers.player.init().await?;
    let source_handle = drivers.player.source_open(player_handle).await?;
    *shared.player_handles.lock() = Some((player_handle, source_handle));

    if let Err(e) = drivers.player.volume_set(player_handle, DEFAULT_VOLUME * VOLUME_SCALE).await {
        log::warn!("failed to set default volume: {e}");
    }

    *shared.state.lock() = State::AwaitingPat;

    let filter = drivers.demux.set_filter(PID_PAT, TABLE_ID_PAT).await?;
    let result = tokio::time::timeout(PAT_WAIT_TIMEOUT, async {
        loop {
            let bytes = drivers.demux.next_section().await?;
            match decoders.parse_pat(&bytes) {
                Ok(pat) => return Ok(pat),
                Err(e) => {
                    log::warn!("discarding invalid PAT section: {e}");
                    continue;
                }
            }
        }
    })
    .await;
    drivers.demux.free_filter(filter).await?;

    let pat: PatTable = match result {
        Ok(inner) => inner?,
        Err(_) => return Err(DvbError::Timeout("PAT section")),
    };

    log::info!("PAT parsed: {} channels", pat.channel_count());
    *shared.event_cache.lock() = EventCache::new(pat.service_count());
    *shared.pat.lock() = Some(pat);
    *shared.state.lock() = State::Running;
    Ok(())
}

/// Acquires the channel at `index` (0-based, position in `pat.services`
/// minus the leading NIT entry): fetches and parses its PMT, creates/replaces
/// its audio and video streams, fires the program-type callback, then
/// best-effort fetches the present/following EIT to refresh the event cache
/// and the published event name/genre.
async fn start_channel(shared: &Arc<Shared>, drivers: &DriverSet, decoders: &SectionDecoders, index: u16) {
    *shared.state.lock() = State::ChannelSwitching;

    let (pmt_pid, real_program_number) = {
        let pat_guard = shared.pat.lock();
        let pat = match pat_guard.as_ref() {
            Some(p) => p,
            None => {
                log::error!("start_channel called before PAT was acquired");
                *shared.state.lock() = State::Running;
                return;
            }
        };
        // `+1` skips the leading NIT entry at position 0.
        match pat.services.get(index as usize + 1) {
            Some(service) => (service.pid, service.program_number),
            None => {
                log::error!("channel index {index} out of range ({} services in PAT)", pat.services.len());
                *shared.state.lock() = State::Running;
                return;
            }
        }
    };

    let pmt = match fetch_pmt(drivers, decoders, pmt_pid).await {
        Ok(pmt) => pmt,
        Err(e) => {
            log::error!("failed to acquire PMT for channel index {index}: {e}");
            *shared.state.lock() = State::Running;
            return;
        }
    };

    let mut video_pid = None;
    let mut audio_pid = None;
    let mut has_teletext = false;
    for element in &pmt.elements {
        match classify_stream_type(element.stream_type) {
            StreamClass::Video if video_pid.is_none() => video_pid = Some(element.elementary_pid),
            StreamClass::Audio if audio_pid.is_none() => audio_pid = Some(element.elementary_pid),
            _ => {}
        }
        if element.has_teletext {
            has_teletext = true;
        }
    }

    let (player_handle, source_handle) = match *shared.player_handles.lock() {
        Some(handles) => handles,
        None => {
            log::error!("start_channel called before the player was opened");
            *shared.state.lock() = State::Running;
            return;
        }
    };

    for stale in shared.stream_handles.lock().drain(..) {
        if let Err(e) = drivers.player.stream_remove(player_handle, source_handle, stale).await {
            log::warn!("failed to remove stream handle {stale}: {e}");
        }
    }

    let mut new_streams = Vec::new();
    if let Some(pid) = video_pid {
        match drivers.player.stream_create(player_handle, source_handle, pid, StreamKind::Video).await {
            Ok(handle) => new_streams.push(handle),
            Err(e) => log::error!("failed to create video stream on pid {pid}: {e}"),
        }
    }
    if let Some(pid) = audio_pid {
        match drivers.player.stream_create(player_handle, source_handle, pid, StreamKind::Audio).await {
            Ok(handle) => new_streams.push(handle),
            Err(e) => log::error!("failed to create audio stream on pid {pid}: {e}"),
        }
    }
    *shared.stream_handles.lock() = new_streams;

    if let Some(callback) = shared.program_type_callback.lock().as_ref() {
        callback(video_pid.map(|p| p as i32).unwrap_or(-1));
    }

    match fetch_eit(drivers, decoders, real_program_number).await {
        Ok(eit) => {
            if let Some(event) = eit.events.first() {
                shared.event_cache.lock().update(real_program_number, event);
            }
        }
        Err(e) => log::warn!("EIT acquisition for service {real_program_number} timed out or failed: {e}"),
    }

    let (event_name, event_genre) = shared
        .event_cache
        .lock()
        .lookup(real_program_number)
        .map(|entry| (entry.event_name.clone(), entry.genre.clone()))
        .unwrap_or_default();

    let channel_info = ChannelInfo {
        program_number: index + 1,
        audio_pid,
        video_pid,
        has_teletext,
        event_name,
        event_genre,
    };
    *shared.current_channel.lock() = channel_info.clone();

    let _ = shared.channel_acquired_tx.send(Some(channel_info));
    *shared.state.lock() = State::Running;
}

async fn fetch_pmt(drivers: &DriverSet, decoders: &SectionDecoders, pmt_pid: u16) -> Result<crate::si::PmtTable> {
    let filter = drivers.demux.set_filter(pmt_pid, TABLE_ID_PMT).await?;
    let result = tokio::time::timeout(PMT_WAIT_TIMEOUT, async {
        loop {
            let bytes = drivers.demux.next_section().await?;
            match decoders.parse_pmt(&bytes) {
                Ok(pmt) => return Ok(pmt),
                Err(e) => {
                    log::warn!("discarding invalid PMT section: {e}");
                    continue;
                }
            }
        }
    })
    .await;
    drivers.demux.free_filter(filter).await?;

    match result {
        Ok(inner) => inner,
        Err(_) => Err(DvbError::Timeout("PMT section")),
    }
}

/// The present/following EIT PID carries sections for every service
/// multiplexed together, so sections for other services are discarded
/// until one matching `service_id` turns up or the deadline passes.
async fn fetch_eit(drivers: &DriverSet, decoders: &SectionDecoders, service_id: u16) -> Result<crate::si::EitTable> {
    let filter = drivers.demux.set_filter(PID_EIT_PF_ACTUAL, TABLE_ID_EIT_PF_ACTUAL).await?;
    let result = tokio::time::timeout(EIT_WAIT_TIMEOUT, async {
        loop {
            let bytes = drivers.demux.next_section().await?;
            match decoders.parse_eit(&bytes) {
                Ok(eit) if eit.header.service_id == service_id => return Ok(eit),
                Ok(_) => continue,
                Err(e) => {
                    log::warn!("discarding invalid EIT section: {e}");
                    continue;
                }
            }
        }
    })
    .await;
    drivers.demux.free_filter(filter).await?;

    match result {
        Ok(inner) => inner,
        Err(_) => Err(DvbError::Timeout("EIT section")),
    }
}

/// Advances `current` (a 0-based channel index) by one, wrapping to `0`
/// after the last navigable channel.
fn next_channel_up(shared: &Arc<Shared>, current: u16) -> u16 {
    let channel_count = shared.pat.lock().as_ref().map(|p| p.channel_count()).unwrap_or(0) as u16;
    if channel_count == 0 {
        0
    } else {
        (current + 1) % channel_count
    }
}

/// Retracts `current` (a 0-based channel index) by one, wrapping to the
/// last navigable channel from `0`.
fn next_channel_down(shared: &Arc<Shared>, current: u16) -> u16 {
    let channel_count = shared.pat.lock().as_ref().map(|p| p.channel_count()).unwrap_or(0) as u16;
    if channel_count == 0 {
        0
    } else {
        (current + channel_count - 1) % channel_count
    }
}
