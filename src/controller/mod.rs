//! Stream-control engine: drives tuner lock, PAT/PMT/EIT acquisition, and
//! channel-change on top of a [`driver::DriverSet`].

pub mod driver;
pub mod testing;
mod worker;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::event_cache::EventCacheEntry;
use crate::error::{DvbError, Result};

pub use driver::{DemuxDriver, DriverSet, PlayerDriver, StreamKind, TunerDriver};
pub use worker::{ChannelInfo, State, VOLUME_SCALE};

use worker::{Command, Shared};

/// Public handle to the running stream-control engine. Cloning is cheap;
/// every clone talks to the same worker task.
#[derive(Clone)]
pub struct StreamController {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl StreamController {
    /// Spawns the worker task, which immediately begins the acquisition
    /// sequence: tuner init, frequency lock, PAT acquisition, then the
    /// configured starting channel. Returns once the task is spawned, not
    /// once acquisition completes — await [`StreamController::channel_acquired`]
    /// for that.
    pub fn init(drivers: DriverSet, config: Config) -> (Self, JoinHandle<()>) {
        let shared = Arc::new(Shared::new());
        let (tx, rx) = mpsc::unbounded_channel();

        let task_shared = shared.clone();
        let handle = tokio::spawn(worker::run(task_shared, drivers, config, rx));

        (
            Self {
                shared,
                commands: tx,
            },
            handle,
        )
    }

    /// Signals the worker task to release all driver resources and stop.
    /// The returned future resolves once the shutdown command is enqueued,
    /// not once teardown completes; await the `JoinHandle` from
    /// [`StreamController::init`] for that.
    pub fn deinit(&self) -> Result<()> {
        self.commands
            .send(Command::Shutdown)
            .map_err(|_| DvbError::NotInitialized)
    }

    /// Switches to the next higher channel position, wrapping to the first
    /// channel after the last.
    pub fn channel_up(&self) -> Result<()> {
        self.commands
            .send(Command::ChannelUp)
            .map_err(|_| DvbError::NotInitialized)
    }

    /// Switches to the next lower channel position, wrapping to the last
    /// channel before the first.
    pub fn channel_down(&self) -> Result<()> {
        self.commands
            .send(Command::ChannelDown)
            .map_err(|_| DvbError::NotInitialized)
    }

    /// Switches directly to `channel_number` (1-based position among the
    /// acquired PAT's navigable channels).
    pub fn change_channel(&self, channel_number: u16) -> Result<()> {
        self.commands
            .send(Command::ChangeChannel(channel_number))
            .map_err(|_| DvbError::NotInitialized)
    }

    /// Sets the output volume (`0..=10`); internally scaled by [`VOLUME_SCALE`].
    /// Values outside that range are logged and ignored.
    pub fn set_volume(&self, volume: u8) -> Result<()> {
        self.commands
            .send(Command::SetVolume(volume))
            .map_err(|_| DvbError::NotInitialized)
    }

    /// Registers a callback invoked once per channel acquisition with the
    /// resolved video pid, or `-1` if none was found.
    pub fn register_program_type_callback<F>(&self, callback: F)
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        *self.shared.program_type_callback.lock() = Some(Box::new(callback));
    }

    /// Returns the currently playing channel's info.
    pub fn current_channel(&self) -> ChannelInfo {
        self.shared.current_channel.lock().clone()
    }

    /// Current worker lifecycle state.
    pub fn state(&self) -> State {
        *self.shared.state.lock()
    }

    /// Number of navigable channels in the acquired PAT, or 0 if the PAT
    /// hasn't been acquired yet.
    pub fn channel_count(&self) -> u8 {
        self.shared
            .pat
            .lock()
            .as_ref()
            .map(|pat| pat.channel_count())
            .unwrap_or(0)
    }

    /// Cached "now" event info for `service_id`, if the event cache has
    /// been populated for it.
    pub fn get_event_info(&self, service_id: u16) -> Option<EventCacheEntry> {
        self.shared.event_cache.lock().lookup(service_id).cloned()
    }

    /// Resolves with the `ChannelInfo` of the next channel acquisition to
    /// complete after this call. A fresh subscription only observes *future*
    /// changes, so callers that want synchronous-looking behavior should
    /// call this immediately after `channel_up`/`channel_down`/
    /// `change_channel`.
    pub async fn channel_acquired(&self) -> Result<ChannelInfo> {
        let mut rx = self.shared.channel_acquired_tx.subscribe();
        rx.changed()
            .await
            .map_err(|_| DvbError::Driver("channel acquisition signal closed".into()))?;
        rx.borrow()
            .clone()
            .ok_or_else(|| DvbError::Driver("channel acquisition signal fired with no channel".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockDriver;
    use super::*;
    use crate::config::Config;
    use crate::si::SectionDecoders;
    use std::sync::Arc;

    fn pat_section(entries: &[(u16, u16)]) -> Vec<u8> {
        let mut bytes = vec![0x00, 0x00, 0x00, 0x00, 0x01, 0xC1, 0x00, 0x00];
        for (program_number, pid) in entries {
            bytes.push((program_number >> 8) as u8);
            bytes.push(*program_number as u8);
            bytes.push(0xE0 | ((pid >> 8) as u8 & 0x1F));
            bytes.push(*pid as u8);
        }
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        let section_length = (bytes.len() - 3) as u16;
        bytes[1] = 0xB0 | ((section_length >> 8) as u8 & 0x0F);
        bytes[2] = section_length as u8;
        bytes
    }

    fn pmt_section(program_number: u16, video_pid: u16, audio_pid: u16) -> Vec<u8> {
        let mut bytes = vec![
            0x02, 0x00, 0x00,
            (program_number >> 8) as u8, program_number as u8,
            0xC1, 0x00, 0x00,
            0xE1, 0x00,
            0xF0, 0x00,
        ];
        bytes.push(0x02);
        bytes.push((video_pid >> 8) as u8);
        bytes.push(video_pid as u8);
        bytes.push(0xF0);
        bytes.push(0x00);
        bytes.push(0x04);
        bytes.push((audio_pid >> 8) as u8);
        bytes.push(audio_pid as u8);
        bytes.push(0xF0);
        bytes.push(0x00);
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        let section_length = (bytes.len() - 3) as u16;
        bytes[1] = 0xB0 | ((section_length >> 8) as u8 & 0x0F);
        bytes[2] = section_length as u8;
        bytes
    }

    #[tokio::test]
    async fn acquires_pat_and_starts_configured_channel() {
        let mock = MockDriver::new();
        let drivers = DriverSet {
            tuner: mock.clone(),
            player: mock.clone(),
            demux: mock.clone(),
        };
        let config = Config {
            frequency: 754_000_000,
            bandwidth: 8,
            module: crate::config::Modulation::DvbT2,
            program_number: 1,
        };

        let (controller, _join) = StreamController::init(drivers, config);

        // Broadcast program numbers are ordinary, non-contiguous ids, not a
        // 0..N sequence: position 1 (the first navigable channel) carries
        // program number 305 here, not 1.
        mock.push_locked();
        mock.push_section(pat_section(&[(0, 0x0010), (305, 0x0100)]));
        mock.push_section(pmt_section(305, 0x0200, 0x0300));

        let info = tokio::time::timeout(std::time::Duration::from_secs(2), controller.channel_acquired())
            .await
            .expect("acquisition should complete")
            .unwrap();

        assert_eq!(info.program_number, 1);
        assert_eq!(info.video_pid, Some(0x0200));
        assert_eq!(info.audio_pid, Some(0x0300));
        assert_eq!(controller.channel_count(), 1);
        assert_eq!(mock.streams_created.lock().len(), 2);
    }

    #[test]
    fn section_decoders_are_reentrant_across_calls() {
        let decoders = SectionDecoders::new();
        let bytes = pat_section(&[(0, 0x0010)]);
        let first = decoders.parse_pat(&bytes).unwrap();
        let second = decoders.parse_pat(&bytes).unwrap();
        assert_eq!(first.services, second.services);
    }

    #[test]
    fn program_type_callback_can_be_registered_without_panicking() {
        let mock = MockDriver::new();
        let drivers = DriverSet {
            tuner: mock.clone(),
            player: mock.clone(),
            demux: mock.clone(),
        };
        let config = Config::default();
        let (controller, _join) = StreamController::init(drivers, config);

        let seen = Arc::new(parking_lot::Mutex::new(None));
        let seen_clone = seen.clone();
        controller.register_program_type_callback(move |video_pid| {
            *seen_clone.lock() = Some(video_pid);
        });
        assert!(seen.lock().is_none());
    }
}
