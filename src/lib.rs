#![doc(html_root_url = "https://docs.rs/dvbcore/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # dvbcore
//!
//! `dvbcore` is the stream-control engine of a DVB set-top-box
//! application: PSI/SI section decoding (PAT, PMT, present/following EIT),
//! a per-service event-name cache, and the tuner/PAT/PMT/EIT acquisition
//! state machine that drives channel playback.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dvbcore::config::Config;
//! use dvbcore::controller::{DriverSet, StreamController};
//! use dvbcore::controller::testing::MockDriver;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file("dvbcore.conf")?;
//! let mock = MockDriver::new();
//! let drivers = DriverSet {
//!     tuner: mock.clone(),
//!     player: mock.clone(),
//!     demux: mock.clone(),
//! };
//!
//! let (controller, _worker) = StreamController::init(drivers, config);
//! let info = controller.channel_acquired().await?;
//! println!("now playing program {}", info.program_number);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - `si`: PAT/PMT/EIT section types and decoders
//! - `event_cache`: per-service "now" event name/genre cache
//! - `controller`: the acquisition/channel-change state machine, the
//!   `TunerDriver`/`PlayerDriver`/`DemuxDriver` boundary traits, and a
//!   `MockDriver` test double
//! - `config`: tuner/channel configuration file loading
//! - `error`: crate-wide error type
//! - `utils`: CRC32 helper used by tests to build section fixtures

/// Configuration loading (tuner frequency, bandwidth, modulation, starting channel)
pub mod config;

/// Stream-control state machine and driver boundary
pub mod controller;

/// Per-service "now" event cache
pub mod event_cache;

/// Error types and utilities
pub mod error;

/// PSI/SI section types and decoders
pub mod si;

/// Common utilities and helper functions
pub mod utils;

pub use error::{DvbError, Result};
