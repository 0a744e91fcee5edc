//! DRF day-file decoder/extractor and ring-to-TCP fan-out server for
//! seismic waveform data.
//!
//! Two subsystems share a packet codec and a sample-width convention:
//! [`drf`] reads day-indexed binary files and emits text; [`fanout`]
//! reads a multiplexed ring buffer and fans packed samples out to TCP
//! subscribers.

pub mod codec;
pub mod drf;
pub mod error;
pub mod fanout;
pub mod time_fmt;
pub mod width;

pub use error::{Result, SeismuxError};
