//! # Taskrig Core Library
//!
//! Host-side controller for a behavioral task rig: a microcontroller board streams
//! lever, lick and timing samples over USB serial and accepts water and TTL commands.
//! The library decodes the stream, classifies lever pushes and licks, and drives the
//! board on a fixed poll cadence. The `taskrig` binary is a thin CLI over it.
//!
//! ## Crate Structure
//!
//! - **`protocol`**: Wire constants, signal kinds and the record codec.
//! - **`processing`**: Despiking, the lever and lick classifiers and the reward
//!   volume to valve-time conversion.
//! - **`router`**: Splits a decoded burst by signal kind and produces [`router::RigEvent`]s.
//! - **`poll_loop`**: The single owner of transport and buffers, with its async driver
//!   and [`poll_loop::RigHandle`].
//! - **`adapters`**: The [`adapters::Transport`] seam, the USB serial implementation and
//!   an in-memory mock.
//! - **`audio`**: Host-side sound playback seam.
//! - **`session`**: JSON session record written when a session ends.
//! - **`config`** / **`device_config`**: Application settings (figment) and per-rig
//!   classifier thresholds with `base` inheritance.
//! - **`error`**: The crate-wide [`error::RigError`].
//! - **`tracing_setup`**: Subscriber initialization.

/// Byte transports to the rig board.
pub mod adapters;
pub mod audio;
pub mod config;
pub mod device_config;
pub mod error;
pub mod poll_loop;
pub mod processing;
pub mod protocol;
pub mod router;
pub mod session;
pub mod tracing_setup;

pub use error::{AppResult, RigError};
pub use poll_loop::{LoopState, PollLoop, RigCommand, RigHandle};
pub use router::RigEvent;
