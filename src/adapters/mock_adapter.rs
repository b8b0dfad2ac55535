//! In-memory transport for testing
//!
//! Stands in for the rig board without hardware. It provides:
//! - Injectable inbound bytes (raw or as firmware-encoded samples)
//! - Capture of every outbound frame for verification
//! - One-shot write failure injection
//!
//! Clones share the same buffers, so a test can keep one handle while the poll loop
//! owns the other.

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::Transport;
use crate::error::AppResult;
use crate::protocol::codec::{decode_command, encode_sample};
use crate::protocol::{Sample, SignalType};

/// Mock rig transport.
///
/// # Example
///
/// ```
/// use taskrig::adapters::{MockTransport, Transport};
/// use taskrig::protocol::{Sample, SignalType};
/// use bytes::BytesMut;
///
/// let mut transport = MockTransport::new();
/// transport.push_sample(Sample { signal_type: SignalType::Lever, timestamp: 1, value: 5 });
/// let mut buffer = BytesMut::new();
/// assert_eq!(transport.read_available(&mut buffer).unwrap(), 10);
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    inbound: Arc<Mutex<VecDeque<u8>>>,
    outbound: Arc<Mutex<Vec<Bytes>>>,
    resets: Arc<AtomicUsize>,
    fail_next_write: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue raw inbound bytes.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.inbound.lock().extend(bytes.iter().copied());
    }

    /// Queue one sample encoded as the firmware would send it.
    pub fn push_sample(&self, sample: Sample) {
        self.push_bytes(&encode_sample(&sample));
    }

    /// Every frame written so far.
    pub fn written(&self) -> Vec<Bytes> {
        self.outbound.lock().clone()
    }

    /// Written frames decoded back into `(signal kind, payload)`.
    pub fn sent_commands(&self) -> Vec<(SignalType, i32)> {
        self.outbound
            .lock()
            .iter()
            .filter_map(|frame| decode_command(frame))
            .collect()
    }

    /// Number of input buffer resets requested.
    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    /// Make the next write fail with a broken pipe.
    pub fn trigger_write_failure(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    fn bytes_available(&mut self) -> AppResult<usize> {
        Ok(self.inbound.lock().len())
    }

    fn read_available(&mut self, buffer: &mut BytesMut) -> AppResult<usize> {
        let mut inbound = self.inbound.lock();
        let count = inbound.len();
        buffer.extend(inbound.drain(..));
        Ok(count)
    }

    fn write_all(&mut self, frame: &[u8]) -> AppResult<()> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into());
        }
        self.outbound.lock().push(Bytes::copy_from_slice(frame));
        Ok(())
    }

    fn reset_input_buffer(&mut self) -> AppResult<()> {
        self.inbound.lock().clear();
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
