//! Framing and unframing of the rig byte stream.
//!
//! Decoding works on a receive buffer owned by the caller. It only consumes complete
//! records; anything incomplete stays in the buffer so the next read can finish it.
//! This makes decoding insensitive to where the transport splits the stream.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use super::{Burst, Command, Sample, SignalType, SEPARATOR};

/// Size of a sample record without its separator: `type:u8 | timestamp:u32 | value:i32`.
pub const FIRST_RECORD_SIZE: usize = 1 + 4 + 4;

/// Size of a framed sample record including the leading separator.
pub const RECORD_SIZE: usize = 1 + FIRST_RECORD_SIZE;

/// Size of a framed outbound command: `SEPARATOR | type:u8 | value:i32`.
pub const SEND_RECORD_SIZE: usize = 1 + 1 + 4;

/// Decode every complete record currently held in `buffer`.
///
/// Bytes before the first plausible record start are discarded (the firmware may
/// have been mid-record when the port was opened). Payload bytes can equal the
/// separator, so a separator only counts as a record start when it is followed by a
/// known signal code and the byte one record further on is a separator too, as far
/// as the buffer reaches. If less than one full record follows the start, the buffer
/// is left positioned on it and an empty burst is returned. A record that does not
/// start with the separator ends the burst; it is resynchronized on the next call.
pub fn decode(buffer: &mut BytesMut) -> Burst {
    match find_record_start(&buffer[..]) {
        Some(0) => {}
        Some(skipped) => {
            trace!(skipped, "Resynchronizing rig stream");
            buffer.advance(skipped);
        }
        None => {
            if !buffer.is_empty() {
                trace!(skipped = buffer.len(), "No record start in rig stream");
                buffer.clear();
            }
            return Burst::new();
        }
    }

    let mut burst = Burst::with_capacity(buffer.len() / RECORD_SIZE);
    while buffer.len() >= RECORD_SIZE {
        if buffer[0] != SEPARATOR {
            trace!(byte = buffer[0], "Misaligned record, deferring to resync");
            break;
        }
        buffer.advance(1);
        let code = buffer.get_u8();
        let timestamp = buffer.get_u32();
        let value = buffer.get_i32();
        match SignalType::from_u8(code) {
            Some(signal_type) => burst.push(Sample {
                signal_type,
                timestamp,
                value,
            }),
            None => debug!(code, timestamp, "Ignoring unknown signal type"),
        }
    }
    burst
}

/// Index of the first separator that can start a record.
fn find_record_start(buffer: &[u8]) -> Option<usize> {
    (0..buffer.len()).find(|&pos| {
        buffer[pos] == SEPARATOR
            && !matches!(buffer.get(pos + 1), Some(&code) if SignalType::from_u8(code).is_none())
            && !matches!(buffer.get(pos + RECORD_SIZE), Some(&next) if next != SEPARATOR)
    })
}

/// Encode an outbound command.
pub fn encode(command: Command) -> Bytes {
    let (signal_type, value) = command.wire_fields();
    let mut frame = BytesMut::with_capacity(SEND_RECORD_SIZE);
    frame.put_u8(SEPARATOR);
    frame.put_u8(signal_type.code());
    frame.put_i32(value);
    frame.freeze()
}

/// Encode a sample the way the firmware emits it.
///
/// Used by the mock transport to stand in for the device.
pub fn encode_sample(sample: &Sample) -> Bytes {
    let mut frame = BytesMut::with_capacity(RECORD_SIZE);
    frame.put_u8(SEPARATOR);
    frame.put_u8(sample.signal_type.code());
    frame.put_u32(sample.timestamp);
    frame.put_i32(sample.value);
    frame.freeze()
}

/// Parse one outbound command frame back into its signal kind and payload.
///
/// Returns `None` for frames of the wrong size, without a separator, or with an
/// unknown signal code.
pub fn decode_command(mut frame: &[u8]) -> Option<(SignalType, i32)> {
    if frame.len() != SEND_RECORD_SIZE || frame.get_u8() != SEPARATOR {
        return None;
    }
    let signal_type = SignalType::from_u8(frame.get_u8())?;
    Some((signal_type, frame.get_i32()))
}
