//! Wire format of the orientation feed.
//!
//! Each UDP datagram carries six little-endian `f64` values laid out as
//! `[x, y, z, yaw, pitch, roll]`. Anything that is not exactly 48 bytes is
//! rejected.

use std::io::{self, Cursor};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::DecodeError;
use crate::OrientationSample;

pub const FIELD_COUNT: usize = 6;
pub const PACKET_SIZE: usize = FIELD_COUNT * std::mem::size_of::<f64>();

/// Receive buffer for the decoders. Large enough that a truncated oversized
/// datagram still fails decoding.
pub const RECV_BUFFER_SIZE: usize = 1024;

const WSAEMSGSIZE: i32 = 10040;

pub fn decode(datagram: &[u8]) -> Result<OrientationSample, DecodeError> {
    if datagram.len() != PACKET_SIZE {
        return Err(DecodeError::MalformedPacket {
            len: datagram.len(),
            expected: PACKET_SIZE,
        });
    }

    let mut fields = [0.0f64; FIELD_COUNT];
    let mut cursor = Cursor::new(datagram);
    cursor
        .read_f64_into::<LittleEndian>(&mut fields)
        .map_err(|_| DecodeError::MalformedPacket {
            len: datagram.len(),
            expected: PACKET_SIZE,
        })?;

    Ok(OrientationSample {
        x: fields[0],
        y: fields[1],
        z: fields[2],
        yaw: fields[3],
        pitch: fields[4],
        roll: fields[5],
    })
}

/// Serialises a sample into the wire layout. Used by senders and tests.
pub fn encode(sample: &OrientationSample) -> [u8; PACKET_SIZE] {
    let mut out = [0u8; PACKET_SIZE];
    let mut writer = &mut out[..];
    for value in [
        sample.x,
        sample.y,
        sample.z,
        sample.yaw,
        sample.pitch,
        sample.roll,
    ] {
        // Writing into a slice of exactly PACKET_SIZE bytes cannot run short.
        let _ = writer.write_f64::<LittleEndian>(value);
    }
    out
}

/// Convenience for feeds that only vary yaw and pitch.
pub fn encode_yaw_pitch(yaw: f64, pitch: f64) -> [u8; PACKET_SIZE] {
    encode(&OrientationSample {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        yaw,
        pitch,
        roll: 0.0,
    })
}

/// Windows reports a datagram larger than the receive buffer as an error
/// instead of truncating it. Such a receive is a bad packet, not a dead
/// socket.
pub fn is_oversized(e: &io::Error) -> bool {
    e.raw_os_error() == Some(WSAEMSGSIZE)
}
