//! Datagram framing for logical messages.
//!
//! A message that fits in one datagram travels as `int32(-1) || message`.
//! Larger messages are cut into numbered fragments:
//!
//! ```text
//! int32(-2) | u32 response_id | u8 total | u8 index | u16 max_payload | chunk
//! ```
//!
//! The chunks split `int32(-1) || message`, so fragment 0 carries the
//! single-packet header at the start of its chunk. A reassembler strips six
//! bytes after the index byte of fragment 0 and two bytes from every other
//! fragment, and gets `message` back.

use thiserror::Error;

use crate::{ByteWriter, SINGLE_PACKET_HEADER, SPLIT_PACKET_HEADER};

/// Smallest chunk that still holds the embedded single-packet header.
pub const MIN_FRAGMENT_PAYLOAD: usize = 4;

/// Failure while framing or unframing a datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("fragment payload must be at least {MIN_FRAGMENT_PAYLOAD} bytes, got {0}")]
    PayloadTooSmall(usize),
    #[error("message of {len} bytes needs {needed} fragments, at most 255 fit")]
    TooManyFragments { len: usize, needed: usize },
}

/// Prefixes `message` with the single-packet header.
pub fn single_packet(message: &[u8]) -> Vec<u8> {
    let mut writer = ByteWriter::with_capacity(message.len() + 4);
    writer.write_i32_le(SINGLE_PACKET_HEADER).write_bytes(message);
    writer.into_inner()
}

/// Builds one split-response datagram.
pub fn encode_fragment(
    response_id: u32,
    total: u8,
    index: u8,
    max_payload: u16,
    chunk: &[u8],
) -> Vec<u8> {
    let mut writer = ByteWriter::with_capacity(chunk.len() + 12);
    writer
        .write_i32_le(SPLIT_PACKET_HEADER)
        .write_u32_le(response_id)
        .write_u8(total)
        .write_u8(index)
        .write_u16_le(max_payload)
        .write_bytes(chunk);
    writer.into_inner()
}

/// Splits `message` into fragments of at most `max_payload` chunk bytes,
/// returned in index order.
pub fn split_packet(
    message: &[u8],
    response_id: u32,
    max_payload: usize,
) -> Result<Vec<Vec<u8>>, FramingError> {
    if max_payload < MIN_FRAGMENT_PAYLOAD {
        return Err(FramingError::PayloadTooSmall(max_payload));
    }

    let framed = single_packet(message);
    let needed = framed.len().div_ceil(max_payload);
    if needed > u8::MAX as usize {
        return Err(FramingError::TooManyFragments {
            len: message.len(),
            needed,
        });
    }

    let size_field = max_payload.min(u16::MAX as usize) as u16;
    Ok(framed
        .chunks(max_payload)
        .enumerate()
        .map(|(index, chunk)| {
            encode_fragment(response_id, needed as u8, index as u8, size_field, chunk)
        })
        .collect())
}
