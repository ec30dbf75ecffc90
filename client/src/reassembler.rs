//! Packet reassembly.
//!
//! Every inbound datagram goes through [`Reassembler::push`]. Single-packet
//! datagrams come straight back out as a [`Message`]. Fragments of a split
//! response are collected per response ID until all of them are present,
//! then concatenated in index order.
//!
//! Incomplete answers expire after a fixed interval counted from their first
//! fragment. Expiry emits nothing: the request waiting for that answer times
//! out on its own. Fragments with an index outside the declared count are
//! dropped without touching any state, and nothing is reported to the request
//! they may have belonged to, so a lost response can only ever surface as a
//! plain timeout.

use log::{debug, trace, warn};
use shared::{
    ByteReader, CursorError, COMPRESSED_FLAG, FIRST_FRAGMENT_HEADER_LEN, FRAGMENT_HEADER_LEN,
    SINGLE_PACKET_HEADER, SPLIT_PACKET_HEADER,
};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

/// Stand-in for deadlines too far out to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + after`, or a far-future instant when that would overflow.
pub(crate) fn deadline_after(now: Instant, after: Duration) -> Instant {
    now.checked_add(after).unwrap_or_else(|| now + FAR_FUTURE)
}

/// A complete logical message, marker byte first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub payload: Vec<u8>,
    /// Set when the response ID carried the compression bit. The payload is
    /// passed through as received; it is never inflated.
    pub compressed: bool,
}

/// Fragments collected so far for one response ID.
#[derive(Debug)]
struct PendingAnswer {
    total: u8,
    parts: BTreeMap<u8, Vec<u8>>,
    compressed: bool,
    expires_at: Instant,
}

impl PendingAnswer {
    fn is_complete(&self) -> bool {
        self.parts.len() == self.total as usize
    }

    fn assemble(self) -> Vec<u8> {
        self.parts.into_values().flatten().collect()
    }
}

/// Table of split responses in progress, keyed by response ID.
#[derive(Debug)]
pub struct Reassembler {
    answers: HashMap<u32, PendingAnswer>,
    expiry: Duration,
}

impl Reassembler {
    /// Creates an empty table whose answers live for `expiry` after their
    /// first fragment.
    pub fn new(expiry: Duration) -> Self {
        Self {
            answers: HashMap::new(),
            expiry,
        }
    }

    /// Number of split responses still waiting for fragments.
    pub fn pending(&self) -> usize {
        self.answers.len()
    }

    /// Routes one datagram. Returns a message once one is complete.
    pub fn push(&mut self, datagram: &[u8], now: Instant) -> Option<Message> {
        let mut reader = ByteReader::new(datagram);

        match reader.read_i32_le() {
            Ok(SINGLE_PACKET_HEADER) => Some(Message {
                payload: reader.rest().to_vec(),
                compressed: false,
            }),
            Ok(SPLIT_PACKET_HEADER) => self.push_fragment(reader, now),
            Ok(header) => {
                debug!("Dropping datagram with unknown header {}", header);
                None
            }
            Err(_) => {
                debug!("Dropping {}-byte datagram without header", datagram.len());
                None
            }
        }
    }

    fn push_fragment(&mut self, mut reader: ByteReader<'_>, now: Instant) -> Option<Message> {
        let (id, total, index) = match read_fragment_header(&mut reader) {
            Ok(header) => header,
            Err(e) => {
                debug!("Dropping truncated fragment: {}", e);
                return None;
            }
        };

        if index >= total {
            debug!(
                "Dropping fragment {} of response {:#010x} declaring only {} fragments",
                index, id, total
            );
            return None;
        }

        let header_len = if index == 0 {
            FIRST_FRAGMENT_HEADER_LEN
        } else {
            FRAGMENT_HEADER_LEN
        };
        if reader.skip(header_len).is_err() {
            debug!(
                "Dropping fragment {} of response {:#010x}: shorter than its header",
                index, id
            );
            return None;
        }
        let chunk = reader.rest().to_vec();

        let expires_at = deadline_after(now, self.expiry);
        let answer = self.answers.entry(id).or_insert_with(|| {
            trace!("Collecting response {:#010x} in {} fragments", id, total);
            PendingAnswer {
                total,
                parts: BTreeMap::new(),
                compressed: false,
                expires_at,
            }
        });

        // The count declared by the first fragment is the one that holds
        if index >= answer.total {
            debug!(
                "Dropping fragment {} of response {:#010x}: first fragment declared {}",
                index, id, answer.total
            );
            return None;
        }

        if id & COMPRESSED_FLAG != 0 {
            answer.compressed = true;
        }
        answer.parts.insert(index, chunk);

        if !answer.is_complete() {
            return None;
        }

        let answer = self.answers.remove(&id)?;
        let compressed = answer.compressed;
        let payload = answer.assemble();
        if compressed {
            warn!(
                "Response {:#010x} is compressed, which is not supported; passing {} raw bytes through",
                id,
                payload.len()
            );
        }

        Some(Message {
            payload,
            compressed,
        })
    }

    /// Drops every answer whose expiry has passed. Returns how many went.
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.answers.len();
        self.answers.retain(|id, answer| {
            let keep = answer.expires_at > now;
            if !keep {
                debug!(
                    "Discarding response {:#010x}: {}/{} fragments arrived before expiry",
                    id,
                    answer.parts.len(),
                    answer.total
                );
            }
            keep
        });
        before - self.answers.len()
    }

    /// Earliest pending expiry, if any answer is pending.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.answers.values().map(|answer| answer.expires_at).min()
    }
}

fn read_fragment_header(reader: &mut ByteReader<'_>) -> Result<(u32, u8, u8), CursorError> {
    let id = reader.read_u32_le()?;
    let total = reader.read_u8()?;
    let index = reader.read_u8()?;
    Ok((id, total, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::framing::encode_fragment;
    use shared::{single_packet, split_packet};

    fn reassembler() -> Reassembler {
        Reassembler::new(Duration::from_millis(1000))
    }

    fn message(len: usize) -> Vec<u8> {
        let mut message = vec![b'E'];
        message.extend((0..len).map(|i| (i % 251) as u8));
        message
    }

    #[test]
    fn test_single_packet_passes_through() {
        let mut reassembler = reassembler();
        let datagram = single_packet(b"Ihello");

        let out = reassembler.push(&datagram, Instant::now()).unwrap();
        assert_eq!(out.payload, b"Ihello");
        assert!(!out.compressed);
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn test_split_response_in_order() {
        let mut reassembler = reassembler();
        let message = message(100);
        let fragments = split_packet(&message, 9, 32).unwrap();
        let now = Instant::now();

        let last = fragments.len() - 1;
        for fragment in &fragments[..last] {
            assert!(reassembler.push(fragment, now).is_none());
        }
        assert_eq!(reassembler.pending(), 1);

        let out = reassembler.push(&fragments[last], now).unwrap();
        assert_eq!(out.payload, message);
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn test_split_response_out_of_order() {
        let mut reassembler = reassembler();
        let message = message(200);
        let mut fragments = split_packet(&message, 0x1234, 40).unwrap();
        fragments.reverse();
        fragments.swap(1, 3);
        let now = Instant::now();

        let mut output = None;
        for fragment in &fragments {
            assert!(output.is_none());
            output = reassembler.push(fragment, now);
        }

        assert_eq!(output.unwrap().payload, message);
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn test_interleaved_responses() {
        let mut reassembler = reassembler();
        let first = message(50);
        let second = message(100);
        let a = split_packet(&first, 1, 32).unwrap();
        let b = split_packet(&second, 2, 32).unwrap();
        let now = Instant::now();

        assert!(reassembler.push(&a[0], now).is_none());
        assert!(reassembler.push(&b[2], now).is_none());
        assert!(reassembler.push(&b[0], now).is_none());
        assert_eq!(reassembler.pending(), 2);

        assert_eq!(reassembler.push(&a[1], now).unwrap().payload, first);
        assert!(reassembler.push(&b[3], now).is_none());
        assert_eq!(reassembler.push(&b[1], now).unwrap().payload, second);
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn test_invalid_index_creates_no_state() {
        let mut reassembler = reassembler();
        let bogus = encode_fragment(5, 2, 2, 32, b"\xff\xff\xff\xffjunk");

        assert!(reassembler.push(&bogus, Instant::now()).is_none());
        assert_eq!(reassembler.pending(), 0);
        assert_eq!(reassembler.next_expiry(), None);
    }

    #[test]
    fn test_invalid_index_does_not_corrupt_answer() {
        let mut reassembler = reassembler();
        let message = message(50);
        let fragments = split_packet(&message, 5, 32).unwrap();
        assert_eq!(fragments.len(), 2);
        let now = Instant::now();

        assert!(reassembler.push(&fragments[1], now).is_none());
        // Claims a larger total than the first fragment seen
        let bogus = encode_fragment(5, 4, 3, 32, b"zz");
        assert!(reassembler.push(&bogus, now).is_none());
        let bogus = encode_fragment(5, 2, 7, 32, b"zz");
        assert!(reassembler.push(&bogus, now).is_none());
        assert_eq!(reassembler.pending(), 1);

        assert_eq!(reassembler.push(&fragments[0], now).unwrap().payload, message);
    }

    #[test]
    fn test_duplicate_fragment_does_not_complete() {
        let mut reassembler = reassembler();
        let fragments = split_packet(&message(80), 3, 32).unwrap();
        assert_eq!(fragments.len(), 3);
        let now = Instant::now();

        assert!(reassembler.push(&fragments[0], now).is_none());
        assert!(reassembler.push(&fragments[0], now).is_none());
        assert!(reassembler.push(&fragments[1], now).is_none());
        assert!(reassembler.push(&fragments[2], now).is_some());
    }

    #[test]
    fn test_incomplete_answer_expires() {
        let mut reassembler = reassembler();
        let fragments = split_packet(&message(80), 11, 32).unwrap();
        let start = Instant::now();

        reassembler.push(&fragments[0], start);
        assert_eq!(
            reassembler.next_expiry(),
            Some(start + Duration::from_millis(1000))
        );

        assert_eq!(reassembler.expire(start + Duration::from_millis(999)), 0);
        assert_eq!(reassembler.pending(), 1);

        assert_eq!(reassembler.expire(start + Duration::from_millis(1000)), 1);
        assert_eq!(reassembler.pending(), 0);
        assert_eq!(reassembler.next_expiry(), None);

        // Late fragments start a fresh answer rather than completing the old one
        assert!(reassembler.push(&fragments[1], start).is_none());
        assert_eq!(reassembler.pending(), 1);
    }

    #[test]
    fn test_expiry_counts_from_first_fragment() {
        let mut reassembler = Reassembler::new(Duration::from_millis(100));
        let fragments = split_packet(&message(80), 12, 32).unwrap();
        let start = Instant::now();

        reassembler.push(&fragments[0], start);
        reassembler.push(&fragments[1], start + Duration::from_millis(90));

        assert_eq!(reassembler.expire(start + Duration::from_millis(100)), 1);
    }

    #[test]
    fn test_unbounded_expiry_keeps_answer() {
        let mut reassembler = Reassembler::new(Duration::MAX);
        let message = message(80);
        let fragments = split_packet(&message, 13, 32).unwrap();
        let start = Instant::now();

        assert!(reassembler.push(&fragments[0], start).is_none());
        assert!(reassembler.next_expiry().unwrap() > start + Duration::from_secs(86_400));
        assert_eq!(reassembler.expire(start + Duration::from_secs(3_600)), 0);

        assert!(reassembler.push(&fragments[1], start).is_none());
        assert_eq!(reassembler.push(&fragments[2], start).unwrap().payload, message);
    }

    #[test]
    fn test_compressed_flag_is_surfaced() {
        let mut reassembler = reassembler();
        let message = message(40);
        let fragments = split_packet(&message, COMPRESSED_FLAG | 77, 32).unwrap();
        let now = Instant::now();

        let mut output = None;
        for fragment in &fragments {
            output = reassembler.push(fragment, now);
        }

        let output = output.unwrap();
        assert!(output.compressed);
        assert_eq!(output.payload, message);
    }

    #[test]
    fn test_garbage_is_dropped() {
        let mut reassembler = reassembler();
        let now = Instant::now();

        assert!(reassembler.push(&[], now).is_none());
        assert!(reassembler.push(&[0xff, 0xff], now).is_none());
        assert!(reassembler.push(&[0, 0, 0, 0, b'I'], now).is_none());
        // Split header cut off before the index byte
        assert!(reassembler.push(&[0xfe, 0xff, 0xff, 0xff, 1, 0, 0, 0, 2], now).is_none());
        // Fragment 0 too short for its six header bytes
        assert!(reassembler
            .push(&encode_fragment(1, 2, 0, 32, &[]), now)
            .is_none());
        assert_eq!(reassembler.pending(), 0);
    }
}
