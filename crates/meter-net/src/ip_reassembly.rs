//! C3: buffers IPv4 fragments keyed by `(id, src, dst, proto)` and emits a
//! full IP payload once the last fragment arrives. Timeout-evicts entries
//! that never complete.

use std::{
    collections::HashMap,
    net::Ipv4Addr,
    time::{Duration, Instant},
};

use bytes::{Bytes, BytesMut};

/// An inactive fragment set is dropped after this long without a new piece.
pub const FRAGMENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    pub id: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub proto: u8,
}

/// A parsed IPv4 datagram, stripped of its own header.
#[derive(Debug, Clone)]
pub struct Ipv4Datagram {
    pub key: FragmentKey,
    pub more_fragments: bool,
    pub fragment_offset_bytes: u16,
    pub payload: Bytes,
}

/// Parses an IPv4 datagram starting at `data[0]`. Returns `None` if the
/// buffer is too short to hold a valid header or declared total length.
#[must_use]
pub fn parse_ipv4(data: &[u8]) -> Option<Ipv4Datagram> {
    if data.len() < 20 {
        return None;
    }
    let version_ihl = data[0];
    if version_ihl >> 4 != 4 {
        return None;
    }
    let ihl = usize::from(version_ihl & 0x0F) * 4;
    if ihl < 20 || data.len() < ihl {
        return None;
    }

    let total_length = u16::from_be_bytes([data[2], data[3]]) as usize;
    if data.len() < total_length || total_length < ihl {
        return None;
    }

    let id = u16::from_be_bytes([data[4], data[5]]);
    let flags_frag = u16::from_be_bytes([data[6], data[7]]);
    let more_fragments = flags_frag & 0x2000 != 0;
    let fragment_offset_bytes = (flags_frag & 0x1FFF) * 8;

    let proto = data[9];
    let src = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
    let dst = Ipv4Addr::new(data[16], data[17], data[18], data[19]);

    let payload = Bytes::copy_from_slice(&data[ihl..total_length]);

    Some(Ipv4Datagram {
        key: FragmentKey { id, src, dst, proto },
        more_fragments,
        fragment_offset_bytes,
        payload,
    })
}

struct FragmentEntry {
    pieces: Vec<(u16, Bytes)>,
    last_touch: Instant,
}

/// Reassembles fragmented IPv4 datagrams. Non-fragmented datagrams are
/// expected to bypass this entirely (see [`IpReassembler::accept`]).
#[derive(Default)]
pub struct IpReassembler {
    fragments: HashMap<FragmentKey, FragmentEntry>,
}

impl IpReassembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one datagram in. Returns the reassembled IP payload once the
    /// last fragment of its set has arrived (or immediately, for an
    /// unfragmented datagram).
    pub fn accept(&mut self, dgram: Ipv4Datagram, now: Instant) -> Option<Bytes> {
        if !dgram.more_fragments && dgram.fragment_offset_bytes == 0 {
            return Some(dgram.payload);
        }

        let entry = self.fragments.entry(dgram.key).or_insert_with(|| FragmentEntry {
            pieces: Vec::new(),
            last_touch: now,
        });
        entry.pieces.push((dgram.fragment_offset_bytes, dgram.payload));
        entry.last_touch = now;

        if dgram.more_fragments {
            return None;
        }

        // Last fragment arrived: compute total length and copy each piece
        // into place. Later pieces win on overlap (last-writer-wins,
        // documented in the root spec as differing from BSD's first-wins
        // policy but left unaltered).
        let entry = self.fragments.remove(&dgram.key)?;
        let total = entry
            .pieces
            .iter()
            .map(|(offset, payload)| usize::from(*offset) + payload.len())
            .max()
            .unwrap_or(0);

        let mut buf = BytesMut::zeroed(total);
        for (offset, payload) in &entry.pieces {
            let start = usize::from(*offset);
            buf[start..start + payload.len()].copy_from_slice(payload);
        }
        Some(buf.freeze())
    }

    /// Drops fragment sets that have not received a new piece in
    /// [`FRAGMENT_TIMEOUT`]. Intended to run on the same 10 s cadence as the
    /// auto-save ticker (root spec §5).
    pub fn evict_stale(&mut self, now: Instant) {
        self.fragments
            .retain(|_, entry| now.duration_since(entry.last_touch) <= FRAGMENT_TIMEOUT);
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.fragments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipv4_header(id: u16, more_fragments: bool, frag_offset_bytes: u16, payload: &[u8]) -> Vec<u8> {
        let total_length = 20 + payload.len();
        let mut buf = vec![0u8; total_length];
        buf[0] = 0x45; // version 4, IHL 5
        buf[2..4].copy_from_slice(&(total_length as u16).to_be_bytes());
        buf[4..6].copy_from_slice(&id.to_be_bytes());
        let flags_frag = (u16::from(more_fragments) << 13) | (frag_offset_bytes / 8);
        buf[6..8].copy_from_slice(&flags_frag.to_be_bytes());
        buf[9] = 6; // TCP
        buf[12..16].copy_from_slice(&[10, 0, 0, 1]);
        buf[16..20].copy_from_slice(&[10, 0, 0, 2]);
        buf[20..].copy_from_slice(payload);
        buf
    }

    #[test]
    fn unfragmented_datagram_bypasses_buffering() {
        let raw = ipv4_header(1, false, 0, b"hello");
        let dgram = parse_ipv4(&raw).unwrap();
        let mut reassembler = IpReassembler::new();
        let out = reassembler.accept(dgram, Instant::now()).unwrap();
        assert_eq!(&out[..], b"hello");
        assert_eq!(reassembler.pending_count(), 0);
    }

    #[test]
    fn two_fragments_reassemble_regardless_of_order() {
        let part1 = vec![0xAA; 1480];
        let part2 = vec![0xBB; 1520];

        let raw1 = ipv4_header(42, true, 0, &part1);
        let raw2 = ipv4_header(42, false, 1480, &part2);

        let dgram1 = parse_ipv4(&raw1).unwrap();
        let dgram2 = parse_ipv4(&raw2).unwrap();

        // delivered in reverse order, per scenario 5 of the root spec
        let mut reassembler = IpReassembler::new();
        let now = Instant::now();
        assert!(reassembler.accept(dgram2, now).is_none());
        let out = reassembler.accept(dgram1, now).unwrap();

        let mut expected = part1;
        expected.extend_from_slice(&part2);
        assert_eq!(out.len(), 3000);
        assert_eq!(&out[..], &expected[..]);
    }

    #[test]
    fn overlapping_fragments_last_writer_wins() {
        let raw_a = ipv4_header(7, true, 0, &[1, 1, 1, 1]);
        let raw_b = ipv4_header(7, false, 2, &[2, 2, 2, 2]);

        let dgram_a = parse_ipv4(&raw_a).unwrap();
        let dgram_b = parse_ipv4(&raw_b).unwrap();

        let mut reassembler = IpReassembler::new();
        let now = Instant::now();
        assert!(reassembler.accept(dgram_a, now).is_none());
        let out = reassembler.accept(dgram_b, now).unwrap();

        // dgram_b overlaps bytes [2..4] of dgram_a's span and is written
        // second, so it wins there.
        assert_eq!(&out[..], &[1, 1, 2, 2, 2, 2]);
    }

    #[test]
    fn stale_fragment_sets_are_evicted() {
        let raw = ipv4_header(9, true, 0, b"partial");
        let dgram = parse_ipv4(&raw).unwrap();
        let mut reassembler = IpReassembler::new();
        let t0 = Instant::now();
        reassembler.accept(dgram, t0);
        assert_eq!(reassembler.pending_count(), 1);

        reassembler.evict_stale(t0 + FRAGMENT_TIMEOUT + Duration::from_secs(1));
        assert_eq!(reassembler.pending_count(), 0);
    }

    proptest::proptest! {
        #[test]
        fn any_fragment_order_reassembles_to_original(
            seed in proptest::collection::vec(1u8..=250, 2000..=4000),
            split_a in 1usize..1000,
            split_b in 1usize..1000,
            reverse in proptest::bool::ANY,
        ) {
            let total_len = seed.len();
            // Fragment offsets are only representable in 8-byte units, so
            // split points must land on an 8-byte boundary.
            let split1 = (split_a.min(total_len / 3).max(1) / 8).max(1) * 8;
            let split2_raw = split1 + split_b.min(total_len / 3).max(1);
            let split2 = ((split2_raw.min(total_len - 1).max(split1 + 8)) / 8).max(split1 / 8 + 1) * 8;
            let split2 = split2.min(total_len - 1);

            let part1 = &seed[..split1];
            let part2 = &seed[split1..split2];
            let part3 = &seed[split2..];

            let raw1 = ipv4_header(123, true, 0, part1);
            let raw2 = ipv4_header(123, true, split1 as u16, part2);
            let raw3 = ipv4_header(123, false, split2 as u16, part3);

            let mut frags = vec![
                parse_ipv4(&raw1).unwrap(),
                parse_ipv4(&raw2).unwrap(),
                parse_ipv4(&raw3).unwrap(),
            ];
            if reverse {
                frags.reverse();
            }

            let mut reassembler = IpReassembler::new();
            let now = Instant::now();
            let mut result = None;
            for frag in frags {
                if let Some(out) = reassembler.accept(frag, now) {
                    result = Some(out);
                }
            }

            proptest::prop_assert_eq!(result.unwrap().to_vec(), seed);
        }
    }
}
