//! C5: orders segments on the locked flow by sequence number, concatenates
//! contiguous bytes, drops duplicates/overlaps and already-consumed
//! retransmissions, and tracks `next_seq`. Stall detection (root spec §5)
//! is exposed via [`TcpReassembler::is_stalled`] so the caller can decide to
//! reset the flow.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use bytes::{Bytes, BytesMut};

use crate::MAX_FRAME_LEN;

/// Root spec §5: "TCP flow stall: 30 s since last contiguous byte".
pub const STALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Default)]
pub struct TcpReassembler {
    data: BytesMut,
    cache: HashMap<u32, Bytes>,
    next_seq: Option<u32>,
    last_activity: Option<Instant>,
}

impl TcpReassembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the flow identifier (C4) when a signature locks a flow,
    /// providing the seed sequence number directly.
    pub fn seed(&mut self, seq: u32) {
        self.next_seq = Some(seq);
    }

    /// Clears all reassembly state: on flow change or stall reset.
    pub fn reset(&mut self) {
        self.data.clear();
        self.cache.clear();
        self.next_seq = None;
        self.last_activity = None;
    }

    /// The growing contiguous byte stream. The frame splitter (C6) reads
    /// from the front of this buffer and advances it as frames are popped.
    pub fn buffer(&mut self) -> &mut BytesMut {
        &mut self.data
    }

    #[must_use]
    pub fn is_stalled(&self, now: Instant) -> bool {
        self.last_activity
            .is_some_and(|last| now.duration_since(last) > STALL_TIMEOUT)
    }

    /// Feeds one TCP segment in. Root spec §4.5 steps 1-3.
    pub fn process_segment(&mut self, seq: u32, payload: Bytes, now: Instant) {
        if self.next_seq.is_none() {
            if !plausible_length_prefix(&payload) {
                return;
            }
            self.next_seq = Some(seq);
        }

        // next_seq - seq as a signed 32-bit value: <= 0 means "ahead of or
        // exactly at expected", i.e. not a pure retransmission of bytes
        // already consumed.
        let next_seq = self.next_seq.expect("set above");
        let diff = next_seq.wrapping_sub(seq) as i32;
        if diff <= 0 {
            self.cache.insert(seq, payload);
        }

        while let Some(payload) = self.cache.remove(&self.next_seq.expect("set above")) {
            self.data.extend_from_slice(&payload);
            self.next_seq = Some(self.next_seq.expect("set above").wrapping_add(payload.len() as u32));
            self.last_activity = Some(now);
        }
    }
}

fn plausible_length_prefix(payload: &[u8]) -> bool {
    let Some(bytes) = payload.get(0..4) else {
        return false;
    };
    let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    len < MAX_FRAME_LEN
}
