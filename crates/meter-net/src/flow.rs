//! C4: before a scene flow is locked, every inbound TCP segment with a
//! payload is checked against three signature heuristics (root spec §4.4).
//! A match locks onto a 5-tuple and a direction, and seeds the sequence
//! number the TCP reassembler (C5) should start from.
//!
//! The two "Notify" signatures describe an inner record nested inside the
//! segment payload: a 2-byte marker, then a 4-byte big-endian length
//! prefix, then the record body. This module resolves the root spec's
//! `bytes[5..11]` as relative to that record body (see `DESIGN.md`, Open
//! Question: flow-signature byte offsets).

use std::net::SocketAddrV4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSegmentMeta {
    pub src: SocketAddrV4,
    pub dst: SocketAddrV4,
    pub seq: u32,
    pub ack: u32,
}

/// The locked flow the TCP reassembler should operate on: the direction
/// carrying server-to-client (`src` -> `dst`) scene traffic, plus the
/// sequence number the reassembler should treat as "next expected".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowLock {
    pub src: SocketAddrV4,
    pub dst: SocketAddrV4,
    pub seed_seq: u32,
}

const FRAME_DOWN_MARKER: [u8; 2] = [0x00, 0x06];
const FRAME_DOWN_RECORD_SIG: [u8; 6] = [0x00, 0x63, 0x33, 0x53, 0x42, 0x00];
const FRAME_UP_MARKER: [u8; 2] = [0x00, 0x05];
const FRAME_UP_RECORD_SIG: [u8; 6] = [0x00, 0x06, 0x26, 0xad, 0x66, 0x00];

const LOGIN_RETURN_LEN: usize = 0x62;
const LOGIN_RETURN_HEAD: [u8; 10] = [0x00, 0x00, 0x00, 0x62, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01];
const LOGIN_RETURN_TAIL: [u8; 6] = [0x00, 0x00, 0x00, 0x00, 0x0a, 0x4e];

/// Record body offset within the payload, past the 2-byte marker and the
/// inner record's own 4-byte length prefix.
const NOTIFY_RECORD_BODY_OFFSET: usize = 6 + 4;

fn notify_record_sig(payload: &[u8]) -> Option<&[u8]> {
    payload.get(NOTIFY_RECORD_BODY_OFFSET + 5..NOTIFY_RECORD_BODY_OFFSET + 11)
}

fn matches_frame_down(payload: &[u8]) -> bool {
    payload.get(4..6) == Some(&FRAME_DOWN_MARKER[..])
        && notify_record_sig(payload) == Some(&FRAME_DOWN_RECORD_SIG[..])
}

fn matches_frame_up(payload: &[u8]) -> bool {
    payload.get(4..6) == Some(&FRAME_UP_MARKER[..])
        && notify_record_sig(payload) == Some(&FRAME_UP_RECORD_SIG[..])
}

fn matches_login_return(payload: &[u8]) -> bool {
    payload.len() == LOGIN_RETURN_LEN
        && payload.get(0..10) == Some(&LOGIN_RETURN_HEAD[..])
        && payload.get(14..20) == Some(&LOGIN_RETURN_TAIL[..])
}

/// Inspects one TCP segment against the three signature heuristics.
/// Returns the flow to lock onto, if any matched.
#[must_use]
pub fn inspect(meta: TcpSegmentMeta, payload: &[u8]) -> Option<FlowLock> {
    if matches_frame_down(payload) || matches_login_return(payload) {
        return Some(FlowLock {
            src: meta.src,
            dst: meta.dst,
            seed_seq: meta.seq.wrapping_add(payload.len() as u32),
        });
    }

    if matches_frame_up(payload) {
        return Some(FlowLock {
            src: meta.dst,
            dst: meta.src,
            seed_seq: meta.ack,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> TcpSegmentMeta {
        TcpSegmentMeta {
            src: "10.0.0.1:8888".parse().unwrap(),
            dst: "10.0.0.2:9999".parse().unwrap(),
            seq: 1000,
            ack: 500,
        }
    }

    fn notify_payload(marker: [u8; 2], record_sig: [u8; 6]) -> Vec<u8> {
        let mut payload = vec![0u8; 4];
        payload.extend_from_slice(&marker);
        payload.extend_from_slice(&[0, 0, 0, 6]); // inner record length prefix
        payload.extend_from_slice(&[0xFF; 5]); // record body bytes [0..5]
        payload.extend_from_slice(&record_sig);
        payload
    }

    #[test]
    fn frame_down_notify_locks_forward_direction() {
        let payload = notify_payload(FRAME_DOWN_MARKER, FRAME_DOWN_RECORD_SIG);
        let lock = inspect(meta(), &payload).unwrap();
        assert_eq!(lock.src, meta().src);
        assert_eq!(lock.dst, meta().dst);
        assert_eq!(lock.seed_seq, 1000 + payload.len() as u32);
    }

    #[test]
    fn frame_up_notify_locks_reverse_direction_seeded_by_ack() {
        let payload = notify_payload(FRAME_UP_MARKER, FRAME_UP_RECORD_SIG);
        let lock = inspect(meta(), &payload).unwrap();
        assert_eq!(lock.src, meta().dst);
        assert_eq!(lock.dst, meta().src);
        assert_eq!(lock.seed_seq, 500);
    }

    #[test]
    fn login_return_locks_forward_direction() {
        let mut payload = vec![0u8; LOGIN_RETURN_LEN];
        payload[0..10].copy_from_slice(&LOGIN_RETURN_HEAD);
        payload[14..20].copy_from_slice(&LOGIN_RETURN_TAIL);
        let lock = inspect(meta(), &payload).unwrap();
        assert_eq!(lock.src, meta().src);
        assert_eq!(lock.seed_seq, 1000 + LOGIN_RETURN_LEN as u32);
    }

    #[test]
    fn login_return_wrong_length_does_not_match() {
        let mut payload = vec![0u8; LOGIN_RETURN_LEN + 1];
        payload[0..10].copy_from_slice(&LOGIN_RETURN_HEAD);
        payload[14..20].copy_from_slice(&LOGIN_RETURN_TAIL);
        assert!(inspect(meta(), &payload).is_none());
    }

    #[test]
    fn unrelated_payload_does_not_match() {
        let payload = vec![1, 2, 3, 4, 5, 6, 7, 8];
        assert!(inspect(meta(), &payload).is_none());
    }
}
