//! Wires C2 through C6 together the way the root spec's "processing task"
//! is described in §5: a single owner draining one frame at a time,
//! holding exclusive access to `_data`, `tcp_next_seq`, `tcp_cache`,
//! `tcp_last_time`, `current_server`, and the IP fragment cache for the
//! duration of processing that frame.

use std::{net::SocketAddrV4, time::Instant};

use bytes::Bytes;

use crate::{
    capture::{strip_link_header, RawFrame},
    flow::{self, FlowLock, TcpSegmentMeta},
    ip_reassembly::{parse_ipv4, IpReassembler},
    tcp_reassembly::TcpReassembler,
    NetError,
};

/// One outcome of feeding a raw captured frame through the pipeline.
#[derive(Debug)]
pub enum PipelineEvent {
    /// The flow identifier (C4) locked onto a new 5-tuple. Callers should
    /// notify the statistics engine (`clearDataOnServerChange`, root spec
    /// §4.4) and reset any per-flow caches of their own.
    FlowLocked(FlowLock),
    /// One complete application frame (C6), including its length prefix.
    Frame(Bytes),
}

struct TcpHeader {
    src_port: u16,
    dst_port: u16,
    seq: u32,
    ack: u32,
    payload: Bytes,
}

fn parse_tcp(segment: &Bytes) -> Option<TcpHeader> {
    if segment.len() < 20 {
        return None;
    }
    let src_port = u16::from_be_bytes([segment[0], segment[1]]);
    let dst_port = u16::from_be_bytes([segment[2], segment[3]]);
    let seq = u32::from_be_bytes([segment[4], segment[5], segment[6], segment[7]]);
    let ack = u32::from_be_bytes([segment[8], segment[9], segment[10], segment[11]]);
    let data_offset = usize::from(segment[12] >> 4) * 4;
    if data_offset < 20 || segment.len() < data_offset {
        return None;
    }
    let payload = segment.slice(data_offset..);
    Some(TcpHeader { src_port, dst_port, seq, ack, payload })
}

/// Owns all mutable pipeline state for one in-progress capture session.
pub struct Pipeline {
    ip_reassembler: IpReassembler,
    tcp_reassembler: TcpReassembler,
    current_flow: Option<FlowLock>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ip_reassembler: IpReassembler::new(),
            tcp_reassembler: TcpReassembler::new(),
            current_flow: None,
        }
    }

    #[must_use]
    pub fn current_flow(&self) -> Option<FlowLock> {
        self.current_flow
    }

    /// Feeds one captured frame through C2-C6. Returns zero or more events;
    /// an oversized frame length (C6) is propagated as a fatal error, per
    /// root spec §4.6/§7.
    pub fn process_raw_frame(
        &mut self,
        frame: &RawFrame,
        now: Instant,
    ) -> Result<Vec<PipelineEvent>, NetError> {
        let mut events = Vec::new();

        let Some(ip_bytes) = strip_link_header(frame) else {
            return Ok(events);
        };
        let Some(dgram) = parse_ipv4(ip_bytes) else {
            return Ok(events);
        };
        let Some(tcp_segment) = self.ip_reassembler.accept(dgram.clone(), now) else {
            return Ok(events);
        };
        let Some(tcp) = parse_tcp(&tcp_segment) else {
            return Ok(events);
        };

        let src = SocketAddrV4::new(dgram.key.src, tcp.src_port);
        let dst = SocketAddrV4::new(dgram.key.dst, tcp.dst_port);

        if tcp.payload.is_empty() {
            return Ok(events);
        }

        match self.current_flow {
            Some(lock) if lock.src == src && lock.dst == dst => {
                self.tcp_reassembler.process_segment(tcp.seq, tcp.payload, now);
                while let Some(app_frame) = crate::framing::next_frame(self.tcp_reassembler.buffer())? {
                    events.push(PipelineEvent::Frame(app_frame));
                }
            }
            // No flow locked yet, or traffic on a different 5-tuple than
            // the one currently locked: keep inspecting every flow for the
            // signature (root spec §4.4 "whenever current_server changes").
            // A fresh match is authoritative and re-locks onto the new
            // flow, most-recent-signature-wins.
            _ => {
                let meta = TcpSegmentMeta { src, dst, seq: tcp.seq, ack: tcp.ack };
                if let Some(lock) = flow::inspect(meta, &tcp.payload) {
                    self.lock_flow(lock);
                    events.push(PipelineEvent::FlowLocked(lock));
                }
            }
        }

        Ok(events)
    }

    fn lock_flow(&mut self, lock: FlowLock) {
        self.tcp_reassembler.reset();
        self.tcp_reassembler.seed(lock.seed_seq);
        self.current_flow = Some(lock);
    }

    /// Stall detection (root spec §4.5/§5): if the locked flow has gone 30s
    /// without a contiguous byte, unlock it and reset reassembly state.
    /// Returns `true` if a reset happened.
    pub fn check_stall(&mut self, now: Instant) -> bool {
        if self.current_flow.is_some() && self.tcp_reassembler.is_stalled(now) {
            self.current_flow = None;
            self.tcp_reassembler.reset();
            true
        } else {
            false
        }
    }

    /// IP fragment cache eviction (root spec §4.3/§5): runs on the same 10s
    /// cadence as the auto-save ticker.
    pub fn evict_stale_fragments(&mut self, now: Instant) {
        self.ip_reassembler.evict_stale(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcap::Linktype;

    fn ipv4_tcp_frame(src_port: u16, dst_port: u16, seq: u32, ack: u32, payload: &[u8]) -> Vec<u8> {
        let tcp_len = 20 + payload.len();
        let mut tcp = vec![0u8; tcp_len];
        tcp[0..2].copy_from_slice(&src_port.to_be_bytes());
        tcp[2..4].copy_from_slice(&dst_port.to_be_bytes());
        tcp[4..8].copy_from_slice(&seq.to_be_bytes());
        tcp[8..12].copy_from_slice(&ack.to_be_bytes());
        tcp[12] = 5 << 4; // data offset 20 bytes
        tcp[20..].copy_from_slice(payload);

        let total_len = 20 + tcp_len;
        let mut ip = vec![0u8; total_len];
        ip[0] = 0x45;
        ip[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
        ip[6..8].copy_from_slice(&0u16.to_be_bytes()); // no fragmentation
        ip[9] = 6; // TCP
        ip[12..16].copy_from_slice(&[10, 0, 0, 1]);
        ip[16..20].copy_from_slice(&[10, 0, 0, 2]);
        ip[20..].copy_from_slice(&tcp);

        let mut ethernet = vec![0u8; 14];
        ethernet[12] = 0x08;
        ethernet[13] = 0x00;
        ethernet.extend_from_slice(&ip);
        ethernet
    }

    #[test]
    fn locks_flow_on_login_return_signature_and_then_reassembles() {
        let mut login = vec![0u8; 0x62];
        login[0..10].copy_from_slice(&[0x00, 0x00, 0x00, 0x62, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
        login[14..20].copy_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x0a, 0x4e]);

        let raw = RawFrame { linktype: Linktype::ETHERNET, data: ipv4_tcp_frame(8888, 9999, 1000, 1, &login) };

        let mut pipeline = Pipeline::new();
        let now = Instant::now();
        let events = pipeline.process_raw_frame(&raw, now).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], PipelineEvent::FlowLocked(_)));
        assert!(pipeline.current_flow().is_some());

        // next segment on the locked flow, seeded right after the login packet
        let mut frame_payload = vec![0, 0, 0, 5];
        frame_payload.push(b'x');
        let next_seq = 1000u32 + login.len() as u32;
        let raw2 = RawFrame {
            linktype: Linktype::ETHERNET,
            data: ipv4_tcp_frame(8888, 9999, next_seq, 1, &frame_payload),
        };
        let events2 = pipeline.process_raw_frame(&raw2, now).unwrap();
        assert_eq!(events2.len(), 1);
        match &events2[0] {
            PipelineEvent::Frame(bytes) => assert_eq!(&bytes[..], &frame_payload[..]),
            other => panic!("expected Frame, got {other:?}"),
        }
    }

    #[test]
    fn unrelated_traffic_before_lock_produces_no_events() {
        let raw = RawFrame {
            linktype: Linktype::ETHERNET,
            data: ipv4_tcp_frame(1234, 4321, 1, 1, b"not a signature"),
        };
        let mut pipeline = Pipeline::new();
        let events = pipeline.process_raw_frame(&raw, Instant::now()).unwrap();
        assert!(events.is_empty());
        assert!(pipeline.current_flow().is_none());
    }
}
