//! Packet ingestion and stream-reconstruction pipeline: C1 (capture) through
//! C6 (application framing) of the root spec.
//!
//! Data flow: [`capture`] -> [`link`] -> [`ip_reassembly`] -> [`flow`] /
//! [`tcp_reassembly`] -> [`framing`]. [`pipeline`] wires the stages together
//! the way the processing task is described in the root spec's concurrency
//! model: a single task draining a queue of raw frames, holding one mutex
//! (here, exclusive ownership by the task itself) for the duration of
//! processing each frame.

pub mod capture;
pub mod flow;
pub mod framing;
pub mod ip_reassembly;
pub mod link;
pub mod pipeline;
pub mod tcp_reassembly;

/// Frames whose declared length prefix exceeds this are treated as
/// catastrophic stream corruption (root spec §4.6/§9).
pub const MAX_FRAME_LEN: usize = 0x0F_FFFF;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("no supported link type on capture handle: {0:?}")]
    UnsupportedLinkType(pcap::Linktype),

    #[error("failed to open capture device: {0}")]
    CaptureOpen(#[source] pcap::Error),

    #[error("frame length {0:#x} exceeds the maximum of {max:#x}", max = MAX_FRAME_LEN)]
    FrameTooLarge(usize),
}
