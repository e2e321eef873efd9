//! C1: opens a link-layer capture handle on a chosen interface with a BPF
//! filter and yields raw frames onto a bounded channel. `pcap`'s capture
//! loop is blocking, so it runs on its own OS thread (`spawn_blocking`) and
//! forwards frames into an async `mpsc` channel the processing task reads
//! with a true `recv().await` — no sleep-polled loop (root spec §9, Design
//! Note "coroutine polling loop").

use pcap::{Capture, Linktype};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::{link, NetError};

pub const DEFAULT_BPF_FILTER: &str = "ip and tcp";
pub const DEFAULT_BUFFER_SIZE: i32 = 10 * 1024 * 1024;
const CHANNEL_CAPACITY: usize = 4096;

/// One captured link-layer frame, with the link type it was captured under
/// so the consumer can strip the right header (C2).
#[derive(Debug)]
pub struct RawFrame {
    pub linktype: Linktype,
    pub data: Vec<u8>,
}

/// Opens `device` with the given BPF filter and spawns the blocking capture
/// loop. Returns the receiving half of the channel raw frames are pushed
/// onto.
///
/// An unsupported link type is logged as an error and the capture handle is
/// still returned: per root spec §4.1, this is non-fatal because no frames
/// will match downstream (C2 will discard every frame it sees).
pub fn open(device: &str, bpf: &str) -> Result<mpsc::Receiver<RawFrame>, NetError> {
    let mut cap = Capture::from_device(device)
        .map_err(NetError::CaptureOpen)?
        .promisc(true)
        .snaplen(65535)
        .buffer_size(DEFAULT_BUFFER_SIZE)
        .open()
        .map_err(NetError::CaptureOpen)?;

    let linktype = cap.get_datalink();
    if !matches!(linktype, Linktype::ETHERNET | Linktype::NULL | Linktype::LOOP | Linktype::LINUX_SLL) {
        error!(?linktype, "capture handle has an unsupported link type; no frames will match");
    }

    cap.filter(bpf, true).map_err(NetError::CaptureOpen)?;

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    std::thread::spawn(move || {
        info!(?linktype, "capture loop started");
        loop {
            match cap.next_packet() {
                Ok(packet) => {
                    let frame = RawFrame { linktype, data: packet.data.to_vec() };
                    if tx.blocking_send(frame).is_err() {
                        info!("capture receiver dropped; stopping capture loop");
                        break;
                    }
                }
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(e) => {
                    warn!(error = %e, "capture loop error, stopping");
                    break;
                }
            }
        }
    });

    Ok(rx)
}

/// True if this frame's link type is one C2 knows how to strip. Exposed so
/// callers can short-circuit without invoking [`link::ipv4_offset`]
/// per-frame when auto-detecting a device (root spec §4.10).
#[must_use]
pub fn is_supported_linktype(linktype: Linktype) -> bool {
    matches!(linktype, Linktype::ETHERNET | Linktype::NULL | Linktype::LOOP | Linktype::LINUX_SLL)
}

#[must_use]
pub fn strip_link_header(frame: &RawFrame) -> Option<&[u8]> {
    let offset = link::ipv4_offset(frame.linktype, &frame.data)?;
    frame.data.get(offset..)
}
