//! C2: strips the link-layer header to reveal the offset at which an IPv4
//! datagram begins. Pure and synchronous; no state carried between calls.

use pcap::Linktype;

/// Returns the byte offset of the start of the IPv4 header within `frame`,
/// or `None` if the link type is unsupported or the frame does not carry
/// IPv4.
#[must_use]
pub fn ipv4_offset(linktype: Linktype, frame: &[u8]) -> Option<usize> {
    match linktype {
        Linktype::ETHERNET => ethernet_offset(frame),
        Linktype::NULL | Linktype::LOOP => null_offset(frame),
        Linktype::LINUX_SLL => linux_sll_offset(frame),
        _ => None,
    }
}

const ETHER_TYPE_IPV4: u16 = 0x0800;

fn ethernet_offset(frame: &[u8]) -> Option<usize> {
    let ethertype = frame.get(12..14)?;
    let ethertype = u16::from_be_bytes([ethertype[0], ethertype[1]]);
    (ethertype == ETHER_TYPE_IPV4).then_some(14)
}

fn null_offset(frame: &[u8]) -> Option<usize> {
    let family = frame.get(0..4)?;
    let family = u32::from_le_bytes([family[0], family[1], family[2], family[3]]);
    (family == 2).then_some(4)
}

fn linux_sll_offset(frame: &[u8]) -> Option<usize> {
    let ethertype = frame.get(14..16)?;
    let ethertype = u16::from_be_bytes([ethertype[0], ethertype[1]]);
    (ethertype == ETHER_TYPE_IPV4).then_some(16)
}
