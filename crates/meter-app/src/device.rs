//! Device listing and selection (root spec §4.10/§6): a numeric index, the
//! literal `auto`, or an interactive prompt when neither is given.

use std::io::Write as _;
use std::time::{Duration, Instant};

use tracing::info;

const AUTO_DETECT_WINDOW: Duration = Duration::from_secs(3);

pub fn list_devices() -> anyhow::Result<Vec<pcap::Device>> {
    Ok(pcap::Device::list()?)
}

/// Resolves the CLI's `device` argument: a numeric index, the literal
/// `auto`, or (if absent/invalid) an interactive prompt.
pub fn resolve(devices: &[pcap::Device], arg: Option<&str>) -> anyhow::Result<pcap::Device> {
    match arg {
        Some("auto") => auto_detect(devices),
        Some(raw) => match raw.parse::<usize>() {
            Ok(idx) => devices
                .get(idx)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("device index {idx} out of range (0..{})", devices.len())),
            Err(_) => prompt(devices),
        },
        None => prompt(devices),
    }
}

#[allow(clippy::print_stdout, reason = "interactive device prompt, not a log line")]
fn prompt(devices: &[pcap::Device]) -> anyhow::Result<pcap::Device> {
    use colored::Colorize;
    for (idx, device) in devices.iter().enumerate() {
        let label = format!("[{idx}] {}", device.name).cyan();
        println!("{label} ({})", device.desc.as_deref().unwrap_or("no description"));
    }
    print!("select a device (or \"auto\"): ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    resolve(devices, Some(line.trim()))
}

/// Root spec §4.10: "The auto-detect mode analyses traffic for 3 seconds
/// and picks the most active physical adapter; falls back to the OS
/// routing table." Lacking a routing-table lookup in this stack, the
/// fallback is approximated as the first non-loopback device.
pub fn auto_detect(devices: &[pcap::Device]) -> anyhow::Result<pcap::Device> {
    let mut busiest: Option<(usize, u64)> = None;
    for (idx, device) in devices.iter().enumerate() {
        let bytes = sample_traffic(&device.name, AUTO_DETECT_WINDOW).unwrap_or(0);
        if bytes > 0 && busiest.map_or(true, |(_, best)| bytes > best) {
            busiest = Some((idx, bytes));
        }
    }

    if let Some((idx, bytes)) = busiest {
        info!(device = %devices[idx].name, bytes, "auto-detected busiest adapter");
        return Ok(devices[idx].clone());
    }

    info!("no traffic observed on any adapter during sampling window, falling back to first non-loopback device");
    devices
        .iter()
        .find(|d| !d.flags.is_loopback())
        .or_else(|| devices.first())
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("no capture devices available"))
}

fn sample_traffic(device_name: &str, duration: Duration) -> anyhow::Result<u64> {
    let mut cap = pcap::Capture::from_device(device_name)?.promisc(true).timeout(200).open()?;
    let deadline = Instant::now() + duration;
    let mut bytes = 0u64;
    while Instant::now() < deadline {
        match cap.next_packet() {
            Ok(packet) => bytes += packet.data.len() as u64,
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(_) => break,
        }
    }
    Ok(bytes)
}
