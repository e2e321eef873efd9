//! `<program> [<device> [<log_level>]]` (root spec §6). Missing or invalid
//! values fall through to interactive prompts / sensible defaults rather
//! than hard failure.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(version, about = "Passive combat telemetry collector")]
pub struct Cli {
    /// Capture device: a numeric index into the device list, or `auto` to
    /// sample traffic and pick the busiest adapter.
    pub device: Option<String>,

    /// `info` or `debug`; anything else falls back to `info`.
    pub log_level: Option<String>,
}

impl Cli {
    #[must_use]
    pub fn env_filter_directive(&self) -> &'static str {
        match self.log_level.as_deref() {
            Some("debug") => "debug",
            _ => "info",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_level_maps_to_debug_directive() {
        let cli = Cli { device: None, log_level: Some("debug".to_string()) };
        assert_eq!(cli.env_filter_directive(), "debug");
    }

    #[test]
    fn anything_else_falls_back_to_info() {
        for level in [None, Some("trace".to_string()), Some("".to_string())] {
            let cli = Cli { device: None, log_level: level };
            assert_eq!(cli.env_filter_directive(), "info");
        }
    }
}
