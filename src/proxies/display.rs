//! Menu labels for proxy nodes and controller readings.

const KIB: u64 = 1024;

/// Label for a node with its latency, e.g. `"HK 01 [120ms]"`.
///
/// Zero means unknown or failed and renders as `timeout`.
pub fn latency_text(name: &str, delay: u16) -> String {
    if delay == 0 {
        format!("{} [timeout]", name)
    } else {
        format!("{} [{}ms]", name, delay)
    }
}

/// Memory in use, from bytes. Whole KB below 1 MB, two decimals above.
pub fn memory_text(bytes: u64) -> String {
    let kb = bytes / KIB;
    if kb < KIB {
        format!("{} KB", kb)
    } else if kb < KIB.pow(2) {
        format!("{:.2} MB", kb as f64 / KIB as f64)
    } else if kb < KIB.pow(3) {
        format!("{:.2} GB", kb as f64 / KIB.pow(2) as f64)
    } else {
        format!("{:.2} TB", kb as f64 / KIB.pow(3) as f64)
    }
}

/// Throughput, from bytes per second, in decimal bit units.
pub fn traffic_text(bytes_per_sec: u64) -> String {
    let kbps = bytes_per_sec / 125;
    if kbps < 1000 {
        format!("{} Kbps", kbps)
    } else if kbps < 1_000_000 {
        format!("{:.2} Mbps", kbps as f64 / 1e3)
    } else {
        format!("{:.2} Gbps", kbps as f64 / 1e6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_text() {
        assert_eq!(latency_text("HK 01", 120), "HK 01 [120ms]");
        assert_eq!(latency_text("JP", 0), "JP [timeout]");
    }

    #[test]
    fn test_memory_text() {
        assert_eq!(memory_text(0), "0 KB");
        assert_eq!(memory_text(1023), "0 KB");
        assert_eq!(memory_text(512 * 1024), "512 KB");
        assert_eq!(memory_text(1024 * 1024), "1.00 MB");
        assert_eq!(memory_text(35 * 1024 * 1024 + 512 * 1024), "35.50 MB");
        assert_eq!(memory_text(3 * 1024 * 1024 * 1024), "3.00 GB");
        assert_eq!(memory_text(2 * 1024_u64.pow(4)), "2.00 TB");
    }

    #[test]
    fn test_traffic_text() {
        assert_eq!(traffic_text(0), "0 Kbps");
        assert_eq!(traffic_text(124_875), "999 Kbps");
        assert_eq!(traffic_text(125_000), "1.00 Mbps");
        assert_eq!(traffic_text(1_562_500), "12.50 Mbps");
        assert_eq!(traffic_text(250_000_000), "2.00 Gbps");
    }
}
