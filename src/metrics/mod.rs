// Metrics module - flattens service metric documents into graphite lines
//
// Metric plugins print one `<path> <value> <timestamp>` line per numeric
// metric instead of a check verdict. The path starts with a scheme that
// defaults to the local host name.

use std::fmt::Display;
use sysinfo::System;

pub mod marathon;
pub mod mesos;

/// Formats one graphite plaintext line.
pub fn graphite_line(path: &str, value: impl Display, timestamp: i64) -> String {
    format!("{} {} {}", path, value, timestamp)
}

/// Seconds since the epoch, stamped on every line of one run
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Short name of this host, used to build default schemes.
pub fn hostname() -> String {
    System::host_name().unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphite_line() {
        assert_eq!(
            graphite_line("host.marathon.gauges.jvm.value", 42, 1700000000),
            "host.marathon.gauges.jvm.value 42 1700000000"
        );
    }

    #[test]
    fn test_hostname_is_not_empty() {
        assert!(!hostname().is_empty());
    }
}
