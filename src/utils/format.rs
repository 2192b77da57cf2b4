// CN Stratum Pool - Free and Open Source Software Statement
//
// This project, cn-pool, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/utils/format.rs
// Version: 1.0.1
// Developer: OIEIEIO <oieieio@protonmail.com>
//
// This file provides formatting helpers for the CN stratum pool, located in
// the utils subdirectory. The stats logger uses them to keep the periodic
// summary line readable: pool hashrate scales through a unit table and
// share counters get digit grouping, since a pool's lifetime totals grow
// far past the point where raw digits are scannable.
//
// Tree Location:
// - src/utils/format.rs (formatting utilities)
// - Depends on: std

use std::time::Duration;

const HASHRATE_UNITS: [&str; 5] = ["H/s", "KH/s", "MH/s", "GH/s", "TH/s"];

/// Scale a hashrate into the largest unit that keeps the value above 1
pub fn format_hashrate(rate: f64) -> String {
    let mut value = rate.max(0.0);
    let mut unit = 0;
    while value >= 1_000.0 && unit < HASHRATE_UNITS.len() - 1 {
        value /= 1_000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{:.0} {}", value, HASHRATE_UNITS[unit])
    } else {
        format!("{:.2} {}", value, HASHRATE_UNITS[unit])
    }
}

/// Group a counter's digits in threes: 1234567 -> "1,234,567"
pub fn format_number(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Format an uptime as h/m/s
pub fn format_uptime(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hashrate_scales_through_units() {
        assert_eq!(format_hashrate(10.0), "10 H/s");
        assert_eq!(format_hashrate(999.4), "999 H/s");
        assert_eq!(format_hashrate(2_500.0), "2.50 KH/s");
        assert_eq!(format_hashrate(3_000_000.0), "3.00 MH/s");
        assert_eq!(format_hashrate(1_200_000_000.0), "1.20 GH/s");
        // past the table's end the last unit just grows
        assert_eq!(format_hashrate(2_500_000_000_000_000.0), "2500.00 TH/s");
    }

    #[test]
    fn test_format_hashrate_negative_clamps_to_zero() {
        assert_eq!(format_hashrate(-5.0), "0 H/s");
    }

    #[test]
    fn test_format_number_groups_digits() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_500), "1,500");
        assert_eq!(format_number(1_234_567), "1,234,567");
        assert_eq!(format_number(1_000_000_000), "1,000,000,000");
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(59)), "59s");
        assert_eq!(format_uptime(Duration::from_secs(61)), "1m1s");
        assert_eq!(format_uptime(Duration::from_secs(3_700)), "1h1m");
    }
}

// Changelog:
// - v1.0.1 (2025-08-01): Reworked the summary-line formatting.
//   - Hashrate now scales through a unit table up to TH/s instead of a
//     fixed threshold ladder; counters use digit grouping instead of
//     decimal suffixes, so exact totals stay readable in the log.
// - v1.0.0 (2025-07-12): Initial formatting helpers, shared by the stats
//   summary logger.
