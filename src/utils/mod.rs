//! Utilities module for logging, metrics, and helper functions
//!
//! - Structured logging with tracing
//! - Top-k accuracy and running averages
//! - Error handling types

pub mod error;
pub mod logging;
pub mod metrics;

use std::time::Duration;

pub use error::{AlexNetError, Result};
pub use logging::init_logging;
pub use metrics::{EpochMetrics, RunningAverage, TopKAccuracy};

/// Wall-clock time as `12.3s`, `4m 05s` or `2h 07m 30s`
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, minutes, seconds) = (total / 3600, total % 3600 / 60, total % 60);

    match (hours, minutes) {
        (0, 0) => format!("{:.1}s", elapsed.as_secs_f64()),
        (0, _) => format!("{}m {:02}s", minutes, seconds),
        _ => format!("{}h {:02}m {:02}s", hours, minutes, seconds),
    }
}

/// Format a number with thousands separator
pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(30_500)), "30.5s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_duration(Duration::from_secs(7650)), "2h 07m 30s");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1_200_000), "1,200,000");
        assert_eq!(format_number(150_000), "150,000");
        assert_eq!(format_number(42), "42");
    }
}
