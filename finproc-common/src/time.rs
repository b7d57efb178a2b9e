//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Milliseconds since the Unix epoch, used in workspace and download names
pub fn unix_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Whole seconds elapsed since `since` (zero if `since` is in the future)
pub fn elapsed_seconds(since: DateTime<Utc>) -> u64 {
    (Utc::now() - since).num_seconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[tokio::test]
    async fn test_unix_millis_advances() {
        let first = unix_millis();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = unix_millis();
        assert!(second > first);
    }

    #[test]
    fn test_elapsed_seconds_clamps_future() {
        let future = now() + chrono::Duration::seconds(30);
        assert_eq!(elapsed_seconds(future), 0);
    }

    #[test]
    fn test_elapsed_seconds_counts_past() {
        let past = now() - chrono::Duration::seconds(90);
        let elapsed = elapsed_seconds(past);
        assert!((90..=91).contains(&elapsed));
    }
}
