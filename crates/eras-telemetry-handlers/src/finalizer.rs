use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use eras_telemetry_common::{TelemetryRecord, TelemetrySample};

/// Stamps accepted samples with their sort key and expiry.
#[derive(Debug, Clone, Copy)]
pub struct RecordFinalizer {
    ttl_horizon_secs: i64,
}

impl RecordFinalizer {
    pub fn new(ttl_horizon_secs: i64) -> Self {
        Self { ttl_horizon_secs }
    }

    pub fn ttl_horizon_secs(&self) -> i64 {
        self.ttl_horizon_secs
    }

    /// Build the record to persist.
    ///
    /// Timestamps are stored at microsecond precision. When the clock has not
    /// moved past the previous record (same microsecond or a step backwards)
    /// the timestamp is pushed to one microsecond after it, so the new record
    /// becomes the device's latest instead of overwriting or hiding behind it.
    pub fn finalize(
        &self,
        sample: TelemetrySample,
        previous: Option<&TelemetryRecord>,
        now: DateTime<Utc>,
    ) -> TelemetryRecord {
        let tick = TimeDelta::microseconds(1);
        let mut timestamp = now.duration_trunc(tick).unwrap_or(now);

        if let Some(previous) = previous {
            if timestamp <= previous.timestamp {
                timestamp = previous.timestamp + tick;
            }
        }

        TelemetryRecord {
            sample,
            timestamp,
            ttl: now.timestamp() + self.ttl_horizon_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const THREE_DAYS: i64 = 259_200;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap() + TimeDelta::nanoseconds(1_234_567)
    }

    #[test]
    fn test_timestamp_and_ttl() {
        let record = RecordFinalizer::new(THREE_DAYS).finalize(TelemetrySample::new("d1"), None, now());

        assert_eq!(record.device_id(), "d1");
        assert_eq!(record.timestamp_key(), "2026-10-17T12:00:00.001234+00:00");
        assert_eq!(record.ttl, now().timestamp() + THREE_DAYS);
    }

    #[test]
    fn test_clock_behind_previous_is_clamped() {
        let finalizer = RecordFinalizer::new(THREE_DAYS);
        let previous = finalizer.finalize(TelemetrySample::new("d1"), None, now());

        let same_instant = finalizer.finalize(TelemetrySample::new("d1"), Some(&previous), now());
        assert_eq!(same_instant.timestamp, previous.timestamp + TimeDelta::microseconds(1));

        let earlier = now() - TimeDelta::seconds(5);
        let skewed = finalizer.finalize(TelemetrySample::new("d1"), Some(&previous), earlier);
        assert!(skewed.timestamp > previous.timestamp);
        assert_eq!(skewed.ttl, earlier.timestamp() + THREE_DAYS);
    }

    #[test]
    fn test_later_clock_is_kept() {
        let finalizer = RecordFinalizer::new(THREE_DAYS);
        let previous = finalizer.finalize(TelemetrySample::new("d1"), None, now());
        let later = now() + TimeDelta::seconds(10);

        let record = finalizer.finalize(TelemetrySample::new("d1"), Some(&previous), later);
        assert_eq!(record.timestamp, later.duration_trunc(TimeDelta::microseconds(1)).unwrap());
    }
}
