use eras_telemetry_common::{TelemetryRecord, TelemetrySample};
use rust_decimal::Decimal;

/// Why a sample was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptReason {
    /// The device has no stored record yet.
    FirstSample,
    /// The new sample carries no `temp`.
    NoTemp,
    /// The previous record carries no `temp` to compare against.
    NoPreviousTemp,
    /// The change reached the threshold.
    Changed { delta: Decimal },
    /// The difference does not fit in a decimal; treated as unbounded.
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Accept(AcceptReason),
    Reject { delta: Decimal },
}

impl FilterDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, FilterDecision::Accept(_))
    }
}

/// Suppresses samples whose temperature moved less than `threshold` since the
/// device's last stored record.
#[derive(Debug, Clone, Copy)]
pub struct ChangeFilter {
    threshold: Decimal,
}

impl ChangeFilter {
    pub fn new(threshold: Decimal) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Decimal {
        self.threshold
    }

    pub fn evaluate(
        &self,
        sample: &TelemetrySample,
        previous: Option<&TelemetryRecord>,
    ) -> FilterDecision {
        let Some(previous) = previous else {
            return FilterDecision::Accept(AcceptReason::FirstSample);
        };
        let Some(new_temp) = sample.temp else {
            return FilterDecision::Accept(AcceptReason::NoTemp);
        };
        let Some(last_temp) = previous.temp() else {
            return FilterDecision::Accept(AcceptReason::NoPreviousTemp);
        };

        match new_temp.checked_sub(last_temp) {
            Some(diff) => {
                let delta = diff.abs();
                // strictly less: a change of exactly the threshold is kept
                if delta < self.threshold {
                    FilterDecision::Reject { delta }
                } else {
                    FilterDecision::Accept(AcceptReason::Changed { delta })
                }
            }
            None => FilterDecision::Accept(AcceptReason::Overflow),
        }
    }
}
