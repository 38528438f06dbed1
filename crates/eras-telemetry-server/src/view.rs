// Operator view
//
// Pure projection of the stored records into what the dashboard shows. The
// alert levels here are presentation policy and are never consulted during
// ingestion.

use eras_telemetry_common::{format_timestamp, TelemetryRecord};
use eras_telemetry_config::ViewConfig;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MachineState {
    Fault,
    Running,
    Stopped,
}

impl MachineState {
    pub fn of(record: &TelemetryRecord) -> Self {
        if record.sample.is_faulted() {
            MachineState::Fault
        } else if record.sample.is_running() {
            MachineState::Running
        } else {
            MachineState::Stopped
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestReading {
    pub device_id: String,
    pub timestamp: String,
    #[serde(with = "rust_decimal::serde::arbitrary_precision_option")]
    pub temp: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::arbitrary_precision_option")]
    pub current: Option<Decimal>,
    pub state: MachineState,
    pub temp_warning: bool,
    pub current_warning: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub timestamp: String,
    #[serde(with = "rust_decimal::serde::arbitrary_precision_option")]
    pub temp: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::arbitrary_precision_option")]
    pub current: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    /// No record carries a temperature yet.
    pub waiting: bool,
    pub total_records: usize,
    pub latest: Option<LatestReading>,
    pub history: Vec<HistoryPoint>,
    pub recent: Vec<TelemetryRecord>,
}

impl DashboardSnapshot {
    fn waiting(total_records: usize) -> Self {
        Self {
            waiting: true,
            total_records,
            latest: None,
            history: Vec::new(),
            recent: Vec::new(),
        }
    }
}

pub fn build_snapshot(mut records: Vec<TelemetryRecord>, config: &ViewConfig) -> DashboardSnapshot {
    let total_records = records.len();
    if !records.iter().any(|record| record.temp().is_some()) {
        return DashboardSnapshot::waiting(total_records);
    }

    records.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.device_id().cmp(b.device_id()))
    });

    let Some(last) = records.last() else {
        return DashboardSnapshot::waiting(total_records);
    };

    let latest = LatestReading {
        device_id: last.device_id().to_string(),
        timestamp: format_timestamp(&last.timestamp),
        temp: last.sample.temp,
        current: last.sample.current,
        state: MachineState::of(last),
        temp_warning: last.sample.temp.is_some_and(|t| t >= config.temp_warning),
        current_warning: last
            .sample
            .current
            .is_some_and(|c| c >= config.current_warning),
    };

    let history_start = config
        .history_window
        .map_or(0, |window| records.len().saturating_sub(window));
    let history = records[history_start..]
        .iter()
        .map(|record| HistoryPoint {
            timestamp: format_timestamp(&record.timestamp),
            temp: record.sample.temp,
            current: record.sample.current,
        })
        .collect();

    let recent_start = records.len().saturating_sub(config.recent_rows);
    let recent = records[recent_start..].to_vec();

    DashboardSnapshot {
        waiting: false,
        total_records,
        latest: Some(latest),
        history,
        recent,
    }
}
