use beamcore::processing::align::AppliedShift;
use beamcore::processing::snr::SnrRecord;
use beamcore::processing::DelayTable;
use beamcore::telemetry::RunMetrics;
use beamcore::{EngineOutput, RunState};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct StackSummary {
    pub group: String,
    pub id: String,
    pub contributions: usize,
    pub start: f64,
    pub samples: usize,
    pub peak: f64,
}

/// Shift applied to a trace, also relative to the mean of its channel group.
#[derive(Debug, Clone, Serialize)]
pub struct ShiftLine {
    pub channel: String,
    pub shift: f64,
    pub relative_shift: f64,
}

/// JSON report written after a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub label: String,
    pub method: String,
    pub center: (f64, f64, f64),
    pub state: RunState,
    pub transitions: Vec<RunState>,
    pub delays: DelayTable,
    pub stacks: Vec<StackSummary>,
    pub shifts: Vec<ShiftLine>,
    pub snr: Vec<SnrRecord>,
    pub hidden: Option<Vec<String>>,
    pub metrics: RunMetrics,
}

/// Applied shifts with the per-channel-code mean removed.
pub fn relative_shifts(shifts: &[AppliedShift]) -> Vec<ShiftLine> {
    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for shift in shifts {
        let slot = sums.entry(shift.channel.channel.as_str()).or_insert((0.0, 0));
        slot.0 += -shift.delay;
        slot.1 += 1;
    }
    shifts
        .iter()
        .map(|shift| {
            let (sum, count) = sums
                .get(shift.channel.channel.as_str())
                .copied()
                .unwrap_or((0.0, 1));
            ShiftLine {
                channel: shift.channel.to_string(),
                shift: -shift.delay,
                relative_shift: -shift.delay - sum / count as f64,
            }
        })
        .collect()
}

impl RunReport {
    pub fn from_output(label: &str, method: &str, output: &EngineOutput) -> Self {
        let stacks = output
            .stacks
            .iter()
            .map(|(key, trace)| StackSummary {
                group: key.to_string(),
                id: trace.id.to_string(),
                contributions: output.contributions.get(key).copied().unwrap_or(0),
                start: trace.start,
                samples: trace.len(),
                peak: trace.samples.iter().fold(0.0f64, |acc, v| acc.max(v.abs())),
            })
            .collect();
        let (snr, hidden) = match &output.snr {
            Some(report) => (
                report.records.clone(),
                report
                    .hidden
                    .as_ref()
                    .map(|patterns| patterns.iter().map(|p| p.to_string()).collect()),
            ),
            None => (Vec::new(), None),
        };
        Self {
            label: label.to_string(),
            method: method.to_string(),
            center: (output.center.lat, output.center.lon, output.center.elevation),
            state: output.state,
            transitions: output.transitions.clone(),
            delays: output.delays.clone(),
            stacks,
            shifts: relative_shifts(&output.shifts),
            snr,
            hidden,
            metrics: output.metrics.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beamcore::ChannelId;

    #[test]
    fn relative_shifts_remove_group_mean() {
        let shifts = vec![
            AppliedShift {
                channel: ChannelId::new("SY", "A", "", "Z"),
                delay: 1.0,
            },
            AppliedShift {
                channel: ChannelId::new("SY", "B", "", "Z"),
                delay: 3.0,
            },
            AppliedShift {
                channel: ChannelId::new("SY", "A", "", "N"),
                delay: 0.5,
            },
        ];
        let lines = relative_shifts(&shifts);
        assert_eq!(lines[0].shift, -1.0);
        assert_eq!(lines[0].relative_shift, 1.0);
        assert_eq!(lines[1].relative_shift, -1.0);
        assert_eq!(lines[2].relative_shift, 0.0);
    }
}
