use crate::interface::{ChannelId, ChannelPattern, Trace};
use crate::math::stats::StatsHelper;
use crate::prelude::{EngineError, EngineResult};
use crate::processing::align::same_interval;
use crate::processing::characteristic::Characteristic;
use crate::processing::geometry::{ARRAY_NETWORK, ARRAY_STATION};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Relative standard deviation below which a trace counts as constant.
const ZERO_VARIANCE_RATIO: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStrictness {
    /// One group per full channel identity.
    Strict,
    /// One group per channel code, ignoring network, station and location.
    #[default]
    Loose,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GroupKey {
    Channel(ChannelId),
    Code(String),
}

impl GroupKey {
    pub fn for_channel(id: &ChannelId, strictness: GroupStrictness) -> Self {
        match strictness {
            GroupStrictness::Strict => GroupKey::Channel(id.clone()),
            GroupStrictness::Loose => GroupKey::Code(id.channel.clone()),
        }
    }

    /// Pattern a trace must match to join this group.
    pub fn pattern(&self) -> ChannelPattern {
        match self {
            GroupKey::Channel(id) => ChannelPattern::exact(id),
            GroupKey::Code(code) => ChannelPattern::channel_code(code),
        }
    }

    /// Synthetic identity of the group's stacked trace.
    pub fn stack_id(&self) -> ChannelId {
        match self {
            GroupKey::Channel(id) => {
                ChannelId::new(ARRAY_NETWORK, ARRAY_STATION, &id.location, &id.channel)
            }
            GroupKey::Code(code) => ChannelId::new(ARRAY_NETWORK, ARRAY_STATION, "", code),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Channel(id) => write!(f, "{id}"),
            GroupKey::Code(code) => write!(f, "*.*.*.{code}"),
        }
    }
}

/// Result of offering one trace to a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added { count: usize },
    /// Constant trace with normalization requested; not added.
    ZeroVariance,
    /// Length differs from the group's first trace; not added.
    LengthMismatch { expected: usize, found: usize },
}

/// Running sum of one channel group.
///
/// Length and timing are fixed by the first contribution. Samples of later
/// contributions are placed by time and those falling outside the
/// accumulator are dropped.
#[derive(Debug, Clone)]
pub struct StackAccumulator {
    sum: Trace,
    count: usize,
    normalized: bool,
    finalized: Option<Trace>,
}

impl StackAccumulator {
    fn new(key: &GroupKey, first: &Trace, normalized: bool) -> Self {
        Self {
            sum: Trace::new(key.stack_id(), first.start, first.delta, vec![0.0; first.len()]),
            count: 0,
            normalized,
            finalized: None,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn len(&self) -> usize {
        self.sum.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sum.is_empty()
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    pub fn sum(&self) -> &Trace {
        &self.sum
    }

    fn accumulate(&mut self, start: f64, samples: &[f64]) -> AddOutcome {
        if samples.len() != self.sum.len() {
            return AddOutcome::LengthMismatch {
                expected: self.sum.len(),
                found: samples.len(),
            };
        }
        let offset = ((start - self.sum.start) / self.sum.delta).round() as i64;
        let len = self.sum.len() as i64;
        for (index, value) in samples.iter().enumerate() {
            let target = index as i64 + offset;
            if (0..len).contains(&target) {
                self.sum.samples[target as usize] += value;
            }
        }
        self.count += 1;
        AddOutcome::Added { count: self.count }
    }

    fn finalize(&mut self) -> Trace {
        if let Some(done) = &self.finalized {
            return done.clone();
        }
        let mut result = self.sum.clone();
        if !self.normalized && self.count > 0 {
            let count = self.count as f64;
            result.samples.iter_mut().for_each(|v| *v /= count);
        }
        self.finalized = Some(result.clone());
        result
    }
}

/// Demeaned copy of the samples, divided by their standard deviation when
/// `normalize` is set. `None` for a constant trace under normalization.
pub fn prepare_samples(trace: &Trace, normalize: bool) -> Option<Vec<f64>> {
    let mean = StatsHelper::mean(&trace.samples);
    let mut samples: Vec<f64> = trace.samples.iter().map(|v| v - mean).collect();
    if normalize {
        let std = StatsHelper::std(&samples);
        let scale = StatsHelper::peak_abs(&trace.samples);
        if !std.is_finite() || std == 0.0 || std <= ZERO_VARIANCE_RATIO * scale {
            return None;
        }
        samples.iter_mut().for_each(|v| *v /= std);
    }
    Some(samples)
}

/// Accumulates aligned traces into per-group stacks.
pub struct Stacker {
    strictness: GroupStrictness,
    characteristic: Option<Characteristic>,
    groups: BTreeMap<GroupKey, StackAccumulator>,
}

impl Stacker {
    pub fn new(strictness: GroupStrictness) -> Self {
        Self {
            strictness,
            characteristic: None,
            groups: BTreeMap::new(),
        }
    }

    /// Applies `characteristic` to every contribution after demeaning.
    pub fn with_characteristic(mut self, characteristic: Option<Characteristic>) -> Self {
        self.characteristic = characteristic;
        self
    }

    pub fn strictness(&self) -> GroupStrictness {
        self.strictness
    }

    pub fn key_for(&self, id: &ChannelId) -> GroupKey {
        GroupKey::for_channel(id, self.strictness)
    }

    /// Adds `trace` to the group derived from its own identity.
    pub fn add(&mut self, trace: &Trace, normalize: bool) -> EngineResult<AddOutcome> {
        let key = self.key_for(&trace.id);
        self.add_to_group(key, trace, normalize)
    }

    pub fn add_to_group(
        &mut self,
        key: GroupKey,
        trace: &Trace,
        normalize: bool,
    ) -> EngineResult<AddOutcome> {
        if trace.is_empty() {
            return Err(EngineError::InvalidInput(format!("{} has no samples", trace.id)));
        }
        if !key.pattern().matches(&trace.id) {
            return Err(EngineError::InvalidInput(format!(
                "{} does not belong to group {key}",
                trace.id
            )));
        }
        if let Some(existing) = self.groups.get(&key) {
            if existing.is_finalized() {
                return Err(EngineError::GroupFinalized(key.to_string()));
            }
            if existing.normalized != normalize {
                return Err(EngineError::InvalidInput(format!(
                    "group {key} mixes normalized and raw contributions"
                )));
            }
            if !same_interval(existing.sum.delta, trace.delta) {
                return Err(EngineError::SampleRateMismatch {
                    expected: existing.sum.delta,
                    found: trace.delta,
                    channel: trace.id.to_string(),
                });
            }
        }

        let Some(mut samples) = prepare_samples(trace, normalize) else {
            return Ok(AddOutcome::ZeroVariance);
        };
        if let Some(characteristic) = &self.characteristic {
            samples = characteristic.apply(&samples, trace.delta);
        }
        let accumulator = self
            .groups
            .entry(key)
            .or_insert_with_key(|key| StackAccumulator::new(key, trace, normalize));
        Ok(accumulator.accumulate(trace.start, &samples))
    }

    /// Stacked trace of one group. Repeated calls return the same trace.
    pub fn finalize(&mut self, key: &GroupKey) -> EngineResult<Trace> {
        self.groups
            .get_mut(key)
            .map(StackAccumulator::finalize)
            .ok_or_else(|| EngineError::InvalidInput(format!("unknown stack group {key}")))
    }

    pub fn finalize_all(&mut self) -> BTreeMap<GroupKey, Trace> {
        self.groups
            .iter_mut()
            .map(|(key, acc)| (key.clone(), acc.finalize()))
            .collect()
    }

    pub fn accumulator(&self, key: &GroupKey) -> Option<&StackAccumulator> {
        self.groups.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &GroupKey> {
        self.groups.keys()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wave(station: &str, location: &str, channel: &str) -> Trace {
        Trace::new(
            ChannelId::new("XX", station, location, channel),
            0.0,
            0.5,
            vec![1.0, 3.0, -2.0, 0.5, -2.5],
        )
    }

    #[test]
    fn identical_copies_average_to_original() {
        let original = wave("A", "", "Z");
        let mut stacker = Stacker::new(GroupStrictness::Loose);
        for _ in 0..4 {
            stacker.add(&original, false).unwrap();
        }
        let key = stacker.key_for(&original.id);
        let stacked = stacker.finalize(&key).unwrap();
        let mean = StatsHelper::mean(&original.samples);
        for (got, want) in stacked.samples.iter().zip(&original.samples) {
            assert!((got - (want - mean)).abs() < 1e-12);
        }
        assert_eq!(stacked.id, ChannelId::new("", "STK", "", "Z"));
        assert_eq!(stacker.accumulator(&key).unwrap().count(), 4);
    }

    #[test]
    fn normalized_stack_is_not_divided_by_count() {
        let original = wave("A", "", "Z");
        let mut stacker = Stacker::new(GroupStrictness::Strict);
        stacker.add(&original, true).unwrap();
        stacker.add(&original, true).unwrap();
        let stacked = stacker.finalize(&stacker.key_for(&original.id)).unwrap();
        let single = prepare_samples(&original, true).unwrap();
        for (got, unit) in stacked.samples.iter().zip(&single) {
            assert!((got - 2.0 * unit).abs() < 1e-12);
        }
        assert!((StatsHelper::std(&stacked.samples) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn loose_grouping_ignores_location_codes() {
        let mut stacker = Stacker::new(GroupStrictness::Loose);
        for (station, location) in [("A", ""), ("B", "00"), ("C", "10")] {
            for channel in ["Z", "N"] {
                stacker.add(&wave(station, location, channel), false).unwrap();
            }
        }
        assert_eq!(stacker.group_count(), 2);
        for code in ["Z", "N"] {
            let key = GroupKey::Code(code.into());
            assert_eq!(stacker.accumulator(&key).unwrap().count(), 3);
        }
    }

    #[test]
    fn add_after_finalize_is_rejected() {
        let trace = wave("A", "", "Z");
        let mut stacker = Stacker::new(GroupStrictness::Loose);
        stacker.add(&trace, false).unwrap();
        let key = stacker.key_for(&trace.id);
        let first = stacker.finalize(&key).unwrap();
        assert_eq!(stacker.finalize(&key).unwrap(), first);
        assert!(matches!(
            stacker.add(&trace, false),
            Err(EngineError::GroupFinalized(_))
        ));
    }

    #[test]
    fn constant_trace_is_skipped_when_normalizing() {
        let flat = wave("A", "", "Z").with_samples(vec![4.0; 5]);
        let mut stacker = Stacker::new(GroupStrictness::Loose);
        assert_eq!(stacker.add(&flat, true).unwrap(), AddOutcome::ZeroVariance);
        assert_eq!(stacker.group_count(), 0);
    }

    #[test]
    fn length_mismatch_and_foreign_trace_are_rejected() {
        let mut stacker = Stacker::new(GroupStrictness::Loose);
        stacker.add(&wave("A", "", "Z"), false).unwrap();
        let short = wave("B", "", "Z").with_samples(vec![1.0, 2.0]);
        assert_eq!(
            stacker.add(&short, false).unwrap(),
            AddOutcome::LengthMismatch {
                expected: 5,
                found: 2
            }
        );
        let foreign = wave("B", "", "N");
        assert!(stacker
            .add_to_group(GroupKey::Code("Z".into()), &foreign, false)
            .is_err());
    }

    #[test]
    fn characteristic_is_applied_before_summing() {
        let characteristic = Characteristic {
            taper_fraction: 0.0,
            ..Characteristic::default()
        };
        let mut stacker =
            Stacker::new(GroupStrictness::Loose).with_characteristic(Some(characteristic));
        let first = wave("A", "", "Z");
        let flipped = first.with_samples(first.samples.iter().map(|v| -v).collect());
        stacker.add(&first, false).unwrap();
        stacker.add(&flipped, false).unwrap();
        let stacked = stacker.finalize(&GroupKey::Code("Z".into())).unwrap();
        // Opposite polarities no longer cancel once rectified.
        let expected = characteristic.apply(&prepare_samples(&first, false).unwrap(), 0.5);
        for (got, want) in stacked.samples.iter().zip(&expected) {
            assert!((got - want).abs() < 1e-12);
        }
        assert!(stacked.samples.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn shifted_contribution_is_placed_by_time() {
        let mut stacker = Stacker::new(GroupStrictness::Loose);
        let base = wave("A", "", "Z").with_samples(vec![0.0, 0.0, 1.0, 0.0, -1.0]);
        stacker.add(&base, false).unwrap();
        stacker.add(&base.shifted(0.5), false).unwrap();
        let sum = stacker.accumulator(&GroupKey::Code("Z".into())).unwrap().sum();
        assert!((sum.samples[2] - 1.0).abs() < 1e-12);
        assert!((sum.samples[3] - 1.0).abs() < 1e-12);
    }
}
