use super::{DelayEntry, DelayTable};
use crate::interface::Marker;
use crate::telemetry::LogManager;
use std::collections::BTreeMap;

/// Delays from arrival picks relative to the mean pick time of their phase.
///
/// Event markers are ignored. With `phase` set only picks of that phase are
/// used. Each pick contributes one entry per channel pattern it carries, so
/// matching against traces stays pattern based.
pub(super) fn estimate(markers: &[Marker], phase: Option<&str>, logger: &LogManager) -> DelayTable {
    let mut groups: BTreeMap<Option<&str>, Vec<&Marker>> = BTreeMap::new();
    for marker in markers.iter().filter(|m| !m.is_event_marker()) {
        let marker_phase = marker.phase.as_deref();
        if phase.is_some() && marker_phase != phase {
            continue;
        }
        groups.entry(marker_phase).or_default().push(marker);
    }

    let mut entries = Vec::new();
    for (group_phase, picks) in groups {
        let mean_tmin = picks.iter().map(|m| m.tmin).sum::<f64>() / picks.len() as f64;
        logger.detail(&format!(
            "{} picks of phase {} with mean time {:.4}",
            picks.len(),
            group_phase.unwrap_or("-"),
            mean_tmin
        ));
        for pick in picks {
            for pattern in &pick.patterns {
                entries.push(DelayEntry {
                    pattern: pattern.clone(),
                    delay: pick.tmin - mean_tmin,
                });
            }
        }
    }
    DelayTable::new(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{ChannelId, ChannelPattern};

    #[test]
    fn delays_are_relative_to_mean_pick() {
        let markers = vec![
            Marker::pick(10.0, ChannelPattern::new("XX", "A", "", "*"), "P"),
            Marker::pick(12.0, ChannelPattern::new("XX", "B", "", "*"), "P"),
            Marker::pick(50.0, ChannelPattern::new("XX", "A", "", "*"), "S"),
            Marker::window(0.0, 100.0, ChannelPattern::any()).with_event("ev"),
            Marker {
                tmin: 5.0,
                tmax: 5.0,
                patterns: Vec::new(),
                phase: None,
                event: Some("ev".into()),
            },
        ];
        let table = estimate(&markers, Some("P"), &LogManager::default());
        assert_eq!(table.len(), 2);
        assert_eq!(table.delay_for(&ChannelId::new("XX", "A", "", "BHZ")), Some(-1.0));
        assert_eq!(table.delay_for(&ChannelId::new("XX", "B", "", "BHZ")), Some(1.0));
        assert_eq!(table.delay_for(&ChannelId::new("XX", "C", "", "BHZ")), None);
    }

    #[test]
    fn without_picks_table_is_empty() {
        let table = estimate(&[], None, &LogManager::default());
        assert!(table.is_empty());
    }
}
