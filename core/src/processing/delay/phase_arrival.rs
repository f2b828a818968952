use super::{DelayContext, DelayEntry, DelayTable};
use crate::interface::ChannelPattern;
use crate::prelude::{EngineError, EngineResult};
use crate::telemetry::Anomaly;

/// Delays from modelled travel times of `phase`, relative to the earliest
/// station. Needs exactly one event and an arrival cache.
pub(super) fn estimate(ctx: &mut DelayContext<'_>, phase: &str) -> EngineResult<DelayTable> {
    let event = match ctx.events {
        [event] => event,
        events => {
            return Err(EngineError::Configuration(format!(
                "phase alignment needs exactly one event, {} in scope",
                events.len()
            )))
        }
    };
    let cache = ctx.arrivals.as_deref_mut().ok_or_else(|| {
        EngineError::Configuration("phase alignment requires an arrival model".into())
    })?;

    let phases = vec![phase.to_string()];
    let mut times = Vec::with_capacity(ctx.geometry.stations.len());
    let mut skipped = Vec::new();
    for station in &ctx.geometry.stations {
        let line = ctx.geodesic.inverse(event.position(), station.position());
        match cache.first_arrival(line.distance_m, event.depth, &phases) {
            Some(time) => times.push((station, time)),
            None => {
                skipped.push(ChannelPattern::station(&station.id, "*"));
                ctx.metrics.record_anomaly(Anomaly::MissingArrival);
                ctx.logger.anomaly(&format!(
                    "no {phase} arrival for {} at {:.0} m",
                    station.id, line.distance_m
                ));
            }
        }
    }

    let earliest = times.iter().map(|(_, t)| *t).fold(f64::INFINITY, f64::min);
    let entries = times
        .into_iter()
        .map(|(station, time)| DelayEntry {
            pattern: ChannelPattern::station(&station.id, "*"),
            delay: time - earliest,
        })
        .collect();
    Ok(DelayTable::new(entries).with_skipped(skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{ChannelId, Event, Station, StationId};
    use crate::math::geodesic::Wgs84Geodesic;
    use crate::processing::arrivals::{ArrivalCache, HomogeneousHalfSpace};
    use crate::processing::geometry::GeometryModel;
    use crate::telemetry::{LogManager, MetricsRecorder};

    fn event(lat: f64) -> Event {
        Event {
            name: "ev".into(),
            lat,
            lon: 0.0,
            depth: 10_000.0,
            time: 0.0,
            magnitude: Some(5.0),
        }
    }

    #[test]
    fn nearest_station_gets_zero_delay() {
        let geometry = GeometryModel::new()
            .resolve(
                vec![
                    Station::new(StationId::new("XX", "A", ""), 0.0, 0.0),
                    Station::new(StationId::new("XX", "B", ""), 0.5, 0.0),
                ],
                None,
            )
            .unwrap();
        let events = vec![event(2.0)];
        let metrics = MetricsRecorder::new();
        let logger = LogManager::default();
        let mut cache = ArrivalCache::new(Box::new(HomogeneousHalfSpace::default()));
        let mut ctx = DelayContext {
            geometry: &geometry,
            geodesic: &Wgs84Geodesic,
            events: &events,
            markers: &[],
            traces: &[],
            normalize: false,
            prefilter: None,
            arrivals: Some(&mut cache),
            metrics: &metrics,
            logger: &logger,
        };
        let table = estimate(&mut ctx, "P").unwrap();
        let a = table.delay_for(&ChannelId::new("XX", "A", "", "Z")).unwrap();
        let b = table.delay_for(&ChannelId::new("XX", "B", "", "Z")).unwrap();
        assert_eq!(b, 0.0);
        assert!(a > 8.0 && a < 10.0, "{a}");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn two_events_are_a_configuration_error() {
        let geometry = GeometryModel::new()
            .resolve(vec![Station::new(StationId::new("XX", "A", ""), 0.0, 0.0)], None)
            .unwrap();
        let events = vec![event(1.0), event(2.0)];
        let metrics = MetricsRecorder::new();
        let logger = LogManager::default();
        let mut ctx = DelayContext {
            geometry: &geometry,
            geodesic: &Wgs84Geodesic,
            events: &events,
            markers: &[],
            traces: &[],
            normalize: false,
            prefilter: None,
            arrivals: None,
            metrics: &metrics,
            logger: &logger,
        };
        assert!(matches!(
            estimate(&mut ctx, "P"),
            Err(EngineError::Configuration(_))
        ));
    }
}
