use crate::interface::codes::ChannelId;
use crate::interface::ports::{EventSource, StationSource, TimeWindow, TraceSource};
use crate::interface::records::{Event, Station};
use crate::interface::trace::Trace;

/// Trace source over traces already held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryTraceSource {
    traces: Vec<Trace>,
    batch_size: usize,
}

impl MemoryTraceSource {
    pub fn new(traces: Vec<Trace>) -> Self {
        Self {
            traces,
            batch_size: 16,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }
}

impl TraceSource for MemoryTraceSource {
    fn chopper<'a>(
        &'a self,
        window: TimeWindow,
        selector: &'a dyn Fn(&ChannelId) -> bool,
    ) -> Box<dyn Iterator<Item = Vec<Trace>> + 'a> {
        let batch_size = self.batch_size.max(1);
        let chopped = self
            .traces
            .iter()
            .filter(move |trace| selector(&trace.id))
            .filter_map(move |trace| {
                let tmin = window.tmin.unwrap_or(f64::NEG_INFINITY);
                let tmax = window.tmax.unwrap_or(f64::INFINITY);
                if window.tmin.is_none() && window.tmax.is_none() {
                    Some(trace.clone())
                } else {
                    trace.chop(tmin.max(trace.start), tmax)
                }
            });

        let mut chopped = chopped.peekable();
        Box::new(std::iter::from_fn(move || {
            chopped.peek()?;
            Some(chopped.by_ref().take(batch_size).collect())
        }))
    }

    fn channel_ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self.traces.iter().map(|t| t.id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Station and event catalog held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    stations: Vec<Station>,
    events: Vec<Event>,
}

impl MemoryCatalog {
    pub fn new(stations: Vec<Station>, events: Vec<Event>) -> Self {
        Self { stations, events }
    }
}

impl StationSource for MemoryCatalog {
    fn stations(&self) -> Vec<Station> {
        self.stations.clone()
    }
}

impl EventSource for MemoryCatalog {
    fn events(&self) -> Vec<Event> {
        self.events.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(station: &str, channel: &str) -> Trace {
        Trace::new(
            ChannelId::new("XX", station, "", channel),
            0.0,
            1.0,
            vec![1.0; 10],
        )
    }

    #[test]
    fn chopper_batches_and_restarts() {
        let source = MemoryTraceSource::new(vec![
            trace("A", "Z"),
            trace("B", "Z"),
            trace("C", "Z"),
        ])
        .with_batch_size(2);
        let all = |_: &ChannelId| true;

        let batches: Vec<Vec<Trace>> = source.chopper(TimeWindow::unbounded(), &all).collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 1);

        let again: usize = source
            .chopper(TimeWindow::unbounded(), &all)
            .map(|b| b.len())
            .sum();
        assert_eq!(again, 3);
    }

    #[test]
    fn chopper_applies_selector_and_window() {
        let source = MemoryTraceSource::new(vec![trace("A", "Z"), trace("A", "N")]);
        let only_z = |id: &ChannelId| id.channel == "Z";
        let batches: Vec<Vec<Trace>> = source.chopper(TimeWindow::new(2.0, 4.0), &only_z).collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].len(), 2);
        assert_eq!(batches[0][0].start, 2.0);
        assert_eq!(batches[0][0].id.channel, "Z");
    }
}
