use crate::viewer::model::{TraceSummary, ViewerModel};
use beamcore::interface::{ChannelPattern, Marker, MarkerSink, Trace, Visualizer};
use std::sync::{Arc, RwLock};

/// Viewer that keeps the latest markers, stacks and hide-set and echoes
/// them to stdout.
#[derive(Clone, Default)]
pub struct ConsoleViewer {
    state: Arc<RwLock<ViewerModel>>,
    quiet: bool,
}

impl ConsoleViewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quiet() -> Self {
        Self {
            quiet: true,
            ..Self::default()
        }
    }

    pub fn publish_status(&self, message: &str) {
        if !self.quiet {
            println!("[VIEW] {}", message);
        }
    }

    pub fn snapshot(&self) -> ViewerModel {
        self.state
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl MarkerSink for ConsoleViewer {
    fn add_markers(&mut self, markers: &[Marker]) {
        if let Ok(mut guard) = self.state.write() {
            guard.markers.extend_from_slice(markers);
        }
        self.publish_status(&format!("{} markers added", markers.len()));
    }
}

impl Visualizer for ConsoleViewer {
    fn show_traces(&mut self, traces: &[Trace]) {
        let summaries: Vec<TraceSummary> = traces.iter().map(TraceSummary::from_trace).collect();
        for summary in &summaries {
            self.publish_status(&format!(
                "{} samples={} peak={:.4} rms={:.4}",
                summary.id, summary.samples, summary.peak, summary.rms
            ));
        }
        if let Ok(mut guard) = self.state.write() {
            guard.traces = summaries;
        }
    }

    fn hide(&mut self, patterns: &[ChannelPattern]) {
        let hidden: Vec<String> = patterns.iter().map(ChannelPattern::to_string).collect();
        self.publish_status(&format!("hiding {} channels", hidden.len()));
        if let Ok(mut guard) = self.state.write() {
            guard.hidden = hidden;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beamcore::interface::ChannelId;

    #[test]
    fn viewer_clones_share_state() {
        let viewer = ConsoleViewer::quiet();
        let mut sink = viewer.clone();
        sink.add_markers(&[Marker::window(0.0, 1.0, ChannelPattern::any())]);
        sink.hide(&[ChannelPattern::channel_code("Z")]);
        sink.show_traces(&[Trace::new(
            ChannelId::new("", "STK", "", "Z"),
            0.0,
            0.1,
            vec![1.0, -3.0],
        )]);
        let model = viewer.snapshot();
        assert_eq!(model.markers.len(), 1);
        assert_eq!(model.hidden, vec!["*.*.*.Z".to_string()]);
        assert_eq!(model.traces[0].peak, 3.0);
    }
}
