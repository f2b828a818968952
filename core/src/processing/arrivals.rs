use crate::interface::{Arrival, ArrivalModel};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ArrivalKey {
    distance_bits: u64,
    depth_bits: u64,
    phases: String,
}

/// Memo of first-arrival travel times keyed by distance, depth and phase set.
///
/// The cache is an explicit object: its owner decides whether it lives for a
/// single run or across many. Entries are only ever added, and a lookup with
/// no arrival is remembered as a permanent negative result.
pub struct ArrivalCache {
    model: Box<dyn ArrivalModel + Send>,
    entries: HashMap<ArrivalKey, Option<f64>>,
}

impl ArrivalCache {
    pub fn new(model: Box<dyn ArrivalModel + Send>) -> Self {
        Self {
            model,
            entries: HashMap::new(),
        }
    }

    /// Earliest travel time among `phases`, seconds after origin.
    pub fn first_arrival(&mut self, distance_m: f64, depth_m: f64, phases: &[String]) -> Option<f64> {
        let key = ArrivalKey {
            distance_bits: distance_m.to_bits(),
            depth_bits: depth_m.to_bits(),
            phases: phases.join("."),
        };
        if let Some(cached) = self.entries.get(&key) {
            return *cached;
        }
        let first = self
            .model
            .travel_times(distance_m, depth_m, phases)
            .into_iter()
            .map(|arrival| arrival.time)
            .filter(|t| t.is_finite())
            .fold(None, |best: Option<f64>, t| Some(best.map_or(t, |b| b.min(t))));
        self.entries.insert(key, first);
        first
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_model(self) -> Box<dyn ArrivalModel + Send> {
        self.model
    }

    pub fn negative_entries(&self) -> usize {
        self.entries.values().filter(|v| v.is_none()).count()
    }
}

/// Straight-ray travel times through a uniform half-space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomogeneousHalfSpace {
    pub p_velocity_km_s: f64,
    pub s_velocity_km_s: f64,
}

impl Default for HomogeneousHalfSpace {
    fn default() -> Self {
        Self {
            p_velocity_km_s: 6.0,
            s_velocity_km_s: 3.46,
        }
    }
}

impl ArrivalModel for HomogeneousHalfSpace {
    fn travel_times(&self, distance_m: f64, depth_m: f64, phases: &[String]) -> Vec<Arrival> {
        let path_km = distance_m.hypot(depth_m) / 1000.0;
        let mut arrivals: Vec<Arrival> = phases
            .iter()
            .filter_map(|phase| {
                let velocity = match phase.as_str() {
                    "P" | "p" => self.p_velocity_km_s,
                    "S" | "s" => self.s_velocity_km_s,
                    _ => return None,
                };
                (velocity > 0.0).then(|| Arrival {
                    phase: phase.clone(),
                    time: path_km / velocity,
                })
            })
            .collect();
        arrivals.sort_by(|a, b| a.time.total_cmp(&b.time));
        arrivals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        calls: Arc<AtomicUsize>,
        inner: HomogeneousHalfSpace,
    }

    impl ArrivalModel for Counting {
        fn travel_times(&self, distance_m: f64, depth_m: f64, phases: &[String]) -> Vec<Arrival> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.travel_times(distance_m, depth_m, phases)
        }
    }

    fn phases(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn half_space_travel_time_uses_slant_path() {
        let model = HomogeneousHalfSpace {
            p_velocity_km_s: 5.0,
            s_velocity_km_s: 3.0,
        };
        let arrivals = model.travel_times(30_000.0, 40_000.0, &phases(&["S", "P"]));
        assert_eq!(arrivals[0].phase, "P");
        assert!((arrivals[0].time - 10.0).abs() < 1e-12);
        assert!(model.travel_times(1.0, 1.0, &phases(&["PKiKP"])).is_empty());
    }

    #[test]
    fn cache_remembers_hits_and_misses() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut cache = ArrivalCache::new(Box::new(Counting {
            calls: calls.clone(),
            inner: HomogeneousHalfSpace::default(),
        }));

        let first = cache.first_arrival(60_000.0, 0.0, &phases(&["P"]));
        let again = cache.first_arrival(60_000.0, 0.0, &phases(&["P"]));
        assert_eq!(first, again);
        assert!((first.unwrap() - 10.0).abs() < 1e-12);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(cache.first_arrival(60_000.0, 0.0, &phases(&["Pdiff"])).is_none());
        assert!(cache.first_arrival(60_000.0, 0.0, &phases(&["Pdiff"])).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.negative_entries(), 1);
    }
}
