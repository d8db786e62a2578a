//! Waypoints, route sections and lifecycle event fan-out
//!
//! Every structural change is applied to the segment store first, then to
//! the diff engine (if a comparison is active), then handed to the registered
//! listeners, which therefore always observe the post-mutation store.

use crate::{
    Config, DiffEngine, Outcome, Result, RouteSection, Router, Segment, SectionId, SegmentStore,
    TrackDifference, TrackError, Waypoint,
};
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// A track shared between threads behind the change lock
pub type SharedTrack = Arc<RwLock<Track>>;

/// Lifecycle notification delivered to [`TrackListener`]s
#[derive(Debug, Clone, PartialEq)]
pub enum TrackEvent {
    SectionAdded { index: usize, id: SectionId },
    SectionRemoved { index: usize, id: SectionId },
    CalculationStarting { index: usize, id: SectionId },
    CalculationFinished {
        index: usize,
        id: SectionId,
        canceled: bool,
    },
    FileSplitChanged { waypoint: usize, split: bool },
}

/// Observer of track changes
pub trait TrackListener {
    /// Called after the store and the diff engine have processed `event`
    fn on_event(&mut self, event: &TrackEvent, store: &SegmentStore);
}

impl<F> TrackListener for F
where
    F: FnMut(&TrackEvent, &SegmentStore),
{
    fn on_event(&mut self, event: &TrackEvent, store: &SegmentStore) {
        self(event, store)
    }
}

/// A planned route: waypoints, one section per consecutive waypoint pair and
/// the calculated points of every section
pub struct Track {
    config: Config,
    waypoints: Vec<Waypoint>,
    store: SegmentStore,
    diff: Option<DiffEngine>,
    calculating: HashSet<SectionId>,
    listeners: Vec<Box<dyn TrackListener + Send + Sync>>,
}

impl Default for Track {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Track {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            waypoints: Vec::new(),
            store: SegmentStore::new(),
            diff: None,
            calculating: HashSet::new(),
            listeners: Vec::new(),
        }
    }

    /// Wrap this track in the change lock
    pub fn into_shared(self) -> SharedTrack {
        Arc::new(RwLock::new(self))
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    #[inline]
    pub fn store(&self) -> &SegmentStore {
        &self.store
    }

    /// The section starting at waypoint `index`
    #[inline]
    pub fn section(&self, index: usize) -> Option<&RouteSection> {
        self.store.segment(index).map(Segment::section)
    }

    pub fn add_listener(&mut self, listener: Box<dyn TrackListener + Send + Sync>) {
        self.listeners.push(listener);
    }

    /// Insert a waypoint before `index` (`index == len` appends)
    pub fn add_waypoint(&mut self, index: usize, waypoint: Waypoint) -> Result<()> {
        let count = self.waypoints.len();
        if index > count {
            return Err(TrackError::IndexOutOfRange { index, len: count });
        }
        self.waypoints.insert(index, waypoint);
        tracing::debug!(index, waypoints = count + 1, "Added waypoint");

        if count == 0 {
            return Ok(());
        }
        if index == 0 {
            self.insert_section(0);
        } else if index == count {
            self.insert_section(index - 1);
        } else {
            // Split the section that spanned the new waypoint
            self.remove_section(index - 1);
            self.insert_section(index - 1);
            self.insert_section(index);
        }
        Ok(())
    }

    /// Remove the waypoint at `index`
    pub fn remove_waypoint(&mut self, index: usize) -> Result<Waypoint> {
        let count = self.waypoints.len();
        if index >= count {
            return Err(TrackError::IndexOutOfRange { index, len: count });
        }
        let removed = self.waypoints.remove(index);
        tracing::debug!(index, waypoints = count - 1, "Removed waypoint");

        if count == 1 {
            return Ok(removed);
        }
        if index == 0 {
            self.remove_section(0);
            self.resync_boundary(0);
        } else if index == count - 1 {
            self.remove_section(index - 1);
            if index >= 2 {
                self.resync_boundary(index - 2);
            }
        } else {
            // Merge the two sections around the removed waypoint
            self.remove_section(index - 1);
            self.remove_section(index - 1);
            self.insert_section(index - 1);
        }
        Ok(removed)
    }

    /// Replace the waypoint at `index`, recreating its adjacent sections
    pub fn move_waypoint(&mut self, index: usize, waypoint: Waypoint) -> Result<()> {
        let count = self.waypoints.len();
        let Some(slot) = self.waypoints.get_mut(index) else {
            return Err(TrackError::IndexOutOfRange { index, len: count });
        };
        *slot = waypoint;

        if index > 0 {
            self.remove_section(index - 1);
            self.insert_section(index - 1);
        }
        if index + 1 < count {
            self.remove_section(index);
            self.insert_section(index);
        }
        Ok(())
    }

    /// Toggle the file split at waypoint `index`
    pub fn set_file_split(&mut self, index: usize, split: bool) -> Result<()> {
        let count = self.waypoints.len();
        let Some(waypoint) = self.waypoints.get_mut(index) else {
            return Err(TrackError::IndexOutOfRange { index, len: count });
        };
        if waypoint.file_split == split {
            return Ok(());
        }
        waypoint.file_split = split;

        // The last waypoint starts no section
        self.store.set_file_split(index, split);
        self.notify(TrackEvent::FileSplitChanged {
            waypoint: index,
            split,
        });
        Ok(())
    }

    /// Sections without points that are not being calculated
    pub fn pending_sections(&self) -> Vec<RouteSection> {
        self.store
            .segments()
            .iter()
            .filter(|s| !s.has_points() && !self.calculating.contains(&s.section().id()))
            .map(|s| s.section().clone())
            .collect()
    }

    /// Mark the section `id` as being calculated
    ///
    /// Returns the section to hand to the router, or `None` if it no longer
    /// exists.
    pub fn begin_calculation(&mut self, id: SectionId) -> Option<RouteSection> {
        let Some(index) = self.section_index(id) else {
            tracing::warn!(%id, "Calculation requested for unknown section");
            return None;
        };
        self.calculating.insert(id);

        if let Some(diff) = &mut self.diff {
            diff.calculation_starting(index);
        }
        self.notify(TrackEvent::CalculationStarting { index, id });
        self.section(index).cloned()
    }

    /// Apply the result of a section calculation
    ///
    /// Results for sections that were removed meanwhile are dropped. Invalid
    /// results are replaced by the straight-line fallback.
    pub fn finish_calculation(&mut self, id: SectionId, outcome: Outcome) {
        self.calculating.remove(&id);
        let Some(index) = self.section_index(id) else {
            tracing::debug!(%id, "Dropping result for removed section");
            return;
        };

        let result = match outcome {
            Outcome::Success(result) => result,
            Outcome::Invalid => {
                tracing::warn!(%id, index, "Routing failed, using straight line");
                let Some(section) = self.section(index) else {
                    return;
                };
                section.fallback(&self.config)
            }
            Outcome::Canceled => {
                tracing::debug!(%id, index, "Calculation canceled");
                let points = self.store.segment(index).and_then(Segment::shared_points);
                if let Some(diff) = &mut self.diff {
                    diff.calculation_canceled(index, points);
                }
                self.notify(TrackEvent::CalculationFinished {
                    index,
                    id,
                    canceled: true,
                });
                return;
            }
        };

        self.store.set_points(index, result);
        if let Some(diff) = &mut self.diff {
            let points = self.store.segment(index).and_then(Segment::shared_points);
            diff.calculation_finished(index, points);
        }
        self.notify(TrackEvent::CalculationFinished {
            index,
            id,
            canceled: false,
        });
    }

    /// Calculate every pending section with `router`, one after another
    pub fn calculate_pending<R: Router + ?Sized>(&mut self, router: &R) -> usize {
        let pending = self.pending_sections();
        for section in &pending {
            let Some(section) = self.begin_calculation(section.id()) else {
                continue;
            };
            let outcome = router.route(&section);
            self.finish_calculation(section.id(), outcome);
        }
        pending.len()
    }

    /// Calculate every pending section with `router` on the rayon pool
    ///
    /// Results are applied in section order once all calculations are done.
    pub fn calculate_pending_parallel<R: Router + Sync + ?Sized>(&mut self, router: &R) -> usize {
        let sections: Vec<RouteSection> = self
            .pending_sections()
            .iter()
            .filter_map(|s| self.begin_calculation(s.id()))
            .collect();

        let outcomes: Vec<(SectionId, Outcome)> = sections
            .par_iter()
            .map(|section| (section.id(), router.route(section)))
            .collect();

        let count = outcomes.len();
        for (id, outcome) in outcomes {
            self.finish_calculation(id, outcome);
        }
        count
    }

    /// Freeze the current track and start reporting differences against it
    pub fn start_comparison(&mut self) {
        if let Some(previous) = self.diff.take() {
            previous.dispose();
        }
        self.diff = Some(DiffEngine::new(&self.store, self.config.clone()));
    }

    /// Stop comparing; returns the final differences
    pub fn end_comparison(&mut self) -> Vec<TrackDifference> {
        self.diff.take().map(DiffEngine::dispose).unwrap_or_default()
    }

    #[inline]
    pub fn diff(&self) -> Option<&DiffEngine> {
        self.diff.as_ref()
    }

    /// Mutable access for difference selection
    #[inline]
    pub fn diff_mut(&mut self) -> Option<&mut DiffEngine> {
        self.diff.as_mut()
    }

    fn section_index(&self, id: SectionId) -> Option<usize> {
        self.store
            .segments()
            .iter()
            .position(|s| s.section().id() == id)
    }

    /// Create the section starting at waypoint `index`
    fn insert_section(&mut self, index: usize) {
        let (Some(start), Some(end)) = (self.waypoints.get(index), self.waypoints.get(index + 1)) else {
            return;
        };
        let section = RouteSection::new(start.clone(), end.clone());
        let id = section.id();

        self.store.insert(index, Segment::new(section));
        if let Some(diff) = &mut self.diff {
            diff.section_added(index);
        }
        self.notify(TrackEvent::SectionAdded { index, id });
    }

    fn remove_section(&mut self, index: usize) {
        let Some(segment) = self.store.remove(index) else {
            return;
        };
        let id = segment.section().id();
        segment.section().cancel();
        self.calculating.remove(&id);

        if let Some(diff) = &mut self.diff {
            diff.section_removed(index);
        }
        self.notify(TrackEvent::SectionRemoved { index, id });
    }

    /// Re-scan the section that became the first or last one
    fn resync_boundary(&mut self, index: usize) {
        if let Some(diff) = &mut self.diff {
            diff.resync(index);
        }
    }

    fn notify(&mut self, event: TrackEvent) {
        tracing::trace!(?event, listeners = self.listeners.len(), "Track event");
        for listener in &mut self.listeners {
            listener.on_event(&event, &self.store);
        }
    }
}
