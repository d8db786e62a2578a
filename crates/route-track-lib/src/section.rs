//! Route sections and the routing collaborator interface
//!
//! A section is one waypoint-to-waypoint leg. The routing backend is not part
//! of this crate; it only has to implement [`Router`].

use crate::{Config, ConvertedSection, Position, straight_line};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Result of a successful section calculation
pub type RouteResult = ConvertedSection;

/// Stable identifier of a route section
///
/// Indices shift when waypoints are inserted or removed; ids do not, so late
/// calculation results can still be matched to their section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SectionId(pub u64);

impl SectionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SectionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "section#{}", self.0)
    }
}

/// A user-placed route waypoint
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Waypoint {
    pub position: Position,
    pub altitude: Option<f32>,
    /// Start a new exported file at this waypoint
    pub file_split: bool,
    /// Route straight to the next waypoint instead of following roads
    pub direct: bool,
    pub name: Option<String>,
}

impl Waypoint {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }
}

/// One waypoint-to-waypoint leg handed to the routing collaborator
#[derive(Debug, Clone)]
pub struct RouteSection {
    id: SectionId,
    start: Waypoint,
    end: Waypoint,
    cancel: Arc<AtomicBool>,
}

impl RouteSection {
    pub fn new(start: Waypoint, end: Waypoint) -> Self {
        Self {
            id: SectionId::next(),
            start,
            end,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    #[inline]
    pub fn id(&self) -> SectionId {
        self.id
    }

    #[inline]
    pub fn start(&self) -> &Waypoint {
        &self.start
    }

    #[inline]
    pub fn end(&self) -> &Waypoint {
        &self.end
    }

    /// Direct sections skip road routing
    #[inline]
    pub fn is_direct(&self) -> bool {
        self.start.direct
    }

    /// Whether this section begins a new exported file
    #[inline]
    pub fn starts_file(&self) -> bool {
        self.start.file_split
    }

    pub(crate) fn set_file_split(&mut self, split: bool) {
        self.start.file_split = split;
    }

    /// Ask a running calculation to stop
    ///
    /// Shared by every clone of this section.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_canceled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Straight-line result used when routing fails
    pub fn fallback(&self, config: &Config) -> RouteResult {
        straight_line(
            self.start.position,
            self.start.altitude,
            self.end.position,
            self.end.altitude,
            config,
        )
    }
}

/// How a section calculation ended
#[derive(Debug, Clone)]
pub enum Outcome {
    Success(RouteResult),
    /// The backend could not route this section
    Invalid,
    Canceled,
}

/// The routing collaborator
pub trait Router {
    /// Compute the points of one section
    fn route(&self, section: &RouteSection) -> Outcome;
}

/// Router that connects waypoints with straight lines
///
/// Always available; useful as a fallback and for tests.
#[derive(Debug, Clone, Default)]
pub struct StraightLineRouter {
    pub config: Config,
}

impl StraightLineRouter {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl Router for StraightLineRouter {
    fn route(&self, section: &RouteSection) -> Outcome {
        if section.is_canceled() {
            return Outcome::Canceled;
        }
        Outcome::Success(section.fallback(&self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section() -> RouteSection {
        RouteSection::new(
            Waypoint::new(Position::new(47.0, 8.0)),
            Waypoint::new(Position::new(47.0, 8.1)),
        )
    }

    #[test]
    fn test_section_ids_are_unique() {
        let a = section();
        let b = section();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let a = section();
        let b = a.clone();
        assert!(!b.is_canceled());
        a.cancel();
        assert!(b.is_canceled());
    }

    #[test]
    fn test_straight_line_router() {
        let router = StraightLineRouter::default();
        match router.route(&section()) {
            Outcome::Success(result) => {
                assert_eq!(result.points.len(), 2);
                assert!(result.totals().distance() > 7000.0);
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let canceled = section();
        canceled.cancel();
        assert!(matches!(router.route(&canceled), Outcome::Canceled));
    }
}
