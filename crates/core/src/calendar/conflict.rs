//! Interval-overlap conflict detection
//!
//! Events are half-open intervals: `[09:00, 10:00)` and `[10:00, 11:00)` do
//! not conflict. Cancelled events never take part.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{Duration, Utc};
use tidemark_domain::{CalendarEvent, EventStatus, Result, SyncWindow, WindowConfig};
use tracing::{debug, instrument};

use super::ports::CalendarEventRepository;

/// Event id -> ids of the events it overlaps; always symmetric
pub type ConflictGraph = BTreeMap<String, BTreeSet<String>>;

/// Build the conflict graph for `events`
///
/// Every non-cancelled event gets a key, possibly with an empty set. The
/// forward sweep from each event stops once a candidate starts at or after
/// `end + slack`; `slack` only bounds the scan and never changes what counts
/// as an overlap.
pub fn detect_conflicts(events: &[CalendarEvent], slack: Duration) -> ConflictGraph {
    let mut active: Vec<&CalendarEvent> =
        events.iter().filter(|event| event.status != EventStatus::Cancelled).collect();
    active.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.end_time.cmp(&b.end_time))
            .then_with(|| a.event_id.cmp(&b.event_id))
    });

    let mut graph: ConflictGraph =
        active.iter().map(|event| (event.event_id.clone(), BTreeSet::new())).collect();

    for (i, current) in active.iter().enumerate() {
        let horizon = current.end_time + slack;
        for other in active.iter().skip(i + 1) {
            if other.start_time >= horizon {
                break;
            }
            let overlaps =
                other.start_time < current.end_time && other.start_time < other.end_time;
            if overlaps && other.event_id != current.event_id {
                if let Some(set) = graph.get_mut(&current.event_id) {
                    set.insert(other.event_id.clone());
                }
                if let Some(set) = graph.get_mut(&other.event_id) {
                    set.insert(current.event_id.clone());
                }
            }
        }
    }

    graph
}

/// Number of events with at least one conflict
pub fn conflicting_count(graph: &ConflictGraph) -> usize {
    graph.values().filter(|set| !set.is_empty()).count()
}

/// Recomputes and stores conflict flags over the analysis window
pub struct ConflictAnalyzer {
    events: Arc<dyn CalendarEventRepository>,
    window: WindowConfig,
    slack: Duration,
}

impl ConflictAnalyzer {
    pub fn new(
        events: Arc<dyn CalendarEventRepository>,
        window: WindowConfig,
        slack_secs: i64,
    ) -> Self {
        Self { events, window, slack: Duration::seconds(slack_secs) }
    }

    /// Read the window, detect, write the flags; returns the conflicting count
    #[instrument(skip(self))]
    pub async fn analyze(&self, user_id: &str) -> Result<usize> {
        let window = self.window.resolve(Utc::now());
        let mut events = self.events.events_in_window(user_id, &window).await?;

        // Events straddling an edge pull their overlapping neighbours in
        let widened = covering_window(&window, &events);
        if widened != window {
            events = self.events.events_in_window(user_id, &widened).await?;
        }
        let window = widened;

        let graph = detect_conflicts(&events, self.slack);
        self.events.update_conflict_flags(user_id, &window, &graph).await?;

        let conflicting = conflicting_count(&graph);
        debug!(events = events.len(), conflicting, "conflict flags updated");
        Ok(conflicting)
    }
}

/// Smallest window holding `window` and every event in `events`
fn covering_window(window: &SyncWindow, events: &[CalendarEvent]) -> SyncWindow {
    let earliest = events.iter().map(|event| event.start_time).min();
    let latest = events.iter().map(|event| event.end_time).max();
    SyncWindow {
        time_min: earliest.map_or(window.time_min, |start| start.min(window.time_min)),
        time_max: window.time_max.map(|max| latest.map_or(max, |end| end.max(max))),
    }
}
