// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Time-tagged parameter changes.

Stations, sources and baselines each carry a sorted list of events. An event
replaces the entity's active parameter block at its time; a *hard* event
additionally forces the scheduler to drop the scan it was about to commit and
re-evaluate. A cursor per entity advances monotonically; resetting the cursor
replays the timeline from the session start (used by the outer iteration).
 */

/// One parameter change.
#[derive(Clone, Debug)]
pub struct Event<P> {
    /// When the new parameters take effect \[s since session start\].
    pub time: u32,
    /// Whether a commit crossing this event must be retried.
    pub hard: bool,
    /// The parameter block active from `time` on.
    pub parameters: P,
}

/// A sorted event timeline with a cursor.
#[derive(Clone, Debug)]
pub struct EventList<P> {
    events: Vec<Event<P>>,
    next: usize,
}

impl<P: Clone> EventList<P> {
    /// The caller supplies events sorted by time; the first one anchors the
    /// session start.
    pub fn new(mut events: Vec<Event<P>>) -> EventList<P> {
        events.sort_by_key(|e| e.time);
        EventList { events, next: 0 }
    }

    /// A timeline with a single block covering the whole session.
    pub fn single(parameters: P) -> EventList<P> {
        EventList {
            events: vec![Event {
                time: 0,
                hard: false,
                parameters,
            }],
            next: 0,
        }
    }

    /// Advance the cursor to the latest event at or before `time`, writing
    /// each passed block into `current`. Returns (changed, hard).
    pub fn check_for_new_event(&mut self, time: u32, current: &mut P) -> (bool, bool) {
        let mut changed = false;
        let mut hard = false;
        while let Some(event) = self.events.get(self.next) {
            if event.time > time {
                break;
            }
            *current = event.parameters.clone();
            hard |= event.hard;
            changed = true;
            self.next += 1;
        }
        (changed, hard)
    }

    /// The next event the cursor has not passed yet.
    pub fn peek_next(&self) -> Option<&Event<P>> {
        self.events.get(self.next)
    }

    /// Mutable access to every parameter block on the timeline. Used to
    /// apply sweep overrides; without touching the blocks an override would
    /// be wiped by the next event.
    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut P> {
        self.events.iter_mut().map(|e| &mut e.parameters)
    }

    /// Rewind to the session start.
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list() -> EventList<u32> {
        EventList::new(vec![
            Event {
                time: 0,
                hard: false,
                parameters: 1,
            },
            Event {
                time: 100,
                hard: true,
                parameters: 2,
            },
            Event {
                time: 200,
                hard: false,
                parameters: 3,
            },
        ])
    }

    #[test]
    fn cursor_advances_and_reports_hard_breaks() {
        let mut events = list();
        let mut current = 0;

        let (changed, hard) = events.check_for_new_event(50, &mut current);
        assert!(changed && !hard);
        assert_eq!(current, 1);

        // No event between 50 and 99.
        let (changed, _) = events.check_for_new_event(99, &mut current);
        assert!(!changed);

        // Crossing 100 and 200 at once applies both and keeps the hard flag.
        let (changed, hard) = events.check_for_new_event(500, &mut current);
        assert!(changed && hard);
        assert_eq!(current, 3);
        assert!(events.peek_next().is_none());
    }

    #[test]
    fn reset_replays_the_timeline() {
        let mut events = list();
        let mut current = 0;
        events.check_for_new_event(500, &mut current);
        events.reset();
        let (changed, _) = events.check_for_new_event(0, &mut current);
        assert!(changed);
        assert_eq!(current, 1);
        assert_eq!(events.peek_next().unwrap().time, 100);
    }
}
