//! Deadline queue for the controller's deferred actions
//!
//! The host owns the actual clock: it asks for [`TimerQueue::next_deadline`],
//! arranges to wake up then, and hands due timers back to the controller.
//! Every timer carries the session it was scheduled for so that timers
//! outliving their session stay inert.

use crate::SessionId;
use std::time::Duration;
use web_time::Instant;

/// Deferred controller actions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimerKind {
    /// End a programmatic-change suppression window
    ReleaseProgrammatic { token: u64 },
    /// End a fullscreen-transition suppression window
    ReleaseFullscreen { token: u64 },
    /// Seek to the saved offset once the engine has settled
    RestoreOffset,
    /// Compare live and saved position after the page became visible
    VisibilityCheck,
}

/// A scheduled action
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timer {
    pub deadline: Instant,
    pub session: SessionId,
    pub kind: TimerKind,
    seq: u64,
}

/// Deadline-ordered timer queue
#[derive(Debug, Default)]
pub struct TimerQueue {
    timers: Vec<Timer>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `kind` to fire `delay` after `now`
    pub fn schedule(&mut self, now: Instant, delay: Duration, session: SessionId, kind: TimerKind) {
        let timer = Timer {
            deadline: now + delay,
            session,
            kind,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        // Keep ordered by (deadline, insertion)
        let at = self
            .timers
            .partition_point(|t| (t.deadline, t.seq) <= (timer.deadline, timer.seq));
        self.timers.insert(at, timer);
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.first().map(|t| t.deadline)
    }

    /// Remove and return every timer due at `now`, earliest first
    pub fn take_due(&mut self, now: Instant) -> Vec<Timer> {
        let due = self.timers.partition_point(|t| t.deadline <= now);
        self.timers.drain(..due).collect()
    }

    /// Drop all timers of `session`
    pub fn cancel_session(&mut self, session: SessionId) -> usize {
        let before = self.timers.len();
        self.timers.retain(|t| t.session != session);
        before - self.timers.len()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_in_deadline_order() {
        let mut queue = TimerQueue::new();
        let session = SessionId::new();
        let t0 = Instant::now();

        queue.schedule(t0, Duration::from_millis(300), session, TimerKind::VisibilityCheck);
        queue.schedule(t0, Duration::from_millis(100), session, TimerKind::RestoreOffset);
        queue.schedule(t0, Duration::from_millis(200), session, TimerKind::ReleaseFullscreen { token: 1 });

        assert_eq!(queue.next_deadline(), Some(t0 + Duration::from_millis(100)));

        let due = queue.take_due(t0 + Duration::from_millis(250));
        let kinds: Vec<TimerKind> = due.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TimerKind::RestoreOffset, TimerKind::ReleaseFullscreen { token: 1 }]
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_equal_deadlines_fire_in_insertion_order() {
        let mut queue = TimerQueue::new();
        let session = SessionId::new();
        let t0 = Instant::now();

        queue.schedule(t0, Duration::from_millis(100), session, TimerKind::ReleaseProgrammatic { token: 1 });
        queue.schedule(t0, Duration::from_millis(100), session, TimerKind::RestoreOffset);

        let due = queue.take_due(t0 + Duration::from_millis(100));
        assert_eq!(due[0].kind, TimerKind::ReleaseProgrammatic { token: 1 });
        assert_eq!(due[1].kind, TimerKind::RestoreOffset);
    }

    #[test]
    fn test_nothing_due_early() {
        let mut queue = TimerQueue::new();
        let t0 = Instant::now();
        queue.schedule(t0, Duration::from_millis(100), SessionId::new(), TimerKind::RestoreOffset);
        assert!(queue.take_due(t0 + Duration::from_millis(99)).is_empty());
        assert!(!queue.is_empty());
    }

    #[test]
    fn test_cancel_session() {
        let mut queue = TimerQueue::new();
        let old = SessionId::new();
        let current = SessionId::new();
        let t0 = Instant::now();

        queue.schedule(t0, Duration::from_millis(100), old, TimerKind::RestoreOffset);
        queue.schedule(t0, Duration::from_millis(100), current, TimerKind::RestoreOffset);

        assert_eq!(queue.cancel_session(old), 1);
        let due = queue.take_due(t0 + Duration::from_secs(1));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].session, current);
    }
}
