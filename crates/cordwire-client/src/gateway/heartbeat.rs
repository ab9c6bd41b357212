//! Unanswered-heartbeat accounting.

/// Unanswered heartbeats at which the link is considered dead.
pub const MISSED_ACK_THRESHOLD: u32 = 2;

/// What to do when the heartbeat timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beat {
    Send,
    LinkDead,
}

/// Counts heartbeats sent without a matching ack.
#[derive(Debug, Clone)]
pub struct HeartbeatTracker {
    unanswered: u32,
    threshold: u32,
}

impl HeartbeatTracker {
    pub fn new() -> Self {
        Self {
            unanswered: 0,
            threshold: MISSED_ACK_THRESHOLD,
        }
    }

    pub fn on_tick(&self) -> Beat {
        if self.unanswered >= self.threshold {
            Beat::LinkDead
        } else {
            Beat::Send
        }
    }

    /// A heartbeat went out, scheduled or in reply to a server request.
    pub fn on_sent(&mut self) {
        self.unanswered = self.unanswered.saturating_add(1);
    }

    pub fn on_ack(&mut self) {
        self.unanswered = self.unanswered.saturating_sub(1);
    }

    pub fn unanswered(&self) -> u32 {
        self.unanswered
    }
}

impl Default for HeartbeatTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_missed_acks_kill_the_link() {
        let mut hb = HeartbeatTracker::new();
        assert_eq!(hb.on_tick(), Beat::Send);
        hb.on_sent();
        assert_eq!(hb.on_tick(), Beat::Send);
        hb.on_sent();
        assert_eq!(hb.on_tick(), Beat::LinkDead);
    }

    #[test]
    fn acks_keep_the_link_alive() {
        let mut hb = HeartbeatTracker::new();
        for _ in 0..10 {
            assert_eq!(hb.on_tick(), Beat::Send);
            hb.on_sent();
            hb.on_ack();
        }
        assert_eq!(hb.unanswered(), 0);
    }

    #[test]
    fn ack_saturates_at_zero() {
        let mut hb = HeartbeatTracker::new();
        hb.on_ack();
        hb.on_ack();
        assert_eq!(hb.unanswered(), 0);
        hb.on_sent();
        assert_eq!(hb.unanswered(), 1);
    }
}
