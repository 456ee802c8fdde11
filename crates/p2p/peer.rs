//! `Peer`/`Buddy`: one worker task bound to one remote peer,
//! its cancellation state, and the error-counting that drives ban decisions.

use std::time::{Duration, Instant};

use crate::error::EngineError;

/// `ctrlState`. A buddy re-checks this at every suspension point:
/// `Running → Stopped` returns leases and exits the current round; `Stopped
/// → Zombie` disconnects outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CtrlState {
    Running,
    Stopped,
    Zombie,
}

/// One buddy: a peer handle plus its cancellation and error-counting state.
/// `peer_id` stands in for whatever wire-layer connection handle the p2p
/// transport owns; this engine only needs something to log and to key bans by.
#[derive(Debug)]
pub struct Buddy {
    pub peer_id: String,
    ctrl_state: CtrlState,
    consecutive_errors: u32,
    banned_until: Option<Instant>,
}

impl Buddy {
    pub fn new(peer_id: String) -> Self {
        Self { peer_id, ctrl_state: CtrlState::Running, consecutive_errors: 0, banned_until: None }
    }

    pub fn ctrl_state(&self) -> CtrlState {
        self.ctrl_state
    }

    pub fn is_runnable(&self) -> bool {
        self.ctrl_state == CtrlState::Running
    }

    pub fn stop(&mut self) {
        if self.ctrl_state == CtrlState::Running {
            self.ctrl_state = CtrlState::Stopped;
        }
    }

    pub fn mark_zombie(&mut self) {
        self.ctrl_state = CtrlState::Zombie;
    }

    /// A timeout on any network request demotes `Running → Stopped`.
    pub fn on_timeout(&mut self) {
        self.stop();
    }

    /// Records an error from `err` if its kind counts against the peer.
    /// Once `ban_after_failures` consecutive such errors accumulate,
    /// the buddy is banned for `ban_duration` and demoted to `Stopped`.
    pub fn record_error(&mut self, err: &EngineError, ban_after_failures: u32, ban_duration: Duration) {
        if !err.counts_against_peer() {
            return;
        }
        self.consecutive_errors += 1;
        if self.consecutive_errors >= ban_after_failures {
            self.banned_until = Some(Instant::now() + ban_duration);
            self.stop();
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
    }

    pub fn is_banned(&self) -> bool {
        self.banned_until.is_some_and(|until| Instant::now() < until)
    }

    /// Clears an expired ban and resets error counters, making the buddy
    /// eligible to be re-dialed by the connection pool.
    pub fn maybe_unban(&mut self) {
        if let Some(until) = self.banned_until {
            if Instant::now() >= until {
                self.banned_until = None;
                self.consecutive_errors = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::H256;

    #[test]
    fn three_consecutive_bad_proofs_bans_the_buddy() {
        let mut buddy = Buddy::new("peer-1".into());
        for _ in 0..3 {
            buddy.record_error(&EngineError::BadProof(H256::zero()), 3, Duration::from_secs(1));
        }
        assert!(buddy.is_banned());
        assert_eq!(buddy.ctrl_state(), CtrlState::Stopped);
    }

    #[test]
    fn a_success_resets_the_error_counter() {
        let mut buddy = Buddy::new("peer-1".into());
        buddy.record_error(&EngineError::WireTimeout("t".into()), 3, Duration::from_secs(1));
        buddy.record_error(&EngineError::WireTimeout("t".into()), 3, Duration::from_secs(1));
        buddy.record_success();
        buddy.record_error(&EngineError::WireTimeout("t".into()), 3, Duration::from_secs(1));
        assert!(!buddy.is_banned());
    }

    #[test]
    fn transient_errors_never_count_against_a_peer() {
        let mut buddy = Buddy::new("peer-1".into());
        for _ in 0..10 {
            buddy.record_error(&EngineError::TrieIsLockedForPerusal, 3, Duration::from_secs(1));
        }
        assert!(!buddy.is_banned());
    }

    #[test]
    fn stop_then_zombie_is_a_one_way_transition() {
        let mut buddy = Buddy::new("peer-1".into());
        buddy.stop();
        assert_eq!(buddy.ctrl_state(), CtrlState::Stopped);
        buddy.mark_zombie();
        assert_eq!(buddy.ctrl_state(), CtrlState::Zombie);
    }
}
