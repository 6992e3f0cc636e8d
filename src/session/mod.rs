//! Follow session: the edit / dry-run / confirm cycle of one dialog.
//!
//! `FollowSession` is a plain state machine. Every transition consumes the
//! session and hands back the next one together with at most one
//! `SessionCommand` for the caller to run. Running commands (HTTP, git) is
//! the job of [`SessionDriver`], which feeds their results back in as
//! events.
//!
//! Reconciliations are numbered. Only the result for the latest number is
//! taken; anything older is dropped, so results never apply out of order.

mod backend;
mod driver;

pub use backend::{FollowBackend, LocalBackend, RemoteBackend};
pub use driver::SessionDriver;

use tracing::debug;

use crate::domain::{ApplyOutcome, ProposedState, ReconciliationResult, TrackedState};
use crate::error::FollowError;
use crate::reconcile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Proposal equals the tracked state and nothing is in flight
    Clean,
    /// A reconciliation for the latest edit is in flight
    DirtyPending,
    /// The latest reconciliation has answered
    DirtyResolved,
    /// An apply request is in flight
    Applying,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    EditTarget(String),
    EditPattern(String),
    /// Set the target to the tip of the follow branch.
    UseFollowVersion,
    /// Run the dry run again for the current proposal, e.g. after a
    /// transport failure.
    Retry,
    Resolved {
        seq: u64,
        result: ReconciliationResult,
    },
    Confirm,
    ApplySucceeded(ApplyOutcome),
    ApplyFailed(FollowError),
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Reconcile { seq: u64, proposed: ProposedState },
    Apply { proposed: ProposedState },
    /// The change was updated; reload it from the host.
    Refresh,
}

#[derive(Debug, Clone)]
pub struct FollowSession {
    state: SessionState,
    tracked: TrackedState,
    proposed: ProposedState,
    follow_version: Option<String>,
    latest_seq: u64,
    result: Option<ReconciliationResult>,
    last_error: Option<FollowError>,
    outcome: Option<ApplyOutcome>,
}

impl Default for FollowSession {
    /// A closed session with nothing tracked.
    fn default() -> Self {
        Self {
            state: SessionState::Closed,
            tracked: TrackedState::default(),
            proposed: ProposedState::default(),
            follow_version: None,
            latest_seq: 0,
            result: None,
            last_error: None,
            outcome: None,
        }
    }
}

impl FollowSession {
    /// Open a clean session on `tracked`.
    pub fn open(tracked: TrackedState) -> Self {
        Self {
            state: SessionState::Clean,
            proposed: ProposedState::from(&tracked),
            tracked,
            ..Self::default()
        }
    }

    pub fn with_follow_version(mut self, follow_version: impl Into<String>) -> Self {
        let version = follow_version.into();
        self.follow_version = (!version.is_empty()).then_some(version);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn tracked(&self) -> &TrackedState {
        &self.tracked
    }

    pub fn proposed(&self) -> &ProposedState {
        &self.proposed
    }

    pub fn follow_version(&self) -> Option<&str> {
        self.follow_version.as_deref()
    }

    /// Result of the latest finished reconciliation, if still current.
    pub fn result(&self) -> Option<&ReconciliationResult> {
        self.result.as_ref()
    }

    /// Last user-visible failure (dry run or apply).
    pub fn last_error(&self) -> Option<&FollowError> {
        self.last_error.as_ref()
    }

    pub fn outcome(&self) -> Option<&ApplyOutcome> {
        self.outcome.as_ref()
    }

    #[allow(dead_code)]
    pub fn latest_seq(&self) -> u64 {
        self.latest_seq
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Whether a request issued by this session is still outstanding.
    pub fn is_busy(&self) -> bool {
        matches!(self.state, SessionState::DirtyPending | SessionState::Applying)
    }

    /// Whether the confirm action is enabled.
    pub fn can_apply(&self) -> bool {
        self.state == SessionState::DirtyResolved
            && self
                .result
                .as_ref()
                .is_some_and(|r| reconcile::can_apply(r, &self.tracked, &self.proposed))
    }

    /// Apply one event.
    pub fn handle(mut self, event: SessionEvent) -> (Self, Option<SessionCommand>) {
        use SessionEvent as E;
        use SessionState as S;

        match (self.state, event) {
            (_, E::Cancel) => {
                debug!("Session cancelled in state {:?}", self.state);
                self.state = S::Closed;
                (self, None)
            }
            (S::Clean | S::DirtyPending | S::DirtyResolved, E::EditTarget(target)) => {
                if target == self.proposed.target_ref {
                    return (self, None);
                }
                self.proposed.target_ref = target;
                self.begin_reconcile()
            }
            (S::Clean | S::DirtyPending | S::DirtyResolved, E::EditPattern(pattern)) => {
                if pattern == self.proposed.file_pattern {
                    return (self, None);
                }
                self.proposed.file_pattern = pattern;
                self.begin_reconcile()
            }
            (S::Clean | S::DirtyPending | S::DirtyResolved, E::UseFollowVersion) => {
                match self.follow_version.clone() {
                    Some(version) => self.handle(E::EditTarget(version)),
                    None => (self, None),
                }
            }
            (S::Clean | S::DirtyResolved, E::Retry) => self.begin_reconcile(),
            (S::DirtyPending, E::Resolved { seq, result }) => {
                if seq != self.latest_seq {
                    let stale = FollowError::StaleResolution {
                        seq,
                        latest: self.latest_seq,
                    };
                    debug!("Dropping resolution: {}", stale);
                    return (self, None);
                }
                self.last_error = result.failure.clone().filter(FollowError::is_user_visible);
                self.result = Some(result);
                self.state = S::DirtyResolved;
                (self, None)
            }
            (S::DirtyResolved, E::Confirm) => {
                if !self.can_apply() {
                    debug!("Confirm ignored, nothing to apply");
                    return (self, None);
                }
                self.state = S::Applying;
                self.last_error = None;
                let proposed = self.proposed.clone();
                (self, Some(SessionCommand::Apply { proposed }))
            }
            (S::Applying, E::ApplySucceeded(outcome)) => {
                self.outcome = Some(outcome);
                self.state = S::Closed;
                (self, Some(SessionCommand::Refresh))
            }
            (S::Applying, E::ApplyFailed(error)) => {
                self.last_error = Some(error);
                self.state = S::DirtyResolved;
                (self, None)
            }
            (state, event) => {
                debug!("Ignoring {:?} in state {:?}", event, state);
                (self, None)
            }
        }
    }

    fn begin_reconcile(mut self) -> (Self, Option<SessionCommand>) {
        self.latest_seq += 1;
        self.result = None;
        self.state = SessionState::DirtyPending;
        let command = SessionCommand::Reconcile {
            seq: self.latest_seq,
            proposed: self.proposed.clone(),
        };
        (self, Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn tracked() -> TrackedState {
        TrackedState {
            target_ref: "v1".to_string(),
            file_pattern: "*.py".to_string(),
            included_paths: vec!["a.py".to_string(), "b.py".to_string()],
        }
    }

    fn changed(paths: &[&str]) -> ReconciliationResult {
        ReconciliationResult {
            updated: paths.iter().map(|p| p.to_string()).collect::<BTreeSet<_>>(),
            valid_target: true,
            ..ReconciliationResult::default()
        }
    }

    fn seq_of(command: Option<SessionCommand>) -> u64 {
        match command {
            Some(SessionCommand::Reconcile { seq, .. }) => seq,
            other => panic!("expected reconcile, got {:?}", other),
        }
    }

    #[test]
    fn test_edit_issues_reconcile() {
        let session = FollowSession::open(tracked());
        assert_eq!(session.state(), SessionState::Clean);
        assert!(!session.can_apply());

        let (session, command) = session.handle(SessionEvent::EditTarget("v2".to_string()));
        assert_eq!(session.state(), SessionState::DirtyPending);
        assert_eq!(
            command,
            Some(SessionCommand::Reconcile {
                seq: 1,
                proposed: ProposedState::new("v2", "*.py"),
            })
        );
        assert!(!session.can_apply());
    }

    #[test]
    fn test_unchanged_edit_is_a_no_op() {
        let (session, command) =
            FollowSession::open(tracked()).handle(SessionEvent::EditPattern("*.py".to_string()));
        assert_eq!(session.state(), SessionState::Clean);
        assert_eq!(command, None);
    }

    #[test]
    fn test_last_edit_wins_with_out_of_order_resolutions() {
        let session = FollowSession::open(tracked());
        let (session, c1) = session.handle(SessionEvent::EditTarget("v2".to_string()));
        let (session, c2) = session.handle(SessionEvent::EditTarget("v3".to_string()));
        let (session, c3) = session.handle(SessionEvent::EditPattern("*".to_string()));
        let (s1, s2, s3) = (seq_of(c1), seq_of(c2), seq_of(c3));
        assert!(s1 < s2 && s2 < s3);

        // Resolutions arrive as 2, 3, 1.
        let (session, _) = session.handle(SessionEvent::Resolved {
            seq: s2,
            result: changed(&["from-2.py"]),
        });
        assert_eq!(session.state(), SessionState::DirtyPending);

        let (session, _) = session.handle(SessionEvent::Resolved {
            seq: s3,
            result: changed(&["from-3.py"]),
        });
        assert_eq!(session.state(), SessionState::DirtyResolved);

        let (session, command) = session.handle(SessionEvent::Resolved {
            seq: s1,
            result: changed(&["from-1.py"]),
        });
        assert_eq!(command, None);
        assert_eq!(session.state(), SessionState::DirtyResolved);
        assert_eq!(
            session.result().unwrap().updated.iter().collect::<Vec<_>>(),
            vec!["from-3.py"]
        );
        assert_eq!(session.proposed(), &ProposedState::new("v3", "*"));
        assert!(session.last_error().is_none());
    }

    #[test]
    fn test_confirm_apply_success_closes_and_refreshes() {
        let (session, c) = FollowSession::open(tracked()).handle(SessionEvent::EditTarget("v2".to_string()));
        let (session, _) = session.handle(SessionEvent::Resolved {
            seq: seq_of(c),
            result: changed(&["a.py"]),
        });
        assert!(session.can_apply());

        let (session, command) = session.handle(SessionEvent::Confirm);
        assert_eq!(session.state(), SessionState::Applying);
        assert_eq!(
            command,
            Some(SessionCommand::Apply {
                proposed: ProposedState::new("v2", "*.py")
            })
        );
        assert!(!session.can_apply());

        let outcome = ApplyOutcome {
            new_patchset_id: Some(3),
            description: "ok".to_string(),
            ..ApplyOutcome::default()
        };
        let (session, command) = session.handle(SessionEvent::ApplySucceeded(outcome.clone()));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(command, Some(SessionCommand::Refresh));
        assert_eq!(session.outcome(), Some(&outcome));
        assert_eq!(session.tracked(), &tracked());
    }

    #[test]
    fn test_apply_failure_returns_to_resolved() {
        let (session, c) = FollowSession::open(tracked()).handle(SessionEvent::EditTarget("v2".to_string()));
        let (session, _) = session.handle(SessionEvent::Resolved {
            seq: seq_of(c),
            result: changed(&["a.py"]),
        });
        let (session, _) = session.handle(SessionEvent::Confirm);
        let (session, command) =
            session.handle(SessionEvent::ApplyFailed(FollowError::transport("503")));

        assert_eq!(command, None);
        assert_eq!(session.state(), SessionState::DirtyResolved);
        assert_eq!(session.last_error(), Some(&FollowError::transport("503")));
        assert!(session.result().is_some());
        assert!(session.can_apply());
        assert_eq!(session.tracked(), &tracked());
    }

    #[test]
    fn test_confirm_without_changes_is_ignored() {
        let (session, c) = FollowSession::open(tracked()).handle(SessionEvent::Retry);
        let (session, _) = session.handle(SessionEvent::Resolved {
            seq: seq_of(c),
            result: changed(&[]),
        });
        assert!(!session.can_apply());

        let (session, command) = session.handle(SessionEvent::Confirm);
        assert_eq!(command, None);
        assert_eq!(session.state(), SessionState::DirtyResolved);
    }

    #[test]
    fn test_transport_failure_then_retry() {
        let (session, c) = FollowSession::open(tracked()).handle(SessionEvent::EditTarget("v2".to_string()));
        let (session, _) = session.handle(SessionEvent::Resolved {
            seq: seq_of(c),
            result: ReconciliationResult::invalid(FollowError::transport("timeout")),
        });
        assert_eq!(session.last_error(), Some(&FollowError::transport("timeout")));
        assert!(!session.can_apply());

        let (session, command) = session.handle(SessionEvent::Retry);
        assert_eq!(session.state(), SessionState::DirtyPending);
        assert_eq!(seq_of(command), 2);
        assert_eq!(session.proposed(), &ProposedState::new("v2", "*.py"));
    }

    #[test]
    fn test_use_follow_version() {
        let session = FollowSession::open(tracked()).with_follow_version("v9");
        let (session, command) = session.handle(SessionEvent::UseFollowVersion);
        assert_eq!(session.proposed().target_ref, "v9");
        assert_eq!(seq_of(command), 1);

        let (session, command) = FollowSession::open(tracked())
            .with_follow_version("")
            .handle(SessionEvent::UseFollowVersion);
        assert_eq!(command, None);
        assert_eq!(session.state(), SessionState::Clean);
    }

    #[test]
    fn test_cancel_from_any_state() {
        let (session, _) = FollowSession::open(tracked()).handle(SessionEvent::EditTarget("v2".to_string()));
        let (session, command) = session.handle(SessionEvent::Cancel);
        assert!(session.is_closed());
        assert_eq!(command, None);

        let (session, command) = session.handle(SessionEvent::EditTarget("v3".to_string()));
        assert!(session.is_closed());
        assert_eq!(command, None);
        assert!(FollowSession::default().is_closed());
    }
}
