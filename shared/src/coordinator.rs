//! The mutation coordinator: sole owner of the trip snapshot and the only
//! code allowed to produce mutation calls.
//!
//! At most one call is outstanding at a time. Requests made while one is in
//! flight are refused with [`TripError::Busy`] instead of being queued, so a
//! stale intent can never be replayed against a snapshot the in-flight call
//! is about to replace. A successful mutation is never patched into the
//! snapshot; the coordinator asks for a full `GetTrip` and swaps the whole
//! trip for the server's answer.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::capabilities::{ApiCall, ApiError};
use crate::error::TripError;
use crate::sync::StaleSnapshot;
use crate::transition::{self, TripAction};
use crate::trip::{AttendanceCounts, EntryId, EntryStatus, RouteId, StudentId, Trip, TripId};

/// Correlates a response with the call that produced it.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    SetEntryStatus {
        entry_id: EntryId,
        student_id: StudentId,
        target: EntryStatus,
    },
    StartTrip,
    EndTrip,
}

impl MutationKind {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetEntryStatus { .. } => "set_entry_status",
            Self::StartTrip => "start_trip",
            Self::EndTrip => "end_trip",
        }
    }

    #[must_use]
    pub fn describe_failure(&self) -> String {
        match self {
            Self::SetEntryStatus { target, .. } => {
                format!("Could not mark the student as {target}.")
            }
            Self::StartTrip => "Could not start the trip.".into(),
            Self::EndTrip => "Could not end the trip.".into(),
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetEntryStatus {
                entry_id, target, ..
            } => write!(f, "marking entry {entry_id} as {}", target.as_str()),
            Self::StartTrip => f.write_str("starting the trip"),
            Self::EndTrip => f.write_str("ending the trip"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStage {
    AwaitingAck,
    /// The server accepted the mutation; waiting for the full trip.
    AwaitingRefresh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    pub request_id: RequestId,
    pub kind: MutationKind,
    pub stage: MutationStage,
}

/// Coordinator state. Exactly one of these holds at any time, so "mutating"
/// and "stale" can never be true together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorPhase {
    Idle,
    Mutating(PendingMutation),
    StaleAfterSuccess(StaleSnapshot),
}

/// A call the coordinator wants sent, tagged with its correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub request_id: RequestId,
    pub call: ApiCall,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedTrip {
    pub trip_id: TripId,
    pub route_id: RouteId,
    pub counts: AttendanceCounts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Acknowledged; the mandatory refresh must be sent.
    Refresh(Dispatch),
    /// Not applied; the snapshot is untouched.
    Rejected(TripError),
    /// The trip was ended. The snapshot is no longer addressable.
    TripClosed(ClosedTrip),
    /// Response for a call that is no longer current.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Replaced,
    Stale(TripError),
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationCoordinator {
    snapshot: Trip,
    phase: CoordinatorPhase,
}

impl MutationCoordinator {
    #[must_use]
    pub fn new(snapshot: Trip) -> Self {
        Self {
            snapshot,
            phase: CoordinatorPhase::Idle,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> &Trip {
        &self.snapshot
    }

    #[must_use]
    pub fn phase(&self) -> &CoordinatorPhase {
        &self.phase
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self.phase, CoordinatorPhase::Idle)
    }

    /// A mutation or its refresh is outstanding. Stale retries don't count.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        matches!(self.phase, CoordinatorPhase::Mutating(_))
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        match &self.phase {
            CoordinatorPhase::Idle => false,
            CoordinatorPhase::Mutating(_) => true,
            CoordinatorPhase::StaleAfterSuccess(stale) => stale.is_retrying(),
        }
    }

    #[must_use]
    pub fn stale(&self) -> Option<&StaleSnapshot> {
        match &self.phase {
            CoordinatorPhase::StaleAfterSuccess(stale) => Some(stale),
            _ => None,
        }
    }

    pub fn request_entry_transition(
        &mut self,
        entry_id: &EntryId,
        student_id: &StudentId,
        target: EntryStatus,
    ) -> Result<Dispatch, TripError> {
        self.ensure_writable()?;

        let entry = self
            .snapshot
            .entry(entry_id)
            .filter(|e| &e.student_id == student_id)
            .ok_or_else(|| TripError::UnknownEntry {
                entry_id: entry_id.clone(),
                student_id: student_id.clone(),
            })?;

        transition::entry_action_for(entry.status, target)?;

        let call = ApiCall::SetEntryStatus {
            trip_id: self.snapshot.id.clone(),
            student_id: student_id.clone(),
            status: target,
        };
        let kind = MutationKind::SetEntryStatus {
            entry_id: entry_id.clone(),
            student_id: student_id.clone(),
            target,
        };
        Ok(self.begin(kind, call))
    }

    pub fn request_trip_start(&mut self) -> Result<Dispatch, TripError> {
        self.request_trip_action(TripAction::Start)
    }

    pub fn request_trip_end(&mut self) -> Result<Dispatch, TripError> {
        self.request_trip_action(TripAction::End)
    }

    fn request_trip_action(&mut self, action: TripAction) -> Result<Dispatch, TripError> {
        self.ensure_writable()?;
        transition::next_trip_status(self.snapshot.status, action)?;

        let trip_id = self.snapshot.id.clone();
        let (kind, call) = match action {
            TripAction::Start => (MutationKind::StartTrip, ApiCall::StartTrip { trip_id }),
            TripAction::End => (MutationKind::EndTrip, ApiCall::EndTrip { trip_id }),
        };
        Ok(self.begin(kind, call))
    }

    fn ensure_writable(&self) -> Result<(), TripError> {
        match &self.phase {
            CoordinatorPhase::Idle => {}
            CoordinatorPhase::Mutating(pending) => {
                debug!(
                    request_id = %pending.request_id,
                    in_flight = pending.kind.name(),
                    "refusing request while another is in flight"
                );
                return Err(TripError::Busy);
            }
            CoordinatorPhase::StaleAfterSuccess(_) => return Err(TripError::Stale),
        }

        if !self.snapshot.accepts_writes() {
            return Err(TripError::TripClosed {
                trip_id: self.snapshot.id.clone(),
            });
        }
        Ok(())
    }

    fn begin(&mut self, kind: MutationKind, call: ApiCall) -> Dispatch {
        let request_id = RequestId::generate();
        debug!(
            %request_id,
            trip_id = %self.snapshot.id,
            mutation = kind.name(),
            "mutation started"
        );
        self.phase = CoordinatorPhase::Mutating(PendingMutation {
            request_id,
            kind,
            stage: MutationStage::AwaitingAck,
        });
        Dispatch { request_id, call }
    }

    pub fn on_mutation_result(
        &mut self,
        request_id: &RequestId,
        result: Result<(), ApiError>,
    ) -> MutationOutcome {
        let pending = match &mut self.phase {
            CoordinatorPhase::Mutating(pending)
                if &pending.request_id == request_id
                    && pending.stage == MutationStage::AwaitingAck =>
            {
                pending
            }
            _ => {
                warn!(%request_id, "ignoring mutation result for a call that is not current");
                return MutationOutcome::Ignored;
            }
        };

        match result {
            Ok(()) if pending.kind == MutationKind::EndTrip => {
                self.phase = CoordinatorPhase::Idle;
                debug!(%request_id, trip_id = %self.snapshot.id, "trip ended");
                MutationOutcome::TripClosed(ClosedTrip {
                    trip_id: self.snapshot.id.clone(),
                    route_id: self.snapshot.route_id.clone(),
                    counts: self.snapshot.counts(),
                })
            }
            Ok(()) => {
                pending.stage = MutationStage::AwaitingRefresh;
                MutationOutcome::Refresh(Dispatch {
                    request_id: *request_id,
                    call: ApiCall::GetTrip {
                        trip_id: self.snapshot.id.clone(),
                    },
                })
            }
            Err(cause) => {
                let mutation = pending.kind.clone();
                self.phase = CoordinatorPhase::Idle;
                MutationOutcome::Rejected(TripError::MutationRejected { mutation, cause })
            }
        }
    }

    pub fn on_refresh_result(
        &mut self,
        request_id: &RequestId,
        result: Result<Trip, ApiError>,
    ) -> RefreshOutcome {
        let current = match &self.phase {
            CoordinatorPhase::Mutating(pending) => {
                &pending.request_id == request_id
                    && pending.stage == MutationStage::AwaitingRefresh
            }
            CoordinatorPhase::StaleAfterSuccess(stale) => stale.is_retry(request_id),
            CoordinatorPhase::Idle => false,
        };
        if !current {
            warn!(%request_id, "ignoring refresh for a call that is not current");
            return RefreshOutcome::Ignored;
        }

        let result = result.and_then(|trip| {
            if trip.id == self.snapshot.id {
                Ok(trip)
            } else {
                Err(ApiError::InvalidResponse {
                    reason: format!("expected trip {}, got {}", self.snapshot.id, trip.id),
                })
            }
        });

        match result {
            Ok(trip) => {
                self.snapshot = trip;
                self.phase = CoordinatorPhase::Idle;
                RefreshOutcome::Replaced
            }
            Err(cause) => {
                warn!(%request_id, trip_id = %self.snapshot.id, error = %cause, "refresh after mutation failed");
                let phase = std::mem::replace(&mut self.phase, CoordinatorPhase::Idle);
                let stale = match phase {
                    CoordinatorPhase::Mutating(pending) => {
                        StaleSnapshot::new(pending.kind, cause.clone())
                    }
                    CoordinatorPhase::StaleAfterSuccess(mut stale) => {
                        stale.retry_failed(cause.clone());
                        stale
                    }
                    CoordinatorPhase::Idle => return RefreshOutcome::Ignored,
                };
                self.phase = CoordinatorPhase::StaleAfterSuccess(stale);
                RefreshOutcome::Stale(TripError::RefreshFailed { cause })
            }
        }
    }

    /// Re-issues only the refresh. `None` when there is nothing to retry or
    /// a retry is already outstanding.
    pub fn retry_refresh(&mut self) -> Option<Dispatch> {
        let CoordinatorPhase::StaleAfterSuccess(stale) = &mut self.phase else {
            return None;
        };
        let request_id = stale.begin_retry()?;
        Some(Dispatch {
            request_id,
            call: ApiCall::GetTrip {
                trip_id: self.snapshot.id.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trip::{Entry, TripStatus};

    fn entry(id: &str, status: EntryStatus) -> Entry {
        Entry {
            id: EntryId::new(id),
            student_id: StudentId::new(format!("s-{id}")),
            student_name: "Student".into(),
            photo_url: None,
            status,
            check_in_at: None,
            check_out_at: None,
        }
    }

    fn trip(status: TripStatus, entries: Vec<Entry>) -> Trip {
        Trip {
            id: TripId::new("t-1"),
            route_id: RouteId::new("r-1"),
            service_date: "2026-10-18".into(),
            status,
            entries,
        }
    }

    fn board_first(coordinator: &mut MutationCoordinator) -> Result<Dispatch, TripError> {
        coordinator.request_entry_transition(
            &EntryId::new("e1"),
            &StudentId::new("s-e1"),
            EntryStatus::Boarded,
        )
    }

    #[test]
    fn entry_request_produces_set_status_call() {
        let mut c = MutationCoordinator::new(trip(
            TripStatus::InProgress,
            vec![entry("e1", EntryStatus::Waiting)],
        ));
        let dispatch = board_first(&mut c).unwrap();
        assert_eq!(
            dispatch.call,
            ApiCall::SetEntryStatus {
                trip_id: TripId::new("t-1"),
                student_id: StudentId::new("s-e1"),
                status: EntryStatus::Boarded,
            }
        );
        assert!(c.is_in_flight());
    }

    #[test]
    fn second_request_while_in_flight_is_busy() {
        let mut c = MutationCoordinator::new(trip(
            TripStatus::InProgress,
            vec![entry("e1", EntryStatus::Waiting)],
        ));
        board_first(&mut c).unwrap();
        assert_eq!(board_first(&mut c), Err(TripError::Busy));
        assert_eq!(c.request_trip_end(), Err(TripError::Busy));
    }

    #[test]
    fn illegal_target_fails_before_any_call() {
        let mut c = MutationCoordinator::new(trip(
            TripStatus::InProgress,
            vec![entry("e1", EntryStatus::Boarded)],
        ));
        let err = c
            .request_entry_transition(&EntryId::new("e1"), &StudentId::new("s-e1"), EntryStatus::Absent)
            .unwrap_err();
        assert!(matches!(err, TripError::IllegalTransition(_)));
        assert!(c.is_idle());
    }

    #[test]
    fn mismatched_student_is_unknown() {
        let mut c = MutationCoordinator::new(trip(
            TripStatus::InProgress,
            vec![entry("e1", EntryStatus::Waiting)],
        ));
        let err = c
            .request_entry_transition(&EntryId::new("e1"), &StudentId::new("s-other"), EntryStatus::Boarded)
            .unwrap_err();
        assert!(matches!(err, TripError::UnknownEntry { .. }));
    }

    #[test]
    fn ack_asks_for_refresh_without_patching() {
        let mut c = MutationCoordinator::new(trip(
            TripStatus::InProgress,
            vec![entry("e1", EntryStatus::Waiting)],
        ));
        let dispatch = board_first(&mut c).unwrap();

        let outcome = c.on_mutation_result(&dispatch.request_id, Ok(()));
        let MutationOutcome::Refresh(refresh) = outcome else {
            panic!("expected refresh, got {outcome:?}");
        };
        assert_eq!(refresh.call, ApiCall::GetTrip { trip_id: TripId::new("t-1") });
        assert_eq!(c.snapshot().entries[0].status, EntryStatus::Waiting);
        assert_eq!(board_first(&mut c), Err(TripError::Busy));
    }

    #[test]
    fn refresh_replaces_the_whole_snapshot() {
        let mut c = MutationCoordinator::new(trip(
            TripStatus::InProgress,
            vec![entry("e1", EntryStatus::Waiting)],
        ));
        let dispatch = board_first(&mut c).unwrap();
        c.on_mutation_result(&dispatch.request_id, Ok(()));

        let mut server = trip(
            TripStatus::InProgress,
            vec![entry("e1", EntryStatus::Boarded), entry("e2", EntryStatus::Waiting)],
        );
        server.entries[0].check_in_at = Some(crate::trip::UnixTimeMs(42));

        assert_eq!(
            c.on_refresh_result(&dispatch.request_id, Ok(server.clone())),
            RefreshOutcome::Replaced
        );
        assert_eq!(c.snapshot(), &server);
        assert!(c.is_idle());
    }

    #[test]
    fn rejection_leaves_snapshot_and_unlocks() {
        let before = trip(TripStatus::InProgress, vec![entry("e1", EntryStatus::Waiting)]);
        let mut c = MutationCoordinator::new(before.clone());
        let dispatch = board_first(&mut c).unwrap();

        let outcome = c.on_mutation_result(
            &dispatch.request_id,
            Err(ApiError::Rejected {
                status: 409,
                message: "conflict".into(),
            }),
        );
        assert!(matches!(
            outcome,
            MutationOutcome::Rejected(TripError::MutationRejected { .. })
        ));
        assert_eq!(c.snapshot(), &before);
        assert!(c.is_idle());
    }

    #[test]
    fn failed_refresh_goes_stale_and_blocks_writes() {
        let before = trip(TripStatus::InProgress, vec![entry("e1", EntryStatus::Waiting)]);
        let mut c = MutationCoordinator::new(before.clone());
        let dispatch = board_first(&mut c).unwrap();
        c.on_mutation_result(&dispatch.request_id, Ok(()));

        let outcome = c.on_refresh_result(
            &dispatch.request_id,
            Err(ApiError::Network {
                message: "offline".into(),
            }),
        );
        assert!(matches!(
            outcome,
            RefreshOutcome::Stale(TripError::RefreshFailed { .. })
        ));
        assert_eq!(c.snapshot(), &before);
        assert!(c.stale().is_some());
        assert_eq!(board_first(&mut c), Err(TripError::Stale));
    }

    #[test]
    fn retry_reissues_only_the_fetch() {
        let mut c = MutationCoordinator::new(trip(
            TripStatus::InProgress,
            vec![entry("e1", EntryStatus::Waiting)],
        ));
        let dispatch = board_first(&mut c).unwrap();
        c.on_mutation_result(&dispatch.request_id, Ok(()));
        c.on_refresh_result(&dispatch.request_id, Err(ApiError::Timeout { timeout_ms: 1 }));

        let retry = c.retry_refresh().unwrap();
        assert_eq!(retry.call, ApiCall::GetTrip { trip_id: TripId::new("t-1") });
        assert_ne!(retry.request_id, dispatch.request_id);
        assert!(c.retry_refresh().is_none(), "retry already outstanding");

        let server = trip(TripStatus::InProgress, vec![entry("e1", EntryStatus::Boarded)]);
        assert_eq!(
            c.on_refresh_result(&retry.request_id, Ok(server.clone())),
            RefreshOutcome::Replaced
        );
        assert_eq!(c.snapshot(), &server);
        assert!(c.is_idle());
    }

    #[test]
    fn failed_retry_stays_stale() {
        let mut c = MutationCoordinator::new(trip(TripStatus::Scheduled, vec![]));
        let dispatch = c.request_trip_start().unwrap();
        c.on_mutation_result(&dispatch.request_id, Ok(()));
        c.on_refresh_result(&dispatch.request_id, Err(ApiError::Timeout { timeout_ms: 1 }));

        let retry = c.retry_refresh().unwrap();
        let outcome = c.on_refresh_result(
            &retry.request_id,
            Err(ApiError::Network {
                message: "still offline".into(),
            }),
        );
        assert!(matches!(outcome, RefreshOutcome::Stale(_)));
        let stale = c.stale().unwrap();
        assert!(!stale.is_retrying());
        assert_eq!(stale.attempts(), 1);
        assert!(c.retry_refresh().is_some());
    }

    #[test]
    fn late_responses_are_ignored() {
        let mut c = MutationCoordinator::new(trip(
            TripStatus::InProgress,
            vec![entry("e1", EntryStatus::Waiting)],
        ));
        let stray = RequestId::generate();
        assert_eq!(c.on_mutation_result(&stray, Ok(())), MutationOutcome::Ignored);

        let dispatch = board_first(&mut c).unwrap();
        assert_eq!(
            c.on_refresh_result(&dispatch.request_id, Ok(c.snapshot().clone())),
            RefreshOutcome::Ignored,
            "refresh before ack is not current"
        );
    }

    #[test]
    fn refresh_of_another_trip_is_not_applied() {
        let mut c = MutationCoordinator::new(trip(TripStatus::Scheduled, vec![]));
        let dispatch = c.request_trip_start().unwrap();
        c.on_mutation_result(&dispatch.request_id, Ok(()));

        let mut other = trip(TripStatus::InProgress, vec![]);
        other.id = TripId::new("t-2");
        assert!(matches!(
            c.on_refresh_result(&dispatch.request_id, Ok(other)),
            RefreshOutcome::Stale(TripError::RefreshFailed {
                cause: ApiError::InvalidResponse { .. }
            })
        ));
        assert_eq!(c.snapshot().id, TripId::new("t-1"));
    }

    #[test]
    fn trip_lifecycle_follows_rules() {
        let mut c = MutationCoordinator::new(trip(TripStatus::Scheduled, vec![]));
        assert!(matches!(
            c.request_trip_end(),
            Err(TripError::IllegalTransition(_))
        ));

        let start = c.request_trip_start().unwrap();
        assert_eq!(start.call, ApiCall::StartTrip { trip_id: TripId::new("t-1") });
        c.on_mutation_result(&start.request_id, Ok(()));
        c.on_refresh_result(&start.request_id, Ok(trip(TripStatus::InProgress, vec![])));
        assert_eq!(c.snapshot().status, TripStatus::InProgress);

        let end = c.request_trip_end().unwrap();
        let outcome = c.on_mutation_result(&end.request_id, Ok(()));
        let MutationOutcome::TripClosed(closed) = outcome else {
            panic!("expected trip closed, got {outcome:?}");
        };
        assert_eq!(closed.trip_id, TripId::new("t-1"));
        assert!(c.is_idle());
    }

    #[test]
    fn completed_trip_refuses_writes() {
        let mut c = MutationCoordinator::new(trip(
            TripStatus::Completed,
            vec![entry("e1", EntryStatus::Waiting)],
        ));
        assert!(matches!(board_first(&mut c), Err(TripError::TripClosed { .. })));
        assert!(matches!(c.request_trip_start(), Err(TripError::TripClosed { .. })));
    }
}
