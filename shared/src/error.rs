use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::capabilities::ApiError;
use crate::coordinator::MutationKind;
use crate::transition::TransitionError;
use crate::trip::{EntryId, RouteId, StudentId, TripId};

/// What an initial (pre-mutation) load was fetching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadTarget {
    Routes,
    ActiveTrip { route_id: RouteId },
}

impl fmt::Display for LoadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Routes => f.write_str("route list"),
            Self::ActiveTrip { route_id } => write!(f, "active trip for route {route_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TripError {
    #[error(transparent)]
    IllegalTransition(#[from] TransitionError),

    #[error("another request is still in flight")]
    Busy,

    #[error("trip state is unconfirmed, refresh before making changes")]
    Stale,

    #[error("entry {entry_id} for student {student_id} is not part of this trip")]
    UnknownEntry {
        entry_id: EntryId,
        student_id: StudentId,
    },

    #[error("entry {entry_id} is not part of this trip")]
    EntryNotFound { entry_id: EntryId },

    #[error("trip {trip_id} is completed and no longer accepts changes")]
    TripClosed { trip_id: TripId },

    #[error("{mutation} was not applied: {cause}")]
    MutationRejected { mutation: MutationKind, cause: ApiError },

    #[error("could not refresh the trip after a successful change: {cause}")]
    RefreshFailed { cause: ApiError },

    #[error("could not load {target}: {cause}")]
    InitialLoadFailed { target: LoadTarget, cause: ApiError },
}

impl TripError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::IllegalTransition(_) => "ILLEGAL_TRANSITION",
            Self::Busy => "BUSY",
            Self::Stale => "STALE_SNAPSHOT",
            Self::UnknownEntry { .. } => "UNKNOWN_ENTRY",
            Self::EntryNotFound { .. } => "ENTRY_NOT_FOUND",
            Self::TripClosed { .. } => "TRIP_CLOSED",
            Self::MutationRejected { .. } => "MUTATION_REJECTED",
            Self::RefreshFailed { .. } => "REFRESH_FAILED",
            Self::InitialLoadFailed { .. } => "INITIAL_LOAD_FAILED",
        }
    }

    /// Errors that are only ever prevented locally. The matching control is
    /// either not offered or disabled, so the operator never sees them.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(
            self,
            Self::IllegalTransition(_)
                | Self::Busy
                | Self::Stale
                | Self::UnknownEntry { .. }
                | Self::EntryNotFound { .. }
                | Self::TripClosed { .. }
        )
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::MutationRejected { .. } | Self::RefreshFailed { .. } | Self::InitialLoadFailed { .. }
        )
    }

    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::MutationRejected { .. } => "Change not saved",
            Self::RefreshFailed { .. } => "Showing last known state",
            Self::InitialLoadFailed {
                target: LoadTarget::Routes,
                ..
            } => "Could not load routes",
            Self::InitialLoadFailed { .. } => "Could not open trip",
            _ => "Action unavailable",
        }
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self {
            Self::MutationRejected { mutation, cause } => {
                format!("{} {}", mutation.describe_failure(), cause_message(cause))
            }
            Self::RefreshFailed { cause } => {
                let reason = if cause.is_connectivity() {
                    "the server could not be reached"
                } else {
                    "the server sent an unreadable answer"
                };
                format!(
                    "Your last change was saved, but {reason} while loading the updated trip. \
                     Tap retry to load it."
                )
            }
            Self::InitialLoadFailed { cause, .. } => cause_message(cause),
            other => other.to_string(),
        }
    }
}

fn cause_message(cause: &ApiError) -> String {
    match cause {
        ApiError::Network { .. } => {
            "Unable to connect. Please check your connection and try again.".into()
        }
        ApiError::Timeout { .. } => "The request timed out. Please try again.".into(),
        ApiError::Rejected { status: 409, .. } => {
            "This conflicts with a recent change from another device. Please try again.".into()
        }
        ApiError::Rejected { status: 401 | 403, .. } => {
            "You don't have permission to perform this action.".into()
        }
        ApiError::Rejected { message, .. } => message.clone(),
        ApiError::NotFound => "The requested item could not be found.".into(),
        ApiError::InvalidResponse { .. } => {
            "The server sent an unexpected response. Please try again.".into()
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserFacingError {
    pub title: String,
    pub message: String,
    pub is_retryable: bool,
    pub error_code: String,
}

impl From<&TripError> for UserFacingError {
    fn from(e: &TripError) -> Self {
        Self {
            title: e.title().to_string(),
            message: e.user_facing_message(),
            is_retryable: e.is_retryable(),
            error_code: e.code().to_string(),
        }
    }
}
