use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::trip::{EntryStatus, RouteId, StudentId, TripId};

/// One call against the route/trip services. [`super::http`] maps each
/// variant onto an HTTP request and decodes the answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum ApiCall {
    ListRoutes,
    GetActiveTrip {
        route_id: RouteId,
    },
    GetTrip {
        trip_id: TripId,
    },
    SetEntryStatus {
        trip_id: TripId,
        student_id: StudentId,
        status: EntryStatus,
    },
    StartTrip {
        trip_id: TripId,
    },
    EndTrip {
        trip_id: TripId,
    },
}

impl ApiCall {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ListRoutes => "list_routes",
            Self::GetActiveTrip { .. } => "get_active_trip",
            Self::GetTrip { .. } => "get_trip",
            Self::SetEntryStatus { .. } => "set_entry_status",
            Self::StartTrip { .. } => "start_trip",
            Self::EndTrip { .. } => "end_trip",
        }
    }

    /// Calls that change server state. They run under the mutation timeout.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::SetEntryStatus { .. } | Self::StartTrip { .. } | Self::EndTrip { .. }
        )
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApiError {
    #[error("network unavailable: {message}")]
    Network { message: String },

    #[error("timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("not found")]
    NotFound,

    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },
}

impl ApiError {
    /// True when the server could not be reached, as opposed to the server
    /// answering with a refusal.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_calls_are_flagged() {
        let trip_id = TripId::new("t");
        assert!(!ApiCall::ListRoutes.is_mutation());
        assert!(!ApiCall::GetTrip { trip_id: trip_id.clone() }.is_mutation());
        assert!(ApiCall::StartTrip { trip_id: trip_id.clone() }.is_mutation());
        assert!(ApiCall::EndTrip { trip_id: trip_id.clone() }.is_mutation());
        assert!(ApiCall::SetEntryStatus {
            trip_id,
            student_id: StudentId::new("s"),
            status: EntryStatus::Boarded,
        }
        .is_mutation());
    }

    #[test]
    fn connectivity_errors_are_distinguished_from_refusals() {
        assert!(ApiError::Timeout { timeout_ms: 10 }.is_connectivity());
        assert!(ApiError::Network { message: "offline".into() }.is_connectivity());
        assert!(!ApiError::Rejected { status: 409, message: "conflict".into() }.is_connectivity());
        assert!(!ApiError::NotFound.is_connectivity());
    }

    #[test]
    fn call_serializes_with_tag() {
        let json = serde_json::to_value(ApiCall::SetEntryStatus {
            trip_id: TripId::new("t-1"),
            student_id: StudentId::new("s-1"),
            status: EntryStatus::Absent,
        })
        .unwrap();
        assert_eq!(json["call"], "set_entry_status");
        assert_eq!(json["status"], "absent");
    }
}
