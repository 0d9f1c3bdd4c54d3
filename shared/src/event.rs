use serde::{Deserialize, Serialize};

use crate::capabilities::ApiError;
use crate::config::CoreConfig;
use crate::coordinator::RequestId;
use crate::trip::{EntryId, Route, RouteId, Trip};

// --- Event enum: large capability responses boxed ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Configure(Box<CoreConfig>),
    AppStarted,

    // Route list
    RoutesRequested,
    RoutesLoaded {
        request_id: RequestId,
        result: Box<Result<Vec<Route>, ApiError>>,
    },
    RouteSelected {
        route_id: RouteId,
    },
    ActiveTripLoaded {
        request_id: RequestId,
        result: Box<Result<Option<Trip>, ApiError>>,
    },
    RetryOpenTrip,
    BackToRoutes,

    // Attendance gestures
    AdvanceTapped {
        entry_id: EntryId,
    },
    MarkAbsentTapped {
        entry_id: EntryId,
    },
    StartTripTapped,
    EndTripTapped,
    RetryRefreshTapped,

    // Capability responses
    MutationSettled {
        request_id: RequestId,
        result: Box<Result<(), ApiError>>,
    },
    TripRefreshed {
        request_id: RequestId,
        result: Box<Result<Trip, ApiError>>,
    },

    DismissError,
    DismissNotice,
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Configure(_) => "configure",
            Self::AppStarted => "app_started",
            Self::RoutesRequested => "routes_requested",
            Self::RoutesLoaded { .. } => "routes_loaded",
            Self::RouteSelected { .. } => "route_selected",
            Self::ActiveTripLoaded { .. } => "active_trip_loaded",
            Self::RetryOpenTrip => "retry_open_trip",
            Self::BackToRoutes => "back_to_routes",
            Self::AdvanceTapped { .. } => "advance_tapped",
            Self::MarkAbsentTapped { .. } => "mark_absent_tapped",
            Self::StartTripTapped => "start_trip_tapped",
            Self::EndTripTapped => "end_trip_tapped",
            Self::RetryRefreshTapped => "retry_refresh_tapped",
            Self::MutationSettled { .. } => "mutation_settled",
            Self::TripRefreshed { .. } => "trip_refreshed",
            Self::DismissError => "dismiss_error",
            Self::DismissNotice => "dismiss_notice",
        }
    }

    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::RoutesRequested
                | Self::RouteSelected { .. }
                | Self::RetryOpenTrip
                | Self::BackToRoutes
                | Self::AdvanceTapped { .. }
                | Self::MarkAbsentTapped { .. }
                | Self::StartTripTapped
                | Self::EndTripTapped
                | Self::RetryRefreshTapped
                | Self::DismissError
                | Self::DismissNotice
        )
    }
}
