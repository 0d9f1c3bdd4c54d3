use crate::config::CoreConfig;
use crate::coordinator::{ClosedTrip, MutationCoordinator};
use crate::error::TripError;
use crate::sync::LoadState;
use crate::trip::{AttendanceCounts, Route, RouteId, Trip};

/// The trip currently being opened from the route list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripOpening {
    pub route_id: RouteId,
    /// `Ready(None)` means the route has no trip today.
    pub load: LoadState<Option<Trip>>,
}

/// An open trip. The coordinator owns the snapshot; nothing else holds a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripSession {
    pub route: Option<Route>,
    pub coordinator: MutationCoordinator,
    /// Last refused mutation, cleared by the next request or a dismiss.
    pub rejection: Option<TripError>,
}

impl TripSession {
    #[must_use]
    pub fn new(route: Option<Route>, trip: Trip) -> Self {
        Self {
            route,
            coordinator: MutationCoordinator::new(trip),
            rejection: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Screen {
    #[default]
    Routes,
    OpeningTrip(TripOpening),
    Trip(Box<TripSession>),
}

/// One-shot message shown on the route list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    TripClosed {
        route_name: Option<String>,
        closed: ClosedTrip,
    },
    NoActiveTrip {
        route_id: RouteId,
        route_name: Option<String>,
    },
    /// The route's trip for today was already ended, possibly on another device.
    TripAlreadyCompleted {
        route_id: RouteId,
        route_name: Option<String>,
        counts: AttendanceCounts,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    pub config: CoreConfig,
    pub routes: LoadState<Vec<Route>>,
    pub screen: Screen,
    pub notice: Option<Notice>,
}

impl Model {
    #[must_use]
    pub fn route(&self, route_id: &RouteId) -> Option<&Route> {
        self.routes
            .ready()
            .and_then(|routes| routes.iter().find(|r| &r.id == route_id))
    }

    pub fn session_mut(&mut self) -> Option<&mut TripSession> {
        match &mut self.screen {
            Screen::Trip(session) => Some(&mut **session),
            _ => None,
        }
    }

    #[must_use]
    pub fn session(&self) -> Option<&TripSession> {
        match &self.screen {
            Screen::Trip(session) => Some(&**session),
            _ => None,
        }
    }

    /// True while a change or its follow-up refresh is outstanding. The
    /// operator cannot leave the trip until it settles.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        self.session().is_some_and(|s| s.coordinator.is_mutating())
    }
}
