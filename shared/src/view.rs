//! Presentation adapter: projects the model into what the shell draws and
//! turns row gestures into coordinator requests.
//!
//! Controls are computed from the snapshot through the transition rules, so a
//! control is only offered when its transition is legal. While any call is in
//! flight, or the snapshot is stale, every control is rendered disabled.

use serde::{Deserialize, Serialize};

use crate::config::CoreConfig;
use crate::coordinator::CoordinatorPhase;
use crate::error::{TripError, UserFacingError};
use crate::model::{Model, Notice, Screen, TripOpening, TripSession};
use crate::sync::LoadState;
use crate::transition::{self, EntryAction, TransitionError, TripAction};
use crate::trip::{
    AttendanceCounts, Entry, EntryId, EntryStatus, Route, StudentId, Trip, TripStatus, UnixTimeMs,
};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewModel {
    pub screen: ScreenView,
    pub notice: Option<String>,
    pub is_global_loading: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScreenView {
    Routes(RouteListView),
    OpeningTrip(OpeningTripView),
    Trip(Box<TripView>),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteListView {
    pub is_loading: bool,
    pub routes: Vec<RouteRow>,
    pub error: Option<ErrorView>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteRow {
    pub route_id: String,
    pub name: String,
    pub vehicle_plate: String,
    pub scheduled_time: String,
    pub driver_name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpeningTripView {
    pub route_id: String,
    pub route_name: Option<String>,
    pub is_loading: bool,
    pub error: Option<ErrorView>,
}

/// A terminal error with the event the shell should send to retry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorView {
    pub error: UserFacingError,
    pub retry_event: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TripView {
    pub trip_id: String,
    pub route_name: Option<String>,
    pub service_date: String,
    pub status: TripStatus,
    pub status_label: String,
    /// Global lock. False while anything is in flight or the trip is stale.
    pub controls_enabled: bool,
    pub is_busy: bool,
    pub can_leave: bool,
    pub trip_control: Option<TripControl>,
    pub stale: Option<StaleBanner>,
    pub rejection: Option<UserFacingError>,
    pub counts: AttendanceCounts,
    pub entries: Vec<EntryRow>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TripControl {
    pub action: TripAction,
    pub label: String,
    pub enabled: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StaleBanner {
    pub error: UserFacingError,
    pub is_retrying: bool,
    pub can_retry: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryRow {
    pub entry_id: String,
    pub student_id: String,
    pub student_name: String,
    pub photo_url: Option<String>,
    pub status: EntryStatus,
    pub status_label: String,
    pub check_in_at: Option<UnixTimeMs>,
    pub check_out_at: Option<UnixTimeMs>,
    pub advance: Option<EntryControl>,
    pub mark_absent: Option<EntryControl>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryControl {
    pub action: EntryAction,
    pub target: EntryStatus,
    pub label: String,
    pub enabled: bool,
}

#[must_use]
pub fn project(model: &Model) -> ViewModel {
    let screen = match &model.screen {
        Screen::Routes => ScreenView::Routes(route_list_view(&model.routes)),
        Screen::OpeningTrip(opening) => {
            ScreenView::OpeningTrip(opening_view(opening, model.route(&opening.route_id)))
        }
        Screen::Trip(session) => ScreenView::Trip(Box::new(trip_view(session, &model.config))),
    };

    ViewModel {
        screen,
        notice: model.notice.as_ref().map(notice_text),
        is_global_loading: model.routes.is_loading()
            || matches!(&model.screen, Screen::OpeningTrip(o) if o.load.is_loading()),
    }
}

fn route_list_view(routes: &LoadState<Vec<Route>>) -> RouteListView {
    RouteListView {
        is_loading: routes.is_loading(),
        routes: routes
            .ready()
            .map(|list| list.iter().map(route_row).collect())
            .unwrap_or_default(),
        error: routes.failure().map(|e| error_view(e, "routes_requested")),
    }
}

fn route_row(route: &Route) -> RouteRow {
    RouteRow {
        route_id: route.id.to_string(),
        name: route.name.clone(),
        vehicle_plate: route.vehicle_plate.clone(),
        scheduled_time: route.scheduled_time.clone(),
        driver_name: route.driver_name.clone(),
    }
}

fn opening_view(opening: &TripOpening, route: Option<&Route>) -> OpeningTripView {
    OpeningTripView {
        route_id: opening.route_id.to_string(),
        route_name: route.map(|r| r.name.clone()),
        is_loading: opening.load.is_loading(),
        error: opening.load.failure().map(|e| error_view(e, "retry_open_trip")),
    }
}

fn error_view(error: &TripError, retry_event: &str) -> ErrorView {
    ErrorView {
        error: UserFacingError::from(error),
        retry_event: error.is_retryable().then(|| retry_event.to_string()),
    }
}

fn trip_view(session: &TripSession, config: &CoreConfig) -> TripView {
    let coordinator = &session.coordinator;
    let trip = coordinator.snapshot();
    let enabled = coordinator.is_idle() && trip.accepts_writes();

    let stale = match coordinator.phase() {
        CoordinatorPhase::StaleAfterSuccess(stale) => Some(StaleBanner {
            error: UserFacingError::from(&stale.error()),
            is_retrying: stale.is_retrying(),
            can_retry: !stale.is_retrying(),
        }),
        _ => None,
    };

    let trip_control = if trip.accepts_writes() {
        transition::available_trip_action(trip.status).map(|action| TripControl {
            action,
            label: trip_action_label(action).into(),
            enabled,
        })
    } else {
        None
    };

    TripView {
        trip_id: trip.id.to_string(),
        route_name: session.route.as_ref().map(|r| r.name.clone()),
        service_date: trip.service_date.clone(),
        status: trip.status,
        status_label: trip.status.display_name().into(),
        controls_enabled: enabled,
        is_busy: coordinator.is_in_flight(),
        can_leave: !coordinator.is_mutating(),
        trip_control,
        stale,
        rejection: session.rejection.as_ref().map(UserFacingError::from),
        counts: trip.counts(),
        entries: trip
            .entries
            .iter()
            .map(|entry| entry_row(entry, trip, config, enabled))
            .collect(),
    }
}

fn entry_row(entry: &Entry, trip: &Trip, config: &CoreConfig, enabled: bool) -> EntryRow {
    let control = |action: EntryAction| -> Option<EntryControl> {
        if !trip.accepts_writes() {
            return None;
        }
        let target = offered_target(entry.status, action, config).ok()?;
        Some(EntryControl {
            action,
            target,
            label: entry_action_label(entry.status, action).into(),
            enabled,
        })
    };

    EntryRow {
        entry_id: entry.id.to_string(),
        student_id: entry.student_id.to_string(),
        student_name: entry.student_name.clone(),
        photo_url: entry.photo_url.clone(),
        status: entry.status,
        status_label: entry.status.display_name().into(),
        check_in_at: entry.check_in_at,
        check_out_at: entry.check_out_at,
        advance: control(EntryAction::Advance),
        mark_absent: control(EntryAction::MarkAbsent),
    }
}

/// Target a gesture would request, if the control for it is offered.
fn offered_target(
    current: EntryStatus,
    action: EntryAction,
    config: &CoreConfig,
) -> Result<EntryStatus, TransitionError> {
    let target = transition::next_entry_status(current, action)?;
    if target == EntryStatus::Waiting && !config.allow_revert_to_waiting {
        return Err(TransitionError::IllegalEntryAction {
            from: current,
            action,
        });
    }
    Ok(target)
}

/// Translates a row gesture into the `(entry, student, target)` triple the
/// coordinator takes.
pub fn resolve_entry_gesture(
    trip: &Trip,
    config: &CoreConfig,
    entry_id: &EntryId,
    action: EntryAction,
) -> Result<(EntryId, StudentId, EntryStatus), TripError> {
    let entry = trip.entry(entry_id).ok_or_else(|| TripError::EntryNotFound {
        entry_id: entry_id.clone(),
    })?;
    let target = offered_target(entry.status, action, config)?;
    Ok((entry.id.clone(), entry.student_id.clone(), target))
}

const fn trip_action_label(action: TripAction) -> &'static str {
    match action {
        TripAction::Start => "Start trip",
        TripAction::End => "End trip",
    }
}

const fn entry_action_label(current: EntryStatus, action: EntryAction) -> &'static str {
    match (action, current) {
        (EntryAction::MarkAbsent, _) => "Mark absent",
        (EntryAction::Advance, EntryStatus::Waiting) => "Board",
        (EntryAction::Advance, EntryStatus::Boarded) => "Drop off",
        (EntryAction::Advance, EntryStatus::DroppedOff) => "Undo drop-off",
        (EntryAction::Advance, EntryStatus::Absent) => "Undo absent",
    }
}

fn notice_text(notice: &Notice) -> String {
    match notice {
        Notice::TripClosed { route_name, closed } => {
            let counts = closed.counts;
            format!(
                "{} trip completed: {} dropped off, {} absent.",
                route_name.as_deref().unwrap_or("The"),
                counts.dropped_off,
                counts.absent
            )
        }
        Notice::NoActiveTrip { route_name, .. } => match route_name {
            Some(name) => format!("{name} has no trip scheduled today."),
            None => "This route has no trip scheduled today.".into(),
        },
        Notice::TripAlreadyCompleted {
            route_name, counts, ..
        } => format!(
            "{} trip was already completed today: {} dropped off, {} absent.",
            route_name.as_deref().unwrap_or("This route's"),
            counts.dropped_off,
            counts.absent
        ),
    }
}
