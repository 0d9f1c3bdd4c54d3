use tracing::{debug, info, trace, warn};

use crate::capabilities::{http, ApiCall, ApiError, Capabilities};
use crate::config::CoreConfig;
use crate::coordinator::{Dispatch, MutationOutcome, RefreshOutcome, RequestId};
use crate::error::{LoadTarget, TripError};
use crate::event::Event;
use crate::model::{Model, Notice, Screen, TripOpening, TripSession};
use crate::sync::LoadState;
use crate::transition::EntryAction;
use crate::trip::{EntryId, Route, Trip};
use crate::view::{self, ViewModel};

#[derive(Default)]
pub struct App;

impl App {
    fn load_routes(model: &mut Model, caps: &Capabilities) {
        let Some(request_id) = model.routes.begin() else {
            debug!("route list already loading");
            return;
        };
        let call = ApiCall::ListRoutes;
        let timeout = model.config.timeout_for(&call);
        http::request(&caps.http, &model.config.api_base_url, &request_id, &call, timeout)
            .expect_json::<Vec<Route>>()
            .send(move |result| Event::RoutesLoaded {
                request_id,
                result: Box::new(http::read_json(result, timeout)),
            });
    }

    fn load_active_trip(opening: &mut TripOpening, config: &CoreConfig, caps: &Capabilities) {
        let Some(request_id) = opening.load.begin() else {
            debug!(route_id = %opening.route_id, "active trip already loading");
            return;
        };
        let call = ApiCall::GetActiveTrip {
            route_id: opening.route_id.clone(),
        };
        let timeout = config.timeout_for(&call);
        http::request(&caps.http, &config.api_base_url, &request_id, &call, timeout)
            .expect_json::<Trip>()
            .send(move |result| Event::ActiveTripLoaded {
                request_id,
                result: Box::new(http::read_active_trip(result, timeout)),
            });
    }

    fn send_mutation(model: &Model, caps: &Capabilities, dispatch: Dispatch) {
        let Dispatch { request_id, call } = dispatch;
        let timeout = model.config.timeout_for(&call);
        debug!(%request_id, call = call.name(), "sending mutation");
        http::request(&caps.http, &model.config.api_base_url, &request_id, &call, timeout).send(
            move |result| Event::MutationSettled {
                request_id,
                result: Box::new(http::read_ack(result, timeout)),
            },
        );
    }

    fn send_refresh(model: &Model, caps: &Capabilities, dispatch: Dispatch) {
        let Dispatch { request_id, call } = dispatch;
        let timeout = model.config.timeout_for(&call);
        debug!(%request_id, "refreshing trip");
        http::request(&caps.http, &model.config.api_base_url, &request_id, &call, timeout)
            .expect_json::<Trip>()
            .send(move |result| Event::TripRefreshed {
                request_id,
                result: Box::new(http::read_json(result, timeout)),
            });
    }

    /// Runs a coordinator request against the open trip. Local refusals are
    /// logged and produce no effect, since the view never offers them.
    fn request_mutation<F>(model: &mut Model, caps: &Capabilities, request: F)
    where
        F: FnOnce(&mut TripSession, &CoreConfig) -> Result<Dispatch, TripError>,
    {
        let config = model.config.clone();
        let Some(session) = model.session_mut() else {
            debug!("mutation requested without an open trip");
            return;
        };

        match request(session, &config) {
            Ok(dispatch) => {
                session.rejection = None;
                Self::send_mutation(model, caps, dispatch);
                caps.render.render();
            }
            Err(e) => {
                debug!(code = e.code(), local = e.is_local(), error = %e, "mutation refused");
            }
        }
    }

    fn entry_gesture(
        model: &mut Model,
        caps: &Capabilities,
        entry_id: &EntryId,
        action: EntryAction,
    ) {
        Self::request_mutation(model, caps, |session, config| {
            let trip = session.coordinator.snapshot();
            let (entry_id, student_id, target) =
                view::resolve_entry_gesture(trip, config, entry_id, action)?;
            session
                .coordinator
                .request_entry_transition(&entry_id, &student_id, target)
        });
    }

    fn on_mutation_settled(
        model: &mut Model,
        caps: &Capabilities,
        request_id: &RequestId,
        result: Result<(), ApiError>,
    ) {
        let Some(session) = model.session_mut() else {
            debug!(%request_id, "mutation settled after the trip was closed");
            return;
        };

        match session.coordinator.on_mutation_result(request_id, result) {
            MutationOutcome::Refresh(dispatch) => Self::send_refresh(model, caps, dispatch),
            MutationOutcome::Rejected(err) => {
                warn!(%request_id, code = err.code(), error = %err, "mutation rejected");
                session.rejection = Some(err);
            }
            MutationOutcome::TripClosed(closed) => {
                info!(
                    trip_id = %closed.trip_id,
                    dropped_off = closed.counts.dropped_off,
                    absent = closed.counts.absent,
                    "trip completed"
                );
                let route_name = session.route.as_ref().map(|r| r.name.clone());
                model.screen = Screen::Routes;
                model.notice = Some(Notice::TripClosed { route_name, closed });
            }
            MutationOutcome::Ignored => return,
        }
        caps.render.render();
    }

    fn on_trip_refreshed(
        model: &mut Model,
        caps: &Capabilities,
        request_id: &RequestId,
        result: Result<Trip, ApiError>,
    ) {
        let Some(session) = model.session_mut() else {
            debug!(%request_id, "refresh arrived after the trip was closed");
            return;
        };

        match session.coordinator.on_refresh_result(request_id, result) {
            RefreshOutcome::Replaced => {
                let trip = session.coordinator.snapshot();
                debug!(trip_id = %trip.id, status = trip.status.as_str(), "trip snapshot replaced");
            }
            RefreshOutcome::Stale(err) => {
                warn!(%request_id, error = %err, "trip is stale until refreshed");
            }
            RefreshOutcome::Ignored => return,
        }
        caps.render.render();
    }

    fn open_trip(
        model: &mut Model,
        caps: &Capabilities,
        request_id: &RequestId,
        result: Result<Option<Trip>, ApiError>,
    ) {
        let Screen::OpeningTrip(opening) = &mut model.screen else {
            debug!(%request_id, "active trip arrived after leaving the route");
            return;
        };
        let target = LoadTarget::ActiveTrip {
            route_id: opening.route_id.clone(),
        };
        if !opening.load.settle(request_id, result, target) {
            return;
        }

        let route_id = opening.route_id.clone();
        let found = match std::mem::take(&mut opening.load) {
            LoadState::Ready(found) => found,
            other => {
                // Failed. The opening screen shows the error with a retry.
                opening.load = other;
                caps.render.render();
                return;
            }
        };

        let route = model.route(&route_id).cloned();
        match found {
            Some(trip) if trip.status.is_terminal() => {
                info!(trip_id = %trip.id, %route_id, "route's trip is already completed");
                model.screen = Screen::Routes;
                model.notice = Some(Notice::TripAlreadyCompleted {
                    route_id,
                    route_name: route.map(|r| r.name),
                    counts: trip.counts(),
                });
            }
            Some(trip) => {
                info!(trip_id = %trip.id, %route_id, status = trip.status.as_str(), "trip opened");
                model.screen = Screen::Trip(Box::new(TripSession::new(route, trip)));
            }
            None => {
                info!(%route_id, "route has no active trip");
                model.screen = Screen::Routes;
                model.notice = Some(Notice::NoActiveTrip {
                    route_id,
                    route_name: route.map(|r| r.name),
                });
            }
        }
        caps.render.render();
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        let event_name = event.name();
        if event.is_user_initiated() {
            debug!(event = event_name, "user action");
        } else {
            trace!(event = event_name, "event");
        }

        match event {
            Event::Configure(config) => match config.validate() {
                Ok(()) => {
                    debug!(?config, "configuration applied");
                    model.config = *config;
                }
                Err(e) => warn!(error = %e, "configuration rejected, keeping previous"),
            },

            Event::AppStarted | Event::RoutesRequested => {
                Self::load_routes(model, caps);
                caps.render.render();
            }

            Event::RoutesLoaded { request_id, result } => {
                if model.routes.settle(&request_id, *result, LoadTarget::Routes) {
                    caps.render.render();
                }
            }

            Event::RouteSelected { route_id } => {
                if !matches!(model.screen, Screen::Routes) {
                    debug!(%route_id, "route selected while another screen is open");
                    return;
                }
                model.notice = None;
                let mut opening = TripOpening {
                    route_id,
                    load: LoadState::NotLoaded,
                };
                Self::load_active_trip(&mut opening, &model.config, caps);
                model.screen = Screen::OpeningTrip(opening);
                caps.render.render();
            }

            Event::RetryOpenTrip => {
                let config = model.config.clone();
                match &mut model.screen {
                    Screen::OpeningTrip(opening) if opening.load.failure().is_some() => {
                        Self::load_active_trip(opening, &config, caps);
                        caps.render.render();
                    }
                    _ => debug!("nothing to retry"),
                }
            }

            Event::ActiveTripLoaded { request_id, result } => {
                Self::open_trip(model, caps, &request_id, *result);
            }

            Event::BackToRoutes => {
                if model.is_mutating() {
                    debug!("cannot leave the trip while a change is in flight");
                    return;
                }
                model.screen = Screen::Routes;
                if model.routes.ready().is_none() {
                    Self::load_routes(model, caps);
                }
                caps.render.render();
            }

            Event::AdvanceTapped { entry_id } => {
                Self::entry_gesture(model, caps, &entry_id, EntryAction::Advance);
            }

            Event::MarkAbsentTapped { entry_id } => {
                Self::entry_gesture(model, caps, &entry_id, EntryAction::MarkAbsent);
            }

            Event::StartTripTapped => {
                Self::request_mutation(model, caps, |session, _| {
                    session.coordinator.request_trip_start()
                });
            }

            Event::EndTripTapped => {
                Self::request_mutation(model, caps, |session, _| {
                    session.coordinator.request_trip_end()
                });
            }

            Event::RetryRefreshTapped => {
                let Some(session) = model.session_mut() else {
                    return;
                };
                match session.coordinator.retry_refresh() {
                    Some(dispatch) => {
                        Self::send_refresh(model, caps, dispatch);
                        caps.render.render();
                    }
                    None => debug!("no refresh to retry"),
                }
            }

            Event::MutationSettled { request_id, result } => {
                Self::on_mutation_settled(model, caps, &request_id, *result);
            }

            Event::TripRefreshed { request_id, result } => {
                Self::on_trip_refreshed(model, caps, &request_id, *result);
            }

            Event::DismissError => {
                if let Some(session) = model.session_mut() {
                    session.rejection = None;
                    caps.render.render();
                }
            }

            Event::DismissNotice => {
                if model.notice.take().is_some() {
                    caps.render.render();
                }
            }
        }
    }

    fn view(&self, model: &Model) -> ViewModel {
        view::project(model)
    }
}
