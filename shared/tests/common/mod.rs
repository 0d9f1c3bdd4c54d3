#![allow(dead_code)]

use bus_trip_shared::capabilities::ApiCall;
use bus_trip_shared::trip::{
    Entry, EntryId, EntryStatus, Route, RouteId, StudentId, Trip, TripId, TripStatus, UnixTimeMs,
};
use bus_trip_shared::{App, Effect, Event, Model, ViewModel};
use crux_core::testing::AppTester;
use crux_core::Request;
use crux_http::protocol::{HttpRequest, HttpResponse, HttpResult};
use serde::Serialize;
use url::Url;

/// Drives the core the way a shell would: events in, effects out, HTTP
/// requests answered by the test.
pub struct Driver {
    pub app: AppTester<App, Effect>,
    pub model: Model,
}

impl Driver {
    pub fn new() -> Self {
        Self {
            app: AppTester::default(),
            model: Model::default(),
        }
    }

    pub fn send(&mut self, event: Event) -> Vec<Effect> {
        let update = self.app.update(event, &mut self.model);
        let mut effects = update.effects;
        for event in update.events {
            effects.extend(self.send(event));
        }
        effects
    }

    pub fn respond(&mut self, mut request: Request<HttpRequest>, result: HttpResult) -> Vec<Effect> {
        let update = self
            .app
            .resolve(&mut request, result)
            .expect("request should resolve");
        let mut effects = update.effects;
        for event in update.events {
            effects.extend(self.send(event));
        }
        effects
    }

    pub fn view(&self) -> ViewModel {
        self.app.view(&self.model)
    }

    /// Opens `trip` through the route list and returns with no call pending.
    pub fn open(&mut self, trip: Trip) {
        let effects = self.send(Event::AppStarted);
        let list = single_call(effects);
        self.respond(list, json(&vec![route(trip.route_id.as_str())]));

        let effects = self.send(Event::RouteSelected {
            route_id: trip.route_id.clone(),
        });
        let lookup = single_call(effects);
        let effects = self.respond(lookup, json(&trip));
        assert!(calls(effects).is_empty());
    }
}

pub fn calls(effects: Vec<Effect>) -> Vec<Request<HttpRequest>> {
    effects
        .into_iter()
        .filter_map(|effect| match effect {
            Effect::Http(request) => Some(request),
            _ => None,
        })
        .collect()
}

pub fn single_call(effects: Vec<Effect>) -> Request<HttpRequest> {
    let mut requests = calls(effects);
    assert_eq!(requests.len(), 1, "expected exactly one API call");
    requests.remove(0)
}

pub fn renders(effects: &[Effect]) -> bool {
    effects.iter().any(|e| matches!(e, Effect::Render(_)))
}

/// Reads the trip API call back out of the HTTP request the core built.
pub fn call_of(request: &Request<HttpRequest>) -> ApiCall {
    let op = &request.operation;
    let url = Url::parse(&op.url).expect("request URL parses");
    let segments: Vec<&str> = url.path_segments().expect("URL has a path").collect();

    match (op.method.as_str(), segments.as_slice()) {
        ("GET", ["api", "bus", "routes"]) => ApiCall::ListRoutes,
        ("GET", ["api", "bus", "routes", route_id, "active-trip"]) => ApiCall::GetActiveTrip {
            route_id: RouteId::new(*route_id),
        },
        ("GET", ["api", "bus", "trips", trip_id]) => ApiCall::GetTrip {
            trip_id: TripId::new(*trip_id),
        },
        ("POST", ["api", "bus", "trips", trip_id, "students", student_id, "status"]) => {
            let body: serde_json::Value =
                serde_json::from_slice(&op.body).expect("status body is JSON");
            ApiCall::SetEntryStatus {
                trip_id: TripId::new(*trip_id),
                student_id: StudentId::new(*student_id),
                status: serde_json::from_value(body["status"].clone()).expect("known status"),
            }
        }
        ("POST", ["api", "bus", "trips", trip_id, "start"]) => ApiCall::StartTrip {
            trip_id: TripId::new(*trip_id),
        },
        ("POST", ["api", "bus", "trips", trip_id, "end"]) => ApiCall::EndTrip {
            trip_id: TripId::new(*trip_id),
        },
        (method, path) => panic!("unexpected request {method} {path:?}"),
    }
}

pub fn header<'a>(request: &'a Request<HttpRequest>, name: &str) -> Option<&'a str> {
    request
        .operation
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

pub fn json(body: &impl Serialize) -> HttpResult {
    HttpResult::Ok(HttpResponse::ok().json(body).build())
}

pub fn ack() -> HttpResult {
    HttpResult::Ok(HttpResponse::status(204).build())
}

pub fn status(code: u16, body: &str) -> HttpResult {
    HttpResult::Ok(HttpResponse::status(code).body(body).build())
}

pub fn rejected(code: u16, message: &str) -> HttpResult {
    HttpResult::Ok(
        HttpResponse::status(code)
            .json(serde_json::json!({ "message": message }))
            .build(),
    )
}

pub fn offline() -> HttpResult {
    HttpResult::Err(crux_http::Error::Io("no route to host".into()))
}

pub fn timed_out() -> HttpResult {
    HttpResult::Err(crux_http::Error::Timeout)
}

pub fn route(id: &str) -> Route {
    Route {
        id: RouteId::new(id),
        name: "North Loop".into(),
        vehicle_plate: "BUS-42".into(),
        scheduled_time: "07:15".into(),
        driver_name: Some("Sam".into()),
    }
}

pub fn entry(id: &str, status: EntryStatus) -> Entry {
    Entry {
        id: EntryId::new(id),
        student_id: StudentId::new(format!("stu-{id}")),
        student_name: format!("Student {id}"),
        photo_url: None,
        status,
        check_in_at: None,
        check_out_at: None,
    }
}

pub fn trip(status: TripStatus, entries: Vec<Entry>) -> Trip {
    Trip {
        id: TripId::new("trip-1"),
        route_id: RouteId::new("route-1"),
        service_date: "2026-10-18".into(),
        status,
        entries,
    }
}

/// The server's view of `trip` after `entry_id` moved to `status`.
pub fn with_status(trip: &Trip, entry_id: &str, status: EntryStatus, at: u64) -> Trip {
    let mut next = trip.clone();
    for e in &mut next.entries {
        if e.id.as_str() == entry_id {
            e.status = status;
            match status {
                EntryStatus::Boarded => e.check_in_at = Some(UnixTimeMs(at)),
                EntryStatus::DroppedOff => e.check_out_at = Some(UnixTimeMs(at)),
                EntryStatus::Waiting | EntryStatus::Absent => {}
            }
        }
    }
    next
}
