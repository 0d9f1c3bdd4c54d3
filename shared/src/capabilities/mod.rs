pub mod http;
mod trip_api;

pub use self::http::{ApiBaseUrl, HttpCapability};
pub use self::trip_api::{ApiCall, ApiError};

pub use crux_core::render::Render;
pub use crux_http::Http;

use crate::app::App;
use crate::event::Event;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub render: Render<Event>,
    pub http: Http<Event>,
}
