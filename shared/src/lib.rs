//! Shared core for the bus attendance app.
//!
//! The shell renders [`ViewModel`] and performs [`Effect`]s; everything that
//! decides what a trip looks like lives here.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod capabilities;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod model;
pub mod sync;
pub mod transition;
pub mod trip;
pub mod view;

use std::time::Duration;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use config::{ConfigError, CoreConfig};
pub use coordinator::{CoordinatorPhase, MutationCoordinator, MutationKind, RequestId};
pub use crux_core::App as CruxApp;
pub use error::{TripError, UserFacingError};
pub use event::Event;
pub use model::Model;
pub use view::ViewModel;

pub const MUTATION_TIMEOUT: Duration = Duration::from_secs(15);
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
pub const MIN_CALL_TIMEOUT: Duration = Duration::from_secs(1);
pub const MAX_CALL_TIMEOUT: Duration = Duration::from_secs(120);
