//! Load and recovery bookkeeping for the non-mutating fetches.
//!
//! Initial loads (route list, active trip) have nothing to fall back on, so a
//! failure there is terminal until the operator retries. A refresh that fails
//! after a confirmed mutation is different: the previous snapshot stays on
//! screen, marked stale, and only the fetch is retried.

use tracing::{debug, warn};

use crate::capabilities::ApiError;
use crate::coordinator::{MutationKind, RequestId};
use crate::error::{LoadTarget, TripError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState<T> {
    NotLoaded,
    Loading {
        request_id: RequestId,
    },
    Ready(T),
    Failed(TripError),
}

impl<T> Default for LoadState<T> {
    fn default() -> Self {
        Self::NotLoaded
    }
}

impl<T> LoadState<T> {
    /// Starts a load. `None` if one is already outstanding.
    pub fn begin(&mut self) -> Option<RequestId> {
        if self.is_loading() {
            return None;
        }
        let request_id = RequestId::generate();
        *self = Self::Loading { request_id };
        Some(request_id)
    }

    /// Applies a response if it belongs to the outstanding load. Returns
    /// whether anything changed.
    pub fn settle(
        &mut self,
        request_id: &RequestId,
        result: Result<T, ApiError>,
        target: LoadTarget,
    ) -> bool {
        match self {
            Self::Loading { request_id: current } if *current == *request_id => {}
            _ => {
                debug!(%request_id, %target, "ignoring response for a load that is not current");
                return false;
            }
        }

        *self = match result {
            Ok(value) => Self::Ready(value),
            Err(cause) => {
                warn!(%request_id, %target, error = %cause, "initial load failed");
                Self::Failed(TripError::InitialLoadFailed { target, cause })
            }
        };
        true
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    #[must_use]
    pub const fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn failure(&self) -> Option<&TripError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// A snapshot whose last mutation was acknowledged but whose refresh failed.
/// The displayed trip is the pre-mutation one and must not be acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleSnapshot {
    after: MutationKind,
    cause: ApiError,
    retry: Option<RequestId>,
    attempts: u32,
}

impl StaleSnapshot {
    #[must_use]
    pub fn new(after: MutationKind, cause: ApiError) -> Self {
        Self {
            after,
            cause,
            retry: None,
            attempts: 0,
        }
    }

    /// The mutation that was confirmed before the refresh failed.
    #[must_use]
    pub const fn after(&self) -> &MutationKind {
        &self.after
    }

    #[must_use]
    pub const fn cause(&self) -> &ApiError {
        &self.cause
    }

    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub const fn is_retrying(&self) -> bool {
        self.retry.is_some()
    }

    #[must_use]
    pub fn is_retry(&self, request_id: &RequestId) -> bool {
        self.retry.as_ref() == Some(request_id)
    }

    pub fn begin_retry(&mut self) -> Option<RequestId> {
        if self.retry.is_some() {
            return None;
        }
        let request_id = RequestId::generate();
        self.retry = Some(request_id);
        Some(request_id)
    }

    pub fn retry_failed(&mut self, cause: ApiError) {
        self.retry = None;
        self.attempts = self.attempts.saturating_add(1);
        self.cause = cause;
    }

    #[must_use]
    pub fn error(&self) -> TripError {
        TripError::RefreshFailed {
            cause: self.cause.clone(),
        }
    }
}
