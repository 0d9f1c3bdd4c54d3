//! Pure lifecycle rules for trips and their entries.
//!
//! Nothing here touches the network or the model; the coordinator and the
//! view both call into these functions so that a control is only offered
//! when the matching request would be accepted.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::trip::{EntryStatus, TripStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryAction {
    /// The single primary control on a row; its target depends on the
    /// current status.
    Advance,
    MarkAbsent,
}

impl EntryAction {
    pub const ALL: [Self; 2] = [Self::Advance, Self::MarkAbsent];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::MarkAbsent => "mark_absent",
        }
    }
}

impl fmt::Display for EntryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripAction {
    Start,
    End,
}

impl TripAction {
    pub const ALL: [Self; 2] = [Self::Start, Self::End];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
        }
    }
}

impl fmt::Display for TripAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TransitionError {
    #[error("Cannot {action} an entry that is {from}")]
    IllegalEntryAction { from: EntryStatus, action: EntryAction },
    #[error("Invalid entry transition from {from} to {to}")]
    IllegalEntryTarget { from: EntryStatus, to: EntryStatus },
    #[error("Cannot {action} a trip that is {from}")]
    IllegalTripAction { from: TripStatus, action: TripAction },
}

/// Successor of `current` under the primary control.
#[must_use]
pub const fn advance_target(current: EntryStatus) -> EntryStatus {
    match current {
        EntryStatus::Waiting => EntryStatus::Boarded,
        EntryStatus::Boarded => EntryStatus::DroppedOff,
        EntryStatus::DroppedOff | EntryStatus::Absent => EntryStatus::Waiting,
    }
}

pub fn next_entry_status(
    current: EntryStatus,
    action: EntryAction,
) -> Result<EntryStatus, TransitionError> {
    match (current, action) {
        (_, EntryAction::Advance) => Ok(advance_target(current)),
        (EntryStatus::Waiting, EntryAction::MarkAbsent) => Ok(EntryStatus::Absent),
        (from, action) => Err(TransitionError::IllegalEntryAction { from, action }),
    }
}

/// Finds the action that moves `current` to `target`, if any.
pub fn entry_action_for(
    current: EntryStatus,
    target: EntryStatus,
) -> Result<EntryAction, TransitionError> {
    EntryAction::ALL
        .into_iter()
        .find(|action| next_entry_status(current, *action) == Ok(target))
        .ok_or(TransitionError::IllegalEntryTarget {
            from: current,
            to: target,
        })
}

#[must_use]
pub fn available_entry_actions(current: EntryStatus) -> Vec<EntryAction> {
    EntryAction::ALL
        .into_iter()
        .filter(|action| next_entry_status(current, *action).is_ok())
        .collect()
}

pub fn next_trip_status(
    current: TripStatus,
    action: TripAction,
) -> Result<TripStatus, TransitionError> {
    match (current, action) {
        (TripStatus::Scheduled, TripAction::Start) => Ok(TripStatus::InProgress),
        (TripStatus::InProgress, TripAction::End) => Ok(TripStatus::Completed),
        (from, action) => Err(TransitionError::IllegalTripAction { from, action }),
    }
}

/// The one trip-level control that applies to `current`, if any.
#[must_use]
pub fn available_trip_action(current: TripStatus) -> Option<TripAction> {
    TripAction::ALL
        .into_iter()
        .find(|action| next_trip_status(current, *action).is_ok())
}
