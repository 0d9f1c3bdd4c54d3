use serde::{Deserialize, Serialize};
use std::fmt;

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(RouteId);
typed_id!(TripId);
typed_id!(EntryId);
typed_id!(StudentId);

/// Explicit timestamp unit. Always set by the server.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixTimeMs(pub u64);

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub id: RouteId,
    pub name: String,
    pub vehicle_plate: String,
    /// Display string as provided by the admin workflow, e.g. "07:15".
    pub scheduled_time: String,
    #[serde(default)]
    pub driver_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Scheduled,
    InProgress,
    Completed,
}

impl TripStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Waiting,
    Boarded,
    DroppedOff,
    Absent,
}

impl EntryStatus {
    pub const ALL: [Self; 4] = [Self::Waiting, Self::Boarded, Self::DroppedOff, Self::Absent];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Boarded => "boarded",
            Self::DroppedOff => "dropped_off",
            Self::Absent => "absent",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Waiting => "Waiting",
            Self::Boarded => "Boarded",
            Self::DroppedOff => "Dropped Off",
            Self::Absent => "Absent",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One student's attendance record within a trip.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: EntryId,
    pub student_id: StudentId,
    pub student_name: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    pub status: EntryStatus,
    #[serde(default)]
    pub check_in_at: Option<UnixTimeMs>,
    #[serde(default)]
    pub check_out_at: Option<UnixTimeMs>,
}

// Redact debug output: names and photos of students must not reach the logs.
impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("student_id", &self.student_id)
            .field("student_name", &"[REDACTED]")
            .field("photo_present", &self.photo_url.is_some())
            .field("status", &self.status)
            .field("check_in_at", &self.check_in_at)
            .field("check_out_at", &self.check_out_at)
            .finish()
    }
}

/// Per-status head count for a trip.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AttendanceCounts {
    pub waiting: usize,
    pub boarded: usize,
    pub dropped_off: usize,
    pub absent: usize,
}

impl AttendanceCounts {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.waiting + self.boarded + self.dropped_off + self.absent
    }
}

/// One dated run of a route. The entry collection is owned by value and is
/// only ever replaced as a whole.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Trip {
    pub id: TripId,
    pub route_id: RouteId,
    /// ISO date, `YYYY-MM-DD`.
    pub service_date: String,
    pub status: TripStatus,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

impl Trip {
    #[must_use]
    pub fn entry(&self, entry_id: &EntryId) -> Option<&Entry> {
        self.entries.iter().find(|e| &e.id == entry_id)
    }

    #[must_use]
    pub fn counts(&self) -> AttendanceCounts {
        self.entries
            .iter()
            .fold(AttendanceCounts::default(), |mut acc, entry| {
                match entry.status {
                    EntryStatus::Waiting => acc.waiting += 1,
                    EntryStatus::Boarded => acc.boarded += 1,
                    EntryStatus::DroppedOff => acc.dropped_off += 1,
                    EntryStatus::Absent => acc.absent += 1,
                }
                acc
            })
    }

    #[must_use]
    pub const fn accepts_writes(&self) -> bool {
        !self.status.is_terminal()
    }
}
