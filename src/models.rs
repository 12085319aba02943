use std::fmt;

use time::OffsetDateTime;

/// A temperature/humidity reading keyed by its timestamp.
///
/// Zero is the "field absent" value for both readings, so a stored
/// measurement always has at least one strictly positive reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub timestamp: OffsetDateTime,
    pub temperature: f64,
    pub humidity: f64,
}

impl Measurement {
    /// Whether this reading carries any data worth persisting.
    pub fn has_reading(&self) -> bool {
        self.temperature > 0.0 || self.humidity > 0.0
    }
}

/// Recognized event types of the monitored point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Close,
}

impl EventKind {
    /// Look up a reporter identifier in the catalog.
    ///
    /// Accepts the canonical `open`/`close` and the legacy `DO`/`DC` codes
    /// still sent by deployed reporters. Anything else is unknown.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "open" | "DO" => Some(Self::Open),
            "close" | "DC" => Some(Self::Close),
            _ => None,
        }
    }

    /// Identifier written to storage.
    pub fn code(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A discrete open/close event keyed by its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp: OffsetDateTime,
    pub kind: EventKind,
}

/// An open event paired with the next close event. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub opened_at: OffsetDateTime,
    pub closed_at: OffsetDateTime,
}

impl Session {
    pub fn duration(&self) -> time::Duration {
        self.closed_at - self.opened_at
    }
}

/// One row of the ordered scan over both tables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanRow {
    Measurement(Measurement),
    Event(Event),
}

impl ScanRow {
    pub fn timestamp(&self) -> OffsetDateTime {
        match self {
            Self::Measurement(m) => m.timestamp,
            Self::Event(e) => e.timestamp,
        }
    }
}
