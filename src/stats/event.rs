use std::fmt;
use std::sync::Arc;

/// EventKind identifies a tunnel lifecycle event.
/// Wire names are shared with downstream dashboards and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    /// Generic status report.
    Status = 0,
    /// Connection attempts exhausted, tunnel failed.
    Failed = 1,
    /// A retry attempt is in progress.
    Retrying = 2,
    /// Successful connect.
    Connected = 3,
    /// Tunnel stopped cleanly.
    Stopped = 4,
    /// Tunnel lifetime duration.
    Age = 5,
    /// Time to establish the connection.
    ConnectCost = 6,
}

/// Number of EventKind variants, used for array sizing.
pub const EVENT_KIND_COUNT: usize = 7;

impl EventKind {
    /// Returns the wire name used in metric names.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
            Self::Connected => "connected",
            Self::Stopped => "stopped",
            Self::Age => "age",
            Self::ConnectCost => "connectcost",
        }
    }

    /// Convert from the wire name.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(name: &str) -> Option<Self> {
        match name {
            "status" => Some(Self::Status),
            "failed" => Some(Self::Failed),
            "retrying" => Some(Self::Retrying),
            "connected" => Some(Self::Connected),
            "stopped" => Some(Self::Stopped),
            "age" => Some(Self::Age),
            "connectcost" => Some(Self::ConnectCost),
            _ => None,
        }
    }

    /// Return all event kinds in declaration order.
    pub fn all() -> &'static [Self] {
        &[
            Self::Status,
            Self::Failed,
            Self::Retrying,
            Self::Connected,
            Self::Stopped,
            Self::Age,
            Self::ConnectCost,
        ]
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied identifier of the reporting entity, typically a tunnel index.
///
/// Only used as the inner queue key and echoed back in the `tunnelNum` tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(Arc<str>);

impl EntityId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<u32> for EntityId {
    fn from(n: u32) -> Self {
        Self(Arc::from(n.to_string()))
    }
}

impl From<u64> for EntityId {
    fn from(n: u64) -> Self {
        Self(Arc::from(n.to_string()))
    }
}

impl From<usize> for EntityId {
    fn from(n: usize) -> Self {
        Self(Arc::from(n.to_string()))
    }
}

/// A typed push request.
#[derive(Debug, Clone, PartialEq)]
pub struct StatEvent {
    pub kind: EventKind,
    /// Admission ordering key. Wall-clock millis or a logical counter.
    pub timestamp: u64,
    pub entity: EntityId,
    /// Gauge value reported on drain.
    pub value: f64,
}

impl StatEvent {
    pub fn new(kind: EventKind, timestamp: u64, entity: impl Into<EntityId>, value: f64) -> Self {
        Self {
            kind,
            timestamp,
            entity: entity.into(),
            value,
        }
    }
}

/// Most recently admitted observation for one (kind, entity) pair.
pub type QueueEntry = StatEvent;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip() {
        for kind in EventKind::all() {
            assert_eq!(EventKind::from_str(kind.as_str()), Some(*kind));
        }
        assert_eq!(EventKind::all().len(), EVENT_KIND_COUNT);
    }

    #[test]
    fn test_wire_names_are_verbatim() {
        assert_eq!(EventKind::Status.as_str(), "status");
        assert_eq!(EventKind::Failed.as_str(), "failed");
        assert_eq!(EventKind::Retrying.as_str(), "retrying");
        assert_eq!(EventKind::Connected.as_str(), "connected");
        assert_eq!(EventKind::Stopped.as_str(), "stopped");
        assert_eq!(EventKind::Age.as_str(), "age");
        assert_eq!(EventKind::ConnectCost.as_str(), "connectcost");
    }

    #[test]
    fn test_unknown_kind() {
        assert_eq!(EventKind::from_str("disconnected"), None);
        assert_eq!(EventKind::from_str("Connected"), None);
        assert_eq!(EventKind::from_str(""), None);
    }

    #[test]
    fn test_index_matches_all_order() {
        for (i, kind) in EventKind::all().iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn test_entity_id_conversions() {
        assert_eq!(EntityId::from(7u32), EntityId::from("7"));
        assert_eq!(EntityId::from(String::from("t1")).as_str(), "t1");
        assert_eq!(EntityId::from(3usize).to_string(), "3");
    }
}
