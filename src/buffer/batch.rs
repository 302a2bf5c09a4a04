use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Why a window was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    SizeBased,
    TimeBased,
    Manual,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::SizeBased => "size",
            FlushTrigger::TimeBased => "age",
            FlushTrigger::Manual => "manual",
        }
    }
}

impl std::fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock time of the first and most recent record in a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBounds {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl WindowBounds {
    pub fn starting_at(at: DateTime<Utc>) -> Self {
        Self { start: at, end: at }
    }
}

/// Immutable snapshot of one closed window, handed to a sink by value.
#[derive(Debug, Clone)]
pub struct Batch {
    payload: Bytes,
    window: WindowBounds,
    entries: usize,
    label: Option<String>,
    trigger: FlushTrigger,
}

impl Batch {
    pub fn new(
        payload: Bytes,
        window: WindowBounds,
        entries: usize,
        label: Option<String>,
        trigger: FlushTrigger,
    ) -> Self {
        Self {
            payload,
            window,
            entries,
            label: label.filter(|l| !l.is_empty()),
            trigger,
        }
    }

    /// Windows are identified by their start time.
    pub fn id(&self) -> String {
        self.window.start.format("%Y%m%dT%H%M%S%.3fZ").to_string()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    pub fn window(&self) -> WindowBounds {
        self.window
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn trigger(&self) -> FlushTrigger {
        self.trigger
    }

    /// Compressed size in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> WindowBounds {
        WindowBounds {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 5).unwrap(),
        }
    }

    #[test]
    fn test_empty_label_is_dropped() {
        let batch = Batch::new(
            Bytes::from_static(b"x"),
            window(),
            1,
            Some(String::new()),
            FlushTrigger::SizeBased,
        );
        assert_eq!(batch.label(), None);
        assert_eq!(batch.len(), 1);
        assert!(!batch.is_empty());
    }

    #[test]
    fn test_id_is_window_start() {
        let batch = Batch::new(
            Bytes::new(),
            window(),
            0,
            Some("edge".to_string()),
            FlushTrigger::Manual,
        );
        assert_eq!(batch.id(), "20240101T000000.000Z");
        assert_eq!(batch.label(), Some("edge"));
        assert!(batch.is_empty());
    }

    #[test]
    fn test_trigger_names() {
        assert_eq!(FlushTrigger::SizeBased.to_string(), "size");
        assert_eq!(FlushTrigger::TimeBased.to_string(), "age");
        assert_eq!(FlushTrigger::Manual.to_string(), "manual");
    }
}
