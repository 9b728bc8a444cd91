//! Small integer handles interpreted by the `Platform`.
//!
//! Ordering is by id so sorting handles is stable across processes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle representing an accelerator stream. Stream 0 is the default stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stream(pub u32);

impl Stream {
    pub const DEFAULT: Stream = Stream(0);

    pub fn id(self) -> u32 {
        self.0
    }

    pub fn is_default(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle representing an accelerator event.
///
/// Only valid while its id is below the owning platform's event cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(pub u32);

impl Event {
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_sort_by_id() {
        let mut streams = vec![Stream(2), Stream(0), Stream(1)];
        streams.sort();
        assert_eq!(streams, vec![Stream(0), Stream(1), Stream(2)]);

        let mut events = vec![Event(7), Event(3)];
        events.sort();
        assert_eq!(events, vec![Event(3), Event(7)]);
    }

    #[test]
    fn default_stream_is_zero() {
        assert!(Stream::DEFAULT.is_default());
        assert!(!Stream(1).is_default());
    }
}
