//! Time-ordered 128-bit identifiers (spec §3.1, §3.5).
//!
//! `SessionId` and `EventId` both wrap a UUIDv7: the high bits are a
//! millisecond Unix timestamp, so lexicographic/numeric ordering of the
//! underlying bytes is also creation-time ordering (testable property 1).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! time_ordered_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Mint a new id from the current wall-clock time.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            pub fn as_bytes(&self) -> [u8; 16] {
                *self.0.as_bytes()
            }

            /// Milliseconds since the epoch encoded in this id's timestamp bits.
            pub fn timestamp_ms(&self) -> u64 {
                self.0
                    .get_timestamp()
                    .map(|ts| {
                        let (secs, nanos) = ts.to_unix();
                        secs * 1000 + (nanos as u64) / 1_000_000
                    })
                    .unwrap_or(0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

time_ordered_id!(SessionId);
time_ordered_id!(EventId);
time_ordered_id!(UtteranceId);
