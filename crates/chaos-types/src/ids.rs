//! Type-safe identifier wrappers around `u64`.
//!
//! Every persisted entity has a strongly-typed ID so a report ID can never
//! be passed where a user ID is expected. IDs are assigned by the store
//! from a monotonically increasing sequence starting at 1.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Generates a newtype wrapper around `u64` with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[serde(transparent)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub u64);

        impl $name {
            /// Wrap a raw sequence value.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Return the inner `u64` value.
            pub const fn into_inner(self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl core::str::FromStr for $name {
            type Err = core::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<u64>().map(Self)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a user of any role.
    UserId
}

define_id! {
    /// Unique identifier for a report.
    ReportId
}

define_id! {
    /// Unique identifier for a punishment or reward.
    PunishmentId
}

define_id! {
    /// Unique identifier for an agent's statistic row.
    StatisticId
}

define_id! {
    /// Unique identifier for a capture record.
    CaptureId
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_bare_numbers() {
        let json = serde_json::to_string(&UserId::new(7)).unwrap();
        assert_eq!(json, "7");
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, UserId::new(7));
    }

    #[test]
    fn ids_parse_from_path_segments() {
        let id: ReportId = "42".parse().unwrap();
        assert_eq!(id.into_inner(), 42);
        assert!("abc".parse::<ReportId>().is_err());
    }
}
