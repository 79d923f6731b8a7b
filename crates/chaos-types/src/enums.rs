//! Closed enumerations for roles, statuses, and entity kinds.
//!
//! Every enumeration has a canonical lowercase wire name used both in JSON
//! (via `serde(rename_all = "snake_case")`) and in the `TEXT` columns of the
//! database. Parsing goes through [`FromStr`] and fails with
//! [`ParseEnumError`] on anything outside the closed set.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A string could not be parsed into one of the closed enumerations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: '{value}' (expected one of: {expected})")]
pub struct ParseEnumError {
    /// Name of the enumeration being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
    /// Space-separated list of accepted values.
    pub expected: &'static str,
}

/// Generates `as_str`, `ALL`, [`Display`](fmt::Display) and [`FromStr`] for
/// a fieldless enum whose variants map one-to-one onto wire names.
macro_rules! wire_names {
    ($name:ident, $kind:literal, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Canonical wire name of this variant.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok(Self::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_owned(),
                        expected: concat!($($wire, " "),+),
                    }),
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// The role a user plays in the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Role {
    /// The single privileged operator of the game.
    Administrator,
    /// Performs captures and earns points.
    Agent,
    /// Can be captured; reports anonymously.
    Target,
}

wire_names!(Role, "role", {
    Administrator => "administrator",
    Agent => "agent",
    Target => "target",
});

/// Lifecycle status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum UserStatus {
    /// Free to act.
    Active,
    /// A target that has been captured by an agent.
    Captured,
    /// An agent with at least one active sanction.
    Punished,
}

wire_names!(UserStatus, "user status", {
    Active => "active",
    Captured => "captured",
    Punished => "punished",
});

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// The kind of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ReportType {
    /// Intelligence about resistance activity, filed by an agent.
    Resistance,
    /// A capture account, filed by an agent.
    Capture,
    /// An authorless report, filed by a target.
    Anonymous,
}

wire_names!(ReportType, "report type", {
    Resistance => "resistance",
    Capture => "capture",
    Anonymous => "anonymous",
});

/// Moderation status of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ReportStatus {
    /// Awaiting moderation.
    Pending,
    /// Accepted by the administrator.
    Approved,
    /// Rejected by the administrator.
    Rejected,
}

wire_names!(ReportStatus, "report status", {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

impl ReportStatus {
    /// Whether moderation may move a report from `self` to `next`.
    ///
    /// Only `pending` reports can be moderated; both outcomes are final.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved | Self::Rejected)
        )
    }
}

// ---------------------------------------------------------------------------
// Punishments
// ---------------------------------------------------------------------------

/// The kind of a punishment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum PunishmentType {
    /// Suspension for a period.
    Timeout,
    /// Loss of standing.
    Demotion,
    /// Additional assigned work.
    ExtraTasks,
    /// A bonus instead of a sanction.
    Reward,
}

wire_names!(PunishmentType, "punishment type", {
    Timeout => "timeout",
    Demotion => "demotion",
    ExtraTasks => "extra_tasks",
    Reward => "reward",
});

impl PunishmentType {
    /// Sanctions force the `punished` status while active; rewards never do.
    pub const fn is_sanction(self) -> bool {
        !matches!(self, Self::Reward)
    }
}

/// Lifecycle status of a punishment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum PunishmentStatus {
    /// In force.
    Active,
    /// Served in full.
    Completed,
    /// Withdrawn by the administrator.
    Cancelled,
}

wire_names!(PunishmentStatus, "punishment status", {
    Active => "active",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl PunishmentStatus {
    /// Whether a punishment may move from `self` to `next`.
    ///
    /// `active` may end as `completed` or `cancelled`; both are terminal.
    /// Staying in the current status is always allowed.
    pub fn can_transition_to(self, next: Self) -> bool {
        self == next || matches!(self, Self::Active)
    }
}

// ---------------------------------------------------------------------------
// Captures
// ---------------------------------------------------------------------------

/// Status recorded on a capture event.
///
/// Only `captured` is ever written; `released` and `escaped` are part of the
/// stored vocabulary but no operation produces them yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum CaptureStatus {
    /// The target is held.
    Captured,
    /// The target was let go.
    Released,
    /// The target got away.
    Escaped,
}

wire_names!(CaptureStatus, "capture status", {
    Captured => "captured",
    Released => "released",
    Escaped => "escaped",
});

/// Difficulty bucket of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Difficulty {
    /// Worth 100 points.
    Easy,
    /// Worth 250 points.
    Medium,
    /// Worth 500 points.
    Hard,
}

wire_names!(Difficulty, "difficulty", {
    Easy => "easy",
    Medium => "medium",
    Hard => "hard",
});

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip_through_from_str() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), *role);
        }
        for kind in PunishmentType::ALL {
            assert_eq!(kind.as_str().parse::<PunishmentType>().unwrap(), *kind);
        }
    }

    #[test]
    fn parse_rejects_unknown_values() {
        let err = "overlord".parse::<Role>().unwrap_err();
        assert_eq!(err.kind, "role");
        assert_eq!(err.value, "overlord");
        assert!("Timeout".parse::<PunishmentType>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&PunishmentType::ExtraTasks).unwrap();
        assert_eq!(json, "\"extra_tasks\"");
        assert_eq!(PunishmentType::ExtraTasks.as_str(), "extra_tasks");
    }

    #[test]
    fn only_reward_is_not_a_sanction() {
        assert!(PunishmentType::Timeout.is_sanction());
        assert!(PunishmentType::Demotion.is_sanction());
        assert!(PunishmentType::ExtraTasks.is_sanction());
        assert!(!PunishmentType::Reward.is_sanction());
    }

    #[test]
    fn report_moderation_only_leaves_pending() {
        assert!(ReportStatus::Pending.can_transition_to(ReportStatus::Approved));
        assert!(ReportStatus::Pending.can_transition_to(ReportStatus::Rejected));
        assert!(!ReportStatus::Approved.can_transition_to(ReportStatus::Approved));
        assert!(!ReportStatus::Rejected.can_transition_to(ReportStatus::Approved));
        assert!(!ReportStatus::Pending.can_transition_to(ReportStatus::Pending));
    }

    #[test]
    fn punishment_terminal_states_are_final() {
        use PunishmentStatus::{Active, Cancelled, Completed};
        assert!(Active.can_transition_to(Completed));
        assert!(Active.can_transition_to(Cancelled));
        assert!(Completed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Cancelled.can_transition_to(Completed));
    }
}
