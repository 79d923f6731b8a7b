//! Shared type definitions for the Chaos game-state backend.
//!
//! This crate is the single source of truth for every type that crosses a
//! crate boundary: identifiers, closed enumerations, entity records, and
//! the read-only views served to clients. Types flow downstream to
//! `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe integer wrappers for entity identifiers
//! - [`enums`] -- Roles, statuses, and entity kinds
//! - [`structs`] -- Entity records (users, reports, punishments, statistics, captures)
//! - [`scoring`] -- Difficulty and point tables
//! - [`pagination`] -- Page requests and paginated responses
//! - [`views`] -- Leaderboard, dashboard, and resistance projections

pub mod enums;
pub mod ids;
pub mod pagination;
pub mod scoring;
pub mod structs;
pub mod views;

// Re-export all public types at crate root for convenience.
pub use enums::{
    CaptureStatus, Difficulty, ParseEnumError, PunishmentStatus, PunishmentType, ReportStatus,
    ReportType, Role, UserStatus,
};
pub use ids::{CaptureId, PunishmentId, ReportId, StatisticId, UserId};
pub use pagination::{Page, PageRequest, paginate};
pub use scoring::{
    APPROVAL_BONUS_POINTS, CAPTURE_METHOD, MAX_STATISTIC_VALUE, REWARD_BONUS_POINTS,
};
pub use structs::{Capture, Punishment, Report, Statistic, User};
pub use views::{
    AdminDashboard, AgentDashboard, CaptureView, DashboardCounts, LeaderboardEntry,
    PopulationStats, ResistanceOverview, StatisticView,
};

#[cfg(test)]
mod tests {
    //! Integration tests for type exports and `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // Calling export_all writes each type to `bindings/` relative to the
        // crate root.
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::UserId::export_all();
        let _ = crate::ids::ReportId::export_all();
        let _ = crate::ids::PunishmentId::export_all();
        let _ = crate::ids::StatisticId::export_all();
        let _ = crate::ids::CaptureId::export_all();

        // Enums
        let _ = crate::enums::Role::export_all();
        let _ = crate::enums::UserStatus::export_all();
        let _ = crate::enums::ReportType::export_all();
        let _ = crate::enums::ReportStatus::export_all();
        let _ = crate::enums::PunishmentType::export_all();
        let _ = crate::enums::PunishmentStatus::export_all();
        let _ = crate::enums::CaptureStatus::export_all();
        let _ = crate::enums::Difficulty::export_all();

        // Structs
        let _ = crate::structs::User::export_all();
        let _ = crate::structs::Report::export_all();
        let _ = crate::structs::Punishment::export_all();
        let _ = crate::structs::Statistic::export_all();
        let _ = crate::structs::Capture::export_all();
        let _ = crate::pagination::PageRequest::export_all();

        // Views
        let _ = crate::views::LeaderboardEntry::export_all();
        let _ = crate::views::StatisticView::export_all();
        let _ = crate::views::CaptureView::export_all();
        let _ = crate::views::PopulationStats::export_all();
        let _ = crate::views::DashboardCounts::export_all();
        let _ = crate::views::AdminDashboard::export_all();
        let _ = crate::views::AgentDashboard::export_all();
        let _ = crate::views::ResistanceOverview::export_all();
    }
}
