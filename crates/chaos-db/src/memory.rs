//! In-memory implementation of every store trait.
//!
//! All tables live behind one [`RwLock`], and each trait method holds the
//! lock for its whole body, so every aggregate operation is atomic with
//! respect to every other. Used for development, tests, and the default
//! `memory` storage backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chaos_types::{
    Capture, CaptureId, CaptureStatus, Page, PageRequest, Punishment, PunishmentId,
    PunishmentStatus, Report, ReportId, ReportStatus, Role, Statistic, StatisticId, User, UserId,
    UserStatus, paginate,
};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::DbError;
use crate::store::{
    Award, CaptureStore, NewCapture, NewPunishment, NewReport, NewUser, PunishmentFilter,
    PunishmentPatch, PunishmentStore, ReportFilter, ReportStore, Standing, StatDelta,
    StatOverride, StatisticStore, UserFilter, UserPatch, UserStore,
};

/// A user together with its secret credential hash.
#[derive(Debug, Clone)]
struct UserRow {
    user: User,
    credential_hash: String,
}

/// A record that supports soft deletion.
#[derive(Debug, Clone)]
struct Tombstoned<T> {
    record: T,
    deleted_at: Option<DateTime<Utc>>,
}

impl<T> Tombstoned<T> {
    const fn live(record: T) -> Self {
        Self {
            record,
            deleted_at: None,
        }
    }

    const fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Last value handed out per table. IDs start at 1.
#[derive(Debug, Default)]
struct Sequences {
    user: u64,
    report: u64,
    punishment: u64,
    statistic: u64,
    capture: u64,
}

fn next_id(counter: &mut u64) -> Result<u64, DbError> {
    *counter = counter
        .checked_add(1)
        .ok_or_else(|| DbError::Corrupt(String::from("id sequence exhausted")))?;
    Ok(*counter)
}

fn checked_sum(current: i64, delta: i64) -> Result<i64, DbError> {
    current
        .checked_add(delta)
        .ok_or_else(|| DbError::Corrupt(String::from("statistic counter overflow")))
}

fn count<I: Iterator>(iter: I) -> u64 {
    u64::try_from(iter.count()).unwrap_or(u64::MAX)
}

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, UserRow>,
    reports: BTreeMap<ReportId, Tombstoned<Report>>,
    punishments: BTreeMap<PunishmentId, Tombstoned<Punishment>>,
    statistics: BTreeMap<UserId, Statistic>,
    captures: BTreeMap<CaptureId, Capture>,
    sequences: Sequences,
}

impl Tables {
    fn live_user(&self, id: UserId) -> Option<&User> {
        self.users
            .get(&id)
            .map(|row| &row.user)
            .filter(|user| !user.is_deleted())
    }

    fn live_user_mut(&mut self, id: UserId) -> Result<&mut UserRow, DbError> {
        self.users
            .get_mut(&id)
            .filter(|row| !row.user.is_deleted())
            .ok_or_else(|| DbError::not_found("user", id))
    }

    fn ensure_unique(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        exclude: Option<UserId>,
    ) -> Result<(), DbError> {
        for row in self.users.values() {
            if Some(row.user.id) == exclude {
                continue;
            }
            if username.is_some_and(|name| name == row.user.username) {
                return Err(DbError::Conflict(format!(
                    "username '{}' is already taken",
                    row.user.username
                )));
            }
            if email.is_some_and(|mail| mail == row.user.email) {
                return Err(DbError::Conflict(format!(
                    "email '{}' is already registered",
                    row.user.email
                )));
            }
        }
        Ok(())
    }

    /// Tombstoned administrators still count.
    fn ensure_no_administrator(&self, exclude: Option<UserId>) -> Result<(), DbError> {
        let taken = self
            .users
            .values()
            .any(|row| Some(row.user.id) != exclude && row.user.role == Role::Administrator);
        if taken {
            return Err(DbError::Conflict(String::from(
                "an administrator already exists",
            )));
        }
        Ok(())
    }

    fn ensure_statistic(
        &mut self,
        user: UserId,
        now: DateTime<Utc>,
    ) -> Result<&mut Statistic, DbError> {
        if !self.statistics.contains_key(&user) {
            let id = StatisticId::new(next_id(&mut self.sequences.statistic)?);
            let mut row = Statistic::zeroed(user, now);
            row.id = id;
            self.statistics.insert(user, row);
        }
        self.statistics
            .get_mut(&user)
            .ok_or_else(|| DbError::not_found("statistic", user))
    }

    /// Add `delta` to `user`'s counters. Every sum is checked before the
    /// row changes, so an overflow leaves the counters untouched.
    fn apply_delta(
        &mut self,
        user: UserId,
        delta: StatDelta,
        now: DateTime<Utc>,
    ) -> Result<Statistic, DbError> {
        let stat = self.ensure_statistic(user, now)?;
        let captures = checked_sum(stat.captures_count, delta.captures)?;
        let reports = checked_sum(stat.reports_count, delta.reports)?;
        let points = checked_sum(stat.points, delta.points)?;
        stat.captures_count = captures;
        stat.reports_count = reports;
        stat.points = points;
        stat.updated_at = now;
        Ok(stat.clone())
    }

    /// Re-derive `target`'s status from its live active sanctions.
    fn reconcile_sanctions(&mut self, target: UserId, now: DateTime<Utc>) {
        let active_sanctions = self
            .punishments
            .values()
            .filter(|p| p.is_live())
            .map(|p| &p.record)
            .filter(|p| {
                p.target_id == target
                    && p.status == PunishmentStatus::Active
                    && p.punishment_type.is_sanction()
            })
            .count();

        let Some(row) = self.users.get_mut(&target) else {
            return;
        };
        let next = if active_sanctions > 0 {
            UserStatus::Punished
        } else if row.user.status == UserStatus::Punished {
            UserStatus::Active
        } else {
            row.user.status
        };
        if next != row.user.status {
            tracing::debug!(user_id = %target, from = %row.user.status, to = %next, "Reconciled sanction status");
            row.user.status = next;
            row.user.updated_at = now;
        }
    }

    fn live_reports<'a>(
        &'a self,
        filter: &'a ReportFilter,
    ) -> impl DoubleEndedIterator<Item = &'a Report> + 'a {
        self.reports
            .values()
            .filter(|r| r.is_live())
            .map(|r| &r.record)
            .filter(move |r| {
                filter.report_type.is_none_or(|t| r.report_type == t)
                    && filter.status.is_none_or(|s| r.status == s)
                    && filter.author_id.is_none_or(|a| r.author_id == Some(a))
            })
    }

    fn live_users<'a>(&'a self, filter: &'a UserFilter) -> impl Iterator<Item = &'a User> + 'a {
        self.users
            .values()
            .map(|row| &row.user)
            .filter(|u| !u.is_deleted())
            .filter(move |u| {
                filter.role.is_none_or(|r| u.role == r)
                    && filter.status.is_none_or(|s| u.status == s)
                    && filter.id.is_none_or(|id| u.id == id)
            })
    }
}

/// Thread-safe in-memory entity store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// UserStore
// ---------------------------------------------------------------------------

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, DbError> {
        Ok(self.tables.read().await.live_user(id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .live_users(&UserFilter::default())
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .live_users(&UserFilter::default())
            .find(|u| u.email == email)
            .cloned())
    }

    async fn usernames(&self, ids: &[UserId]) -> Result<BTreeMap<UserId, String>, DbError> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| {
                tables
                    .users
                    .get(id)
                    .map(|row| (*id, row.user.username.clone()))
            })
            .collect())
    }

    async fn list_users(
        &self,
        filter: UserFilter,
        page: PageRequest,
    ) -> Result<Page<User>, DbError> {
        let tables = self.tables.read().await;
        let all: Vec<User> = tables.live_users(&filter).cloned().collect();
        Ok(paginate(all, page))
    }

    async fn count_users(&self, filter: UserFilter) -> Result<u64, DbError> {
        Ok(count(self.tables.read().await.live_users(&filter)))
    }

    async fn create_user(&self, new: NewUser) -> Result<User, DbError> {
        let mut tables = self.tables.write().await;
        tables.ensure_unique(Some(&new.username), Some(&new.email), None)?;
        if new.role == Role::Administrator {
            tables.ensure_no_administrator(None)?;
        }

        let now = Utc::now();
        let id = UserId::new(next_id(&mut tables.sequences.user)?);
        let user = User {
            id,
            username: new.username,
            email: new.email,
            role: new.role,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        if user.role == Role::Agent {
            tables.ensure_statistic(id, now)?;
        }
        tables.users.insert(
            id,
            UserRow {
                user: user.clone(),
                credential_hash: new.credential_hash,
            },
        );
        tracing::debug!(user_id = %id, role = %user.role, "Inserted user");
        Ok(user)
    }

    async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User, DbError> {
        let mut tables = self.tables.write().await;
        tables.live_user_mut(id)?;
        tables.ensure_unique(patch.username.as_deref(), patch.email.as_deref(), Some(id))?;
        if patch.role == Some(Role::Administrator) {
            tables.ensure_no_administrator(Some(id))?;
        }

        let now = Utc::now();
        if patch.role == Some(Role::Agent) {
            tables.ensure_statistic(id, now)?;
        }
        let row = tables.live_user_mut(id)?;
        if let Some(username) = patch.username {
            row.user.username = username;
        }
        if let Some(email) = patch.email {
            row.user.email = email;
        }
        if let Some(role) = patch.role {
            row.user.role = role;
        }
        if let Some(status) = patch.status {
            row.user.status = status;
        }
        row.user.updated_at = now;
        Ok(row.user.clone())
    }

    async fn credential_hash(&self, id: UserId) -> Result<String, DbError> {
        let mut tables = self.tables.write().await;
        Ok(tables.live_user_mut(id)?.credential_hash.clone())
    }

    async fn set_credential_hash(&self, id: UserId, hash: String) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        let row = tables.live_user_mut(id)?;
        row.credential_hash = hash;
        row.user.updated_at = Utc::now();
        Ok(())
    }

    async fn soft_delete_user(&self, id: UserId) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        let row = tables.live_user_mut(id)?;
        row.user.deleted_at = Some(Utc::now());
        Ok(())
    }

    async fn restore_user(&self, id: UserId) -> Result<User, DbError> {
        let mut tables = self.tables.write().await;
        let row = tables
            .users
            .get_mut(&id)
            .filter(|row| row.user.is_deleted())
            .ok_or_else(|| DbError::not_found("deleted user", id))?;
        row.user.deleted_at = None;
        row.user.updated_at = Utc::now();
        Ok(row.user.clone())
    }
}

// ---------------------------------------------------------------------------
// ReportStore
// ---------------------------------------------------------------------------

#[async_trait]
impl ReportStore for MemoryStore {
    async fn find_report(&self, id: ReportId) -> Result<Option<Report>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .reports
            .get(&id)
            .filter(|r| r.is_live())
            .map(|r| r.record.clone()))
    }

    async fn list_reports(
        &self,
        filter: ReportFilter,
        page: PageRequest,
    ) -> Result<Page<Report>, DbError> {
        let tables = self.tables.read().await;
        let all: Vec<Report> = tables.live_reports(&filter).rev().cloned().collect();
        Ok(paginate(all, page))
    }

    async fn recent_reports(&self, limit: u64) -> Result<Vec<Report>, DbError> {
        let tables = self.tables.read().await;
        let take = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(tables
            .live_reports(&ReportFilter::default())
            .rev()
            .take(take)
            .cloned()
            .collect())
    }

    async fn count_reports(&self, filter: ReportFilter) -> Result<u64, DbError> {
        Ok(count(self.tables.read().await.live_reports(&filter)))
    }

    async fn create_report(
        &self,
        new: NewReport,
        credit: Option<UserId>,
    ) -> Result<Report, DbError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let id = ReportId::new(next_id(&mut tables.sequences.report)?);
        if let Some(author) = credit {
            tables.live_user_mut(author)?;
            tables.apply_delta(
                author,
                StatDelta {
                    reports: 1,
                    ..StatDelta::default()
                },
                now,
            )?;
        }
        let report = Report {
            id,
            title: new.title,
            description: new.description,
            report_type: new.report_type,
            author_id: new.author_id,
            status: ReportStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        tables.reports.insert(id, Tombstoned::live(report.clone()));
        Ok(report)
    }

    async fn transition_report(
        &self,
        id: ReportId,
        from: ReportStatus,
        to: ReportStatus,
        award: Option<Award>,
    ) -> Result<Report, DbError> {
        let mut tables = self.tables.write().await;
        let current = tables
            .reports
            .get(&id)
            .filter(|r| r.is_live())
            .map(|r| r.record.status)
            .ok_or_else(|| DbError::not_found("report", id))?;
        if current != from {
            return Err(DbError::Conflict(format!(
                "report {id} is {current}, expected {from}"
            )));
        }

        let now = Utc::now();
        if let Some(award) = award {
            tables.apply_delta(
                award.user_id,
                StatDelta {
                    points: award.points,
                    ..StatDelta::default()
                },
                now,
            )?;
        }
        let entry = tables
            .reports
            .get_mut(&id)
            .ok_or_else(|| DbError::not_found("report", id))?;
        entry.record.status = to;
        entry.record.updated_at = now;
        Ok(entry.record.clone())
    }

    async fn soft_delete_report(&self, id: ReportId) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        let entry = tables
            .reports
            .get_mut(&id)
            .filter(|r| r.is_live())
            .ok_or_else(|| DbError::not_found("report", id))?;
        entry.deleted_at = Some(Utc::now());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PunishmentStore
// ---------------------------------------------------------------------------

#[async_trait]
impl PunishmentStore for MemoryStore {
    async fn find_punishment(&self, id: PunishmentId) -> Result<Option<Punishment>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .punishments
            .get(&id)
            .filter(|p| p.is_live())
            .map(|p| p.record.clone()))
    }

    async fn list_punishments(
        &self,
        filter: PunishmentFilter,
        page: PageRequest,
    ) -> Result<Page<Punishment>, DbError> {
        let tables = self.tables.read().await;
        let all: Vec<Punishment> = tables
            .punishments
            .values()
            .rev()
            .filter(|p| p.is_live())
            .map(|p| &p.record)
            .filter(|p| {
                filter.status.is_none_or(|s| p.status == s)
                    && filter.target_id.is_none_or(|t| p.target_id == t)
            })
            .cloned()
            .collect();
        Ok(paginate(all, page))
    }

    async fn active_punishments(&self, target: UserId) -> Result<Vec<Punishment>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .punishments
            .values()
            .rev()
            .filter(|p| p.is_live())
            .map(|p| &p.record)
            .filter(|p| p.target_id == target && p.status == PunishmentStatus::Active)
            .cloned()
            .collect())
    }

    async fn count_active_punishments(&self) -> Result<u64, DbError> {
        let tables = self.tables.read().await;
        Ok(count(tables.punishments.values().filter(|p| {
            p.is_live() && p.record.status == PunishmentStatus::Active
        })))
    }

    async fn create_punishment(
        &self,
        new: NewPunishment,
        bonus_points: Option<i64>,
    ) -> Result<Punishment, DbError> {
        let mut tables = self.tables.write().await;
        tables.live_user_mut(new.target_id)?;

        let now = Utc::now();
        let id = PunishmentId::new(next_id(&mut tables.sequences.punishment)?);
        if let Some(points) = bonus_points {
            tables.apply_delta(
                new.target_id,
                StatDelta {
                    points,
                    ..StatDelta::default()
                },
                now,
            )?;
        }
        let punishment = Punishment {
            id,
            target_id: new.target_id,
            assigned_by: new.assigned_by,
            punishment_type: new.punishment_type,
            description: new.description,
            status: PunishmentStatus::Active,
            expires_at: new.expires_at,
            created_at: now,
            updated_at: now,
        };
        tables
            .punishments
            .insert(id, Tombstoned::live(punishment.clone()));
        tables.reconcile_sanctions(punishment.target_id, now);
        Ok(punishment)
    }

    async fn update_punishment(
        &self,
        id: PunishmentId,
        expected: PunishmentStatus,
        patch: PunishmentPatch,
    ) -> Result<Punishment, DbError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let entry = tables
            .punishments
            .get_mut(&id)
            .filter(|p| p.is_live())
            .ok_or_else(|| DbError::not_found("punishment", id))?;
        if entry.record.status != expected {
            return Err(DbError::Conflict(format!(
                "punishment {id} is {}, expected {expected}",
                entry.record.status
            )));
        }
        if let Some(status) = patch.status {
            entry.record.status = status;
        }
        if let Some(description) = patch.description {
            entry.record.description = description;
        }
        if let Some(expires_at) = patch.expires_at {
            entry.record.expires_at = expires_at;
        }
        entry.record.updated_at = now;
        let updated = entry.record.clone();
        tables.reconcile_sanctions(updated.target_id, now);
        Ok(updated)
    }

    async fn soft_delete_punishment(&self, id: PunishmentId) -> Result<Punishment, DbError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let entry = tables
            .punishments
            .get_mut(&id)
            .filter(|p| p.is_live())
            .ok_or_else(|| DbError::not_found("punishment", id))?;
        entry.deleted_at = Some(now);
        let removed = entry.record.clone();
        tables.reconcile_sanctions(removed.target_id, now);
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// StatisticStore
// ---------------------------------------------------------------------------

#[async_trait]
impl StatisticStore for MemoryStore {
    async fn find_statistic(&self, user: UserId) -> Result<Option<Statistic>, DbError> {
        Ok(self.tables.read().await.statistics.get(&user).cloned())
    }

    async fn increment(&self, user: UserId, delta: StatDelta) -> Result<Statistic, DbError> {
        let mut tables = self.tables.write().await;
        tables.apply_delta(user, delta, Utc::now())
    }

    async fn override_statistic(
        &self,
        user: UserId,
        values: StatOverride,
    ) -> Result<Statistic, DbError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let stat = tables.ensure_statistic(user, now)?;
        if let Some(captures) = values.captures_count {
            stat.captures_count = captures;
        }
        if let Some(reports) = values.reports_count {
            stat.reports_count = reports;
        }
        if let Some(points) = values.points {
            stat.points = points;
        }
        stat.updated_at = now;
        Ok(stat.clone())
    }

    async fn agent_standings(&self) -> Result<Vec<Standing>, DbError> {
        let tables = self.tables.read().await;
        let now = Utc::now();
        let filter = UserFilter {
            role: Some(Role::Agent),
            ..UserFilter::default()
        };
        Ok(tables
            .live_users(&filter)
            .map(|user| Standing {
                user_id: user.id,
                username: user.username.clone(),
                statistic: tables
                    .statistics
                    .get(&user.id)
                    .cloned()
                    .unwrap_or_else(|| Statistic::zeroed(user.id, now)),
            })
            .collect())
    }

    async fn write_rankings(&self, rankings: &[(UserId, i64)]) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        // Create missing rows first so a failure leaves nothing half-written.
        for (user, _) in rankings {
            tables.ensure_statistic(*user, now)?;
        }
        for (user, ranking) in rankings {
            if let Some(stat) = tables.statistics.get_mut(user) {
                stat.ranking = *ranking;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CaptureStore
// ---------------------------------------------------------------------------

#[async_trait]
impl CaptureStore for MemoryStore {
    async fn commit_capture(&self, new: NewCapture) -> Result<Capture, DbError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        let target = tables
            .live_user(new.target_id)
            .ok_or_else(|| DbError::not_found("user", new.target_id))?;
        if target.role != Role::Target {
            return Err(DbError::Conflict(format!(
                "user {} is not a target",
                new.target_id
            )));
        }
        if target.status == UserStatus::Captured {
            return Err(DbError::Conflict(format!(
                "target {} is already captured",
                new.target_id
            )));
        }

        // Every fallible step runs before the target's status changes.
        let id = CaptureId::new(next_id(&mut tables.sequences.capture)?);
        let points = new.difficulty.points();
        tables.apply_delta(
            new.agent_id,
            StatDelta {
                captures: 1,
                points,
                ..StatDelta::default()
            },
            now,
        )?;

        let target = tables.live_user_mut(new.target_id)?;
        target.user.status = UserStatus::Captured;
        target.user.updated_at = now;

        let capture = Capture {
            id,
            agent_id: new.agent_id,
            target_id: new.target_id,
            captured_at: now,
            status: CaptureStatus::Captured,
            method: new.method,
            difficulty: new.difficulty,
            points,
        };
        tables.captures.insert(id, capture.clone());
        Ok(capture)
    }

    async fn captures_by_agent(
        &self,
        agent: UserId,
        limit: Option<u64>,
    ) -> Result<Vec<Capture>, DbError> {
        let tables = self.tables.read().await;
        let take = limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        Ok(tables
            .captures
            .values()
            .rev()
            .filter(|c| c.agent_id == agent)
            .take(take)
            .cloned()
            .collect())
    }

    async fn all_captures(&self) -> Result<Vec<Capture>, DbError> {
        Ok(self.tables.read().await.captures.values().rev().cloned().collect())
    }

    async fn count_captures(&self) -> Result<u64, DbError> {
        Ok(count(self.tables.read().await.captures.values()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use chaos_types::{Difficulty, PunishmentType, ReportType};

    use super::*;

    fn new_user(name: &str, role: Role) -> NewUser {
        NewUser {
            username: name.to_owned(),
            email: format!("{name}@chaos.test"),
            credential_hash: String::from("hash"),
            role,
        }
    }

    fn sanction(target: UserId, admin: UserId, kind: PunishmentType) -> NewPunishment {
        NewPunishment {
            target_id: target,
            assigned_by: admin,
            punishment_type: kind,
            description: String::from("test"),
            expires_at: None,
        }
    }

    async fn status_of(store: &MemoryStore, id: UserId) -> UserStatus {
        store.find_user(id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn ids_start_at_one_and_increase() {
        let store = MemoryStore::new();
        let a = store.create_user(new_user("a", Role::Agent)).await.unwrap();
        let b = store.create_user(new_user("b", Role::Target)).await.unwrap();
        assert_eq!(a.id, UserId::new(1));
        assert_eq!(b.id, UserId::new(2));
    }

    #[tokio::test]
    async fn agents_get_a_statistic_row_on_creation() {
        let store = MemoryStore::new();
        let agent = store.create_user(new_user("a", Role::Agent)).await.unwrap();
        let target = store.create_user(new_user("t", Role::Target)).await.unwrap();
        assert!(store.find_statistic(agent.id).await.unwrap().is_some());
        assert!(store.find_statistic(target.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn uniqueness_covers_soft_deleted_users() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("ghost", Role::Target)).await.unwrap();
        store.soft_delete_user(user.id).await.unwrap();

        assert!(store.find_user(user.id).await.unwrap().is_none());
        let err = store.create_user(new_user("ghost", Role::Target)).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));

        store.restore_user(user.id).await.unwrap();
        assert!(store.find_user(user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn one_administrator_across_create_and_update() {
        let store = MemoryStore::new();
        let root = store.create_user(new_user("root", Role::Administrator)).await.unwrap();
        let agent = store.create_user(new_user("a", Role::Agent)).await.unwrap();

        let err = store.create_user(new_user("usurper", Role::Administrator)).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
        let promote = UserPatch {
            role: Some(Role::Administrator),
            ..UserPatch::default()
        };
        let err = store.update_user(agent.id, promote).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));

        store.soft_delete_user(root.id).await.unwrap();
        let err = store.create_user(new_user("heir", Role::Administrator)).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[tokio::test]
    async fn concurrent_administrator_creation_admits_one() {
        let store = Arc::new(MemoryStore::new());
        let tasks = (0..8).map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store.create_user(new_user(&format!("root{i}"), Role::Administrator)).await
            })
        });
        let created = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|joined| matches!(joined, Ok(Ok(_))))
            .count();
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn usernames_include_tombstoned_users() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("gone", Role::Target)).await.unwrap();
        store.soft_delete_user(user.id).await.unwrap();
        let names = store.usernames(&[user.id]).await.unwrap();
        assert_eq!(names.get(&user.id).map(String::as_str), Some("gone"));
    }

    #[tokio::test]
    async fn commit_capture_is_conditional_on_status() {
        let store = MemoryStore::new();
        let agent = store.create_user(new_user("a", Role::Agent)).await.unwrap();
        let target = store.create_user(new_user("t", Role::Target)).await.unwrap();
        let capture = NewCapture {
            agent_id: agent.id,
            target_id: target.id,
            method: String::from("m"),
            difficulty: Difficulty::Hard,
        };

        let first = store.commit_capture(capture.clone()).await.unwrap();
        assert_eq!(first.points, 500);
        let second = store.commit_capture(capture).await.unwrap_err();
        assert!(matches!(second, DbError::Conflict(_)));

        let stat = store.find_statistic(agent.id).await.unwrap().unwrap();
        assert_eq!(stat.captures_count, 1);
        assert_eq!(stat.points, 500);
        assert_eq!(store.count_captures().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_capture_leaves_target_and_counters_untouched() {
        let store = MemoryStore::new();
        let agent = store.create_user(new_user("a", Role::Agent)).await.unwrap();
        let target = store.create_user(new_user("t", Role::Target)).await.unwrap();
        store
            .override_statistic(
                agent.id,
                StatOverride {
                    points: Some(i64::MAX),
                    ..StatOverride::default()
                },
            )
            .await
            .unwrap();

        let err = store
            .commit_capture(NewCapture {
                agent_id: agent.id,
                target_id: target.id,
                method: String::from("m"),
                difficulty: Difficulty::Easy,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Corrupt(_)));

        let target = store.find_user(target.id).await.unwrap().unwrap();
        assert_eq!(target.status, UserStatus::Active);
        assert_eq!(store.count_captures().await.unwrap(), 0);
        let stat = store.find_statistic(agent.id).await.unwrap().unwrap();
        assert_eq!((stat.captures_count, stat.points), (0, i64::MAX));
    }

    #[tokio::test]
    async fn concurrent_captures_of_one_target_succeed_once() {
        let store = Arc::new(MemoryStore::new());
        let target = store.create_user(new_user("t", Role::Target)).await.unwrap();
        let mut agents = Vec::new();
        for i in 0..8 {
            agents.push(store.create_user(new_user(&format!("a{i}"), Role::Agent)).await.unwrap());
        }

        let attempts = agents.iter().map(|agent| {
            let store = Arc::clone(&store);
            let capture = NewCapture {
                agent_id: agent.id,
                target_id: target.id,
                method: String::from("m"),
                difficulty: Difficulty::Easy,
            };
            tokio::spawn(async move { store.commit_capture(capture).await })
        });
        let results = futures::future::join_all(attempts).await;
        let successes = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(store.count_captures().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let agent = store.create_user(new_user("a", Role::Agent)).await.unwrap();
        let tasks = (0..50).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .increment(
                        agent.id,
                        StatDelta {
                            points: 2,
                            ..StatDelta::default()
                        },
                    )
                    .await
            })
        });
        futures::future::join_all(tasks).await;
        let stat = store.find_statistic(agent.id).await.unwrap().unwrap();
        assert_eq!(stat.points, 100);
    }

    #[tokio::test]
    async fn sanctions_drive_target_status() {
        let store = MemoryStore::new();
        let admin = store.create_user(new_user("root", Role::Administrator)).await.unwrap();
        let agent = store.create_user(new_user("a", Role::Agent)).await.unwrap();

        let first = store
            .create_punishment(sanction(agent.id, admin.id, PunishmentType::Timeout), None)
            .await
            .unwrap();
        let second = store
            .create_punishment(sanction(agent.id, admin.id, PunishmentType::Demotion), None)
            .await
            .unwrap();
        assert_eq!(status_of(&store, agent.id).await, UserStatus::Punished);

        store
            .update_punishment(
                first.id,
                PunishmentStatus::Active,
                PunishmentPatch {
                    status: Some(PunishmentStatus::Completed),
                    ..PunishmentPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(status_of(&store, agent.id).await, UserStatus::Punished);

        store.soft_delete_punishment(second.id).await.unwrap();
        assert_eq!(status_of(&store, agent.id).await, UserStatus::Active);
    }

    #[tokio::test]
    async fn rewards_add_points_without_punishing() {
        let store = MemoryStore::new();
        let admin = store.create_user(new_user("root", Role::Administrator)).await.unwrap();
        let agent = store.create_user(new_user("a", Role::Agent)).await.unwrap();
        store
            .create_punishment(sanction(agent.id, admin.id, PunishmentType::Reward), Some(20))
            .await
            .unwrap();
        let user = store.find_user(agent.id).await.unwrap().unwrap();
        assert_eq!(user.status, UserStatus::Active);
        let stat = store.find_statistic(agent.id).await.unwrap().unwrap();
        assert_eq!(stat.points, 20);
    }

    #[tokio::test]
    async fn stale_punishment_update_conflicts() {
        let store = MemoryStore::new();
        let admin = store.create_user(new_user("root", Role::Administrator)).await.unwrap();
        let agent = store.create_user(new_user("a", Role::Agent)).await.unwrap();
        let p = store
            .create_punishment(sanction(agent.id, admin.id, PunishmentType::Timeout), None)
            .await
            .unwrap();
        let err = store
            .update_punishment(p.id, PunishmentStatus::Completed, PunishmentPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[tokio::test]
    async fn report_transition_awards_once() {
        let store = MemoryStore::new();
        let agent = store.create_user(new_user("a", Role::Agent)).await.unwrap();
        let report = store
            .create_report(
                NewReport {
                    title: String::from("t"),
                    description: String::from("d"),
                    report_type: ReportType::Capture,
                    author_id: Some(agent.id),
                },
                Some(agent.id),
            )
            .await
            .unwrap();
        let award = Some(Award {
            user_id: agent.id,
            points: 5,
        });

        store
            .transition_report(report.id, ReportStatus::Pending, ReportStatus::Approved, award)
            .await
            .unwrap();
        let again = store
            .transition_report(report.id, ReportStatus::Pending, ReportStatus::Approved, award)
            .await
            .unwrap_err();
        assert!(matches!(again, DbError::Conflict(_)));

        let stat = store.find_statistic(agent.id).await.unwrap().unwrap();
        assert_eq!(stat.reports_count, 1);
        assert_eq!(stat.points, 5);
    }

    #[tokio::test]
    async fn lists_are_newest_first_and_skip_tombstones() {
        let store = MemoryStore::new();
        for i in 0..3 {
            store
                .create_report(
                    NewReport {
                        title: format!("r{i}"),
                        description: String::new(),
                        report_type: ReportType::Anonymous,
                        author_id: None,
                    },
                    None,
                )
                .await
                .unwrap();
        }
        store.soft_delete_report(ReportId::new(2)).await.unwrap();

        let page = store
            .list_reports(ReportFilter::default(), PageRequest::first(10))
            .await
            .unwrap();
        let titles: Vec<_> = page.items.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["r2", "r0"]);
        assert_eq!(page.total_items, 2);
    }

    #[tokio::test]
    async fn standings_include_agents_without_rows() {
        let store = MemoryStore::new();
        let agent = store.create_user(new_user("a", Role::Agent)).await.unwrap();
        store.create_user(new_user("t", Role::Target)).await.unwrap();
        let standings = store.agent_standings().await.unwrap();
        assert_eq!(standings.len(), 1);
        assert_eq!(standings.first().map(|s| s.user_id), Some(agent.id));
    }

    #[tokio::test]
    async fn write_rankings_touches_only_ranking() {
        let store = MemoryStore::new();
        let agent = store.create_user(new_user("a", Role::Agent)).await.unwrap();
        store
            .increment(
                agent.id,
                StatDelta {
                    points: 40,
                    captures: 2,
                    reports: 1,
                },
            )
            .await
            .unwrap();
        store.write_rankings(&[(agent.id, 1)]).await.unwrap();
        let stat = store.find_statistic(agent.id).await.unwrap().unwrap();
        assert_eq!((stat.points, stat.captures_count, stat.reports_count, stat.ranking), (40, 2, 1, 1));
    }
}
