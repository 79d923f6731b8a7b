//! `PostgreSQL` implementation of every store trait.
//!
//! Uses [`sqlx`] with runtime query construction (not compile-time checked)
//! so no live database is needed at build time. All queries are
//! parameterized.
//!
//! Every aggregate operation runs in one transaction. Counters are updated
//! with `SET col = col + $n` upserts, never read-then-write. Operations that
//! depend on a user's status lock that row with `FOR UPDATE` first, which
//! serializes concurrent captures of one target and concurrent punishment
//! changes for one agent.

use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use chaos_types::{
    Capture, CaptureId, Page, PageRequest, ParseEnumError, Punishment, PunishmentId,
    PunishmentStatus, Report, ReportId, ReportStatus, Role, Statistic, StatisticId, User, UserId,
    UserStatus,
};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use crate::error::DbError;
use crate::store::{
    Award, CaptureStore, NewCapture, NewPunishment, NewReport, NewUser, PunishmentFilter,
    PunishmentPatch, PunishmentStore, ReportFilter, ReportStore, Standing, StatDelta,
    StatOverride, StatisticStore, UserFilter, UserPatch, UserStore,
};

const USER_COLUMNS: &str = "id, username, email, role, status, created_at, updated_at, deleted_at";
const REPORT_COLUMNS: &str =
    "id, title, description, report_type, author_id, status, created_at, updated_at";
const PUNISHMENT_COLUMNS: &str = "id, target_id, assigned_by, punishment_type, description, status, expires_at, created_at, updated_at";
const STATISTIC_COLUMNS: &str =
    "id, user_id, captures_count, reports_count, points, ranking, updated_at";
const CAPTURE_COLUMNS: &str =
    "id, agent_id, target_id, captured_at, status, method, difficulty, points";

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn db_id(id: impl Into<u64>) -> Result<i64, DbError> {
    i64::try_from(id.into()).map_err(|e| DbError::Corrupt(format!("id out of range: {e}")))
}

fn domain_id(raw: i64) -> Result<u64, DbError> {
    u64::try_from(raw).map_err(|e| DbError::Corrupt(format!("negative id {raw}: {e}")))
}

fn parse_enum<T: FromStr<Err = ParseEnumError>>(raw: &str) -> Result<T, DbError> {
    raw.parse()
        .map_err(|e: ParseEnumError| DbError::Corrupt(e.to_string()))
}

fn db_count(raw: i64) -> u64 {
    u64::try_from(raw).unwrap_or(0)
}

fn page_bounds(page: PageRequest) -> (i64, i64) {
    (
        i64::try_from(page.limit()).unwrap_or(i64::MAX),
        i64::try_from(page.offset()).unwrap_or(i64::MAX),
    )
}

/// Map a unique-constraint violation to [`DbError::Conflict`].
fn map_unique(err: sqlx::Error, what: &str) -> DbError {
    if matches!(&err, sqlx::Error::Database(db) if db.is_unique_violation()) {
        DbError::Conflict(format!("{what} already exists"))
    } else {
        DbError::Postgres(err)
    }
}

/// Partial unique index allowing one `administrator` row.
const SINGLE_ADMINISTRATOR: &str = "users_single_administrator";

fn map_user_unique(err: sqlx::Error) -> DbError {
    if let sqlx::Error::Database(db) = &err
        && db.constraint() == Some(SINGLE_ADMINISTRATOR)
    {
        return DbError::Conflict(String::from("an administrator already exists"));
    }
    map_unique(err, "username or email")
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    role: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: UserId::new(domain_id(row.id)?),
            username: row.username,
            email: row.email,
            role: parse_enum(&row.role)?,
            status: parse_enum(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReportRow {
    id: i64,
    title: String,
    description: String,
    report_type: String,
    author_id: Option<i64>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReportRow> for Report {
    type Error = DbError;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ReportId::new(domain_id(row.id)?),
            title: row.title,
            description: row.description,
            report_type: parse_enum(&row.report_type)?,
            author_id: row.author_id.map(domain_id).transpose()?.map(UserId::new),
            status: parse_enum(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PunishmentRow {
    id: i64,
    target_id: i64,
    assigned_by: i64,
    punishment_type: String,
    description: String,
    status: String,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PunishmentRow> for Punishment {
    type Error = DbError;

    fn try_from(row: PunishmentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: PunishmentId::new(domain_id(row.id)?),
            target_id: UserId::new(domain_id(row.target_id)?),
            assigned_by: UserId::new(domain_id(row.assigned_by)?),
            punishment_type: parse_enum(&row.punishment_type)?,
            description: row.description,
            status: parse_enum(&row.status)?,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatisticRow {
    id: i64,
    user_id: i64,
    captures_count: i64,
    reports_count: i64,
    points: i64,
    ranking: i64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StatisticRow> for Statistic {
    type Error = DbError;

    fn try_from(row: StatisticRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: StatisticId::new(domain_id(row.id)?),
            user_id: UserId::new(domain_id(row.user_id)?),
            captures_count: row.captures_count,
            reports_count: row.reports_count,
            points: row.points,
            ranking: row.ranking,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CaptureRow {
    id: i64,
    agent_id: i64,
    target_id: i64,
    captured_at: DateTime<Utc>,
    status: String,
    method: String,
    difficulty: String,
    points: i64,
}

impl TryFrom<CaptureRow> for Capture {
    type Error = DbError;

    fn try_from(row: CaptureRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CaptureId::new(domain_id(row.id)?),
            agent_id: UserId::new(domain_id(row.agent_id)?),
            target_id: UserId::new(domain_id(row.target_id)?),
            captured_at: row.captured_at,
            status: parse_enum(&row.status)?,
            method: row.method,
            difficulty: parse_enum(&row.difficulty)?,
            points: row.points,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StandingRow {
    user_id: i64,
    username: String,
    statistic_id: Option<i64>,
    captures_count: Option<i64>,
    reports_count: Option<i64>,
    points: Option<i64>,
    ranking: Option<i64>,
    updated_at: Option<DateTime<Utc>>,
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, DbError>
where
    T: TryFrom<R, Error = DbError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ---------------------------------------------------------------------------
// Shared transactional steps
// ---------------------------------------------------------------------------

/// Lock a live user row and return its role and status.
async fn lock_user(conn: &mut PgConnection, id: i64) -> Result<(Role, UserStatus), DbError> {
    let row: Option<(String, String)> = sqlx::query_as(
        "SELECT role, status FROM users WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    let (role, status) = row.ok_or_else(|| DbError::not_found("user", id))?;
    Ok((parse_enum(&role)?, parse_enum(&status)?))
}

/// Atomically add `delta` to a user's counters, creating the row if absent.
async fn add_to_statistic(
    conn: &mut PgConnection,
    user: i64,
    delta: StatDelta,
) -> Result<Statistic, DbError> {
    let row: StatisticRow = sqlx::query_as(&format!(
        "INSERT INTO statistics (user_id, captures_count, reports_count, points)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (user_id) DO UPDATE SET
             captures_count = statistics.captures_count + EXCLUDED.captures_count,
             reports_count = statistics.reports_count + EXCLUDED.reports_count,
             points = statistics.points + EXCLUDED.points,
             updated_at = now()
         RETURNING {STATISTIC_COLUMNS}"
    ))
    .bind(user)
    .bind(delta.captures)
    .bind(delta.reports)
    .bind(delta.points)
    .fetch_one(&mut *conn)
    .await?;
    row.try_into()
}

async fn ensure_statistic_row(conn: &mut PgConnection, user: i64) -> Result<(), DbError> {
    sqlx::query("INSERT INTO statistics (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn ensure_unique(
    conn: &mut PgConnection,
    username: Option<&str>,
    email: Option<&str>,
    exclude: Option<i64>,
) -> Result<(), DbError> {
    let clash: Option<(String, String)> = sqlx::query_as(
        "SELECT username, email FROM users
         WHERE (username = $1 OR email = $2) AND ($3::BIGINT IS NULL OR id <> $3)
         LIMIT 1",
    )
    .bind(username)
    .bind(email)
    .bind(exclude)
    .fetch_optional(&mut *conn)
    .await?;
    match clash {
        Some((name, _)) if username == Some(name.as_str()) => Err(DbError::Conflict(format!(
            "username '{name}' is already taken"
        ))),
        Some((_, mail)) => Err(DbError::Conflict(format!(
            "email '{mail}' is already registered"
        ))),
        None => Ok(()),
    }
}

/// Re-derive a user's status from its live active sanctions. The caller
/// must already hold the row lock from [`lock_user`].
async fn reconcile_sanctions(conn: &mut PgConnection, target: i64) -> Result<(), DbError> {
    let (_, status) = lock_user(conn, target).await?;
    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM punishments
         WHERE target_id = $1 AND status = 'active' AND punishment_type <> 'reward'
           AND deleted_at IS NULL",
    )
    .bind(target)
    .fetch_one(&mut *conn)
    .await?;

    let next = if active > 0 {
        UserStatus::Punished
    } else if status == UserStatus::Punished {
        UserStatus::Active
    } else {
        status
    };
    if next != status {
        sqlx::query("UPDATE users SET status = $2, updated_at = now() WHERE id = $1")
            .bind(target)
            .bind(next.as_str())
            .execute(&mut *conn)
            .await?;
        tracing::debug!(user_id = target, from = %status, to = %next, "Reconciled sanction status");
    }
    Ok(())
}

fn push_user_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: UserFilter) -> Result<(), DbError> {
    if let Some(role) = filter.role {
        qb.push(" AND role = ").push_bind(role.as_str());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(id) = filter.id {
        qb.push(" AND id = ").push_bind(db_id(id)?);
    }
    Ok(())
}

fn push_report_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    filter: ReportFilter,
) -> Result<(), DbError> {
    if let Some(kind) = filter.report_type {
        qb.push(" AND report_type = ").push_bind(kind.as_str());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(author) = filter.author_id {
        qb.push(" AND author_id = ").push_bind(db_id(author)?);
    }
    Ok(())
}

fn push_punishment_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    filter: PunishmentFilter,
) -> Result<(), DbError> {
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(target) = filter.target_id {
        qb.push(" AND target_id = ").push_bind(db_id(target)?);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// PgStore
// ---------------------------------------------------------------------------

/// Entity store backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store bound to a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, DbError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(db_id(id)?)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND deleted_at IS NULL"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND deleted_at IS NULL"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn usernames(&self, ids: &[UserId]) -> Result<BTreeMap<UserId, String>, DbError> {
        let raw: Vec<i64> = ids.iter().map(|id| db_id(*id)).collect::<Result<_, _>>()?;
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, username FROM users WHERE id = ANY($1)")
                .bind(&raw)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|(id, name)| Ok((UserId::new(domain_id(id)?), name)))
            .collect()
    }

    async fn list_users(
        &self,
        filter: UserFilter,
        page: PageRequest,
    ) -> Result<Page<User>, DbError> {
        let (limit, offset) = page_bounds(page);
        let mut qb = QueryBuilder::new(format!(
            "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL"
        ));
        push_user_filter(&mut qb, filter)?;
        qb.push(" ORDER BY id LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows: Vec<UserRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        let total = self.count_users(filter).await?;
        Ok(Page::new(convert_all(rows)?, page, total))
    }

    async fn count_users(&self, filter: UserFilter) -> Result<u64, DbError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM users WHERE deleted_at IS NULL");
        push_user_filter(&mut qb, filter)?;
        let total: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(db_count(total))
    }

    async fn create_user(&self, new: NewUser) -> Result<User, DbError> {
        let mut tx = self.pool.begin().await?;
        ensure_unique(&mut tx, Some(&new.username), Some(&new.email), None).await?;

        let row: UserRow = sqlx::query_as(&format!(
            "INSERT INTO users (username, email, credential_hash, role)
             VALUES ($1, $2, $3, $4)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.credential_hash)
        .bind(new.role.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_user_unique)?;

        if new.role == Role::Agent {
            ensure_statistic_row(&mut tx, row.id).await?;
        }
        tx.commit().await?;

        let user = User::try_from(row)?;
        tracing::debug!(user_id = %user.id, role = %user.role, "Inserted user");
        Ok(user)
    }

    async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User, DbError> {
        let raw = db_id(id)?;
        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, raw).await?;
        ensure_unique(
            &mut tx,
            patch.username.as_deref(),
            patch.email.as_deref(),
            Some(raw),
        )
        .await?;

        let row: UserRow = sqlx::query_as(&format!(
            "UPDATE users SET
                 username = COALESCE($2, username),
                 email = COALESCE($3, email),
                 role = COALESCE($4, role),
                 status = COALESCE($5, status),
                 updated_at = now()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(raw)
        .bind(patch.username.as_deref())
        .bind(patch.email.as_deref())
        .bind(patch.role.map(Role::as_str))
        .bind(patch.status.map(UserStatus::as_str))
        .fetch_one(&mut *tx)
        .await
        .map_err(map_user_unique)?;

        if patch.role == Some(Role::Agent) {
            ensure_statistic_row(&mut tx, raw).await?;
        }
        tx.commit().await?;
        row.try_into()
    }

    async fn credential_hash(&self, id: UserId) -> Result<String, DbError> {
        let hash: Option<String> = sqlx::query_scalar(
            "SELECT credential_hash FROM users WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(db_id(id)?)
        .fetch_optional(&self.pool)
        .await?;
        hash.ok_or_else(|| DbError::not_found("user", id))
    }

    async fn set_credential_hash(&self, id: UserId, hash: String) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE users SET credential_hash = $2, updated_at = now()
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(db_id(id)?)
        .bind(hash)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("user", id));
        }
        Ok(())
    }

    async fn soft_delete_user(&self, id: UserId) -> Result<(), DbError> {
        let result =
            sqlx::query("UPDATE users SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL")
                .bind(db_id(id)?)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("user", id));
        }
        Ok(())
    }

    async fn restore_user(&self, id: UserId) -> Result<User, DbError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users SET deleted_at = NULL, updated_at = now()
             WHERE id = $1 AND deleted_at IS NOT NULL
             RETURNING {USER_COLUMNS}"
        ))
        .bind(db_id(id)?)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| DbError::not_found("deleted user", id))?
            .try_into()
    }
}

#[async_trait]
impl ReportStore for PgStore {
    async fn find_report(&self, id: ReportId) -> Result<Option<Report>, DbError> {
        let row: Option<ReportRow> = sqlx::query_as(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(db_id(id)?)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Report::try_from).transpose()
    }

    async fn list_reports(
        &self,
        filter: ReportFilter,
        page: PageRequest,
    ) -> Result<Page<Report>, DbError> {
        let (limit, offset) = page_bounds(page);
        let mut qb = QueryBuilder::new(format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE deleted_at IS NULL"
        ));
        push_report_filter(&mut qb, filter)?;
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows: Vec<ReportRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        let total = self.count_reports(filter).await?;
        Ok(Page::new(convert_all(rows)?, page, total))
    }

    async fn recent_reports(&self, limit: u64) -> Result<Vec<Report>, DbError> {
        let rows: Vec<ReportRow> = sqlx::query_as(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE deleted_at IS NULL
             ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn count_reports(&self, filter: ReportFilter) -> Result<u64, DbError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM reports WHERE deleted_at IS NULL");
        push_report_filter(&mut qb, filter)?;
        let total: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(db_count(total))
    }

    async fn create_report(
        &self,
        new: NewReport,
        credit: Option<UserId>,
    ) -> Result<Report, DbError> {
        let mut tx = self.pool.begin().await?;
        if let Some(author) = credit {
            let raw = db_id(author)?;
            lock_user(&mut tx, raw).await?;
            add_to_statistic(
                &mut tx,
                raw,
                StatDelta {
                    reports: 1,
                    ..StatDelta::default()
                },
            )
            .await?;
        }
        let author = new.author_id.map(db_id).transpose()?;
        let row: ReportRow = sqlx::query_as(&format!(
            "INSERT INTO reports (title, description, report_type, author_id)
             VALUES ($1, $2, $3, $4)
             RETURNING {REPORT_COLUMNS}"
        ))
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.report_type.as_str())
        .bind(author)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn transition_report(
        &self,
        id: ReportId,
        from: ReportStatus,
        to: ReportStatus,
        award: Option<Award>,
    ) -> Result<Report, DbError> {
        let raw = db_id(id)?;
        let mut tx = self.pool.begin().await?;
        let row: Option<ReportRow> = sqlx::query_as(&format!(
            "UPDATE reports SET status = $3, updated_at = now()
             WHERE id = $1 AND status = $2 AND deleted_at IS NULL
             RETURNING {REPORT_COLUMNS}"
        ))
        .bind(raw)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let current: Option<String> = sqlx::query_scalar(
                "SELECT status FROM reports WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(raw)
            .fetch_optional(&mut *tx)
            .await?;
            return Err(match current {
                Some(status) => {
                    DbError::Conflict(format!("report {id} is {status}, expected {from}"))
                }
                None => DbError::not_found("report", id),
            });
        };

        if let Some(award) = award {
            add_to_statistic(
                &mut tx,
                db_id(award.user_id)?,
                StatDelta {
                    points: award.points,
                    ..StatDelta::default()
                },
            )
            .await?;
        }
        tx.commit().await?;
        row.try_into()
    }

    async fn soft_delete_report(&self, id: ReportId) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE reports SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(db_id(id)?)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("report", id));
        }
        Ok(())
    }
}

#[async_trait]
impl PunishmentStore for PgStore {
    async fn find_punishment(&self, id: PunishmentId) -> Result<Option<Punishment>, DbError> {
        let row: Option<PunishmentRow> = sqlx::query_as(&format!(
            "SELECT {PUNISHMENT_COLUMNS} FROM punishments WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(db_id(id)?)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Punishment::try_from).transpose()
    }

    async fn list_punishments(
        &self,
        filter: PunishmentFilter,
        page: PageRequest,
    ) -> Result<Page<Punishment>, DbError> {
        let (limit, offset) = page_bounds(page);
        let mut qb = QueryBuilder::new(format!(
            "SELECT {PUNISHMENT_COLUMNS} FROM punishments WHERE deleted_at IS NULL"
        ));
        push_punishment_filter(&mut qb, filter)?;
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows: Vec<PunishmentRow> = qb.build_query_as().fetch_all(&self.pool).await?;

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM punishments WHERE deleted_at IS NULL");
        push_punishment_filter(&mut count, filter)?;
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(Page::new(convert_all(rows)?, page, db_count(total)))
    }

    async fn active_punishments(&self, target: UserId) -> Result<Vec<Punishment>, DbError> {
        let rows: Vec<PunishmentRow> = sqlx::query_as(&format!(
            "SELECT {PUNISHMENT_COLUMNS} FROM punishments
             WHERE target_id = $1 AND status = 'active' AND deleted_at IS NULL
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(db_id(target)?)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn count_active_punishments(&self) -> Result<u64, DbError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM punishments WHERE status = 'active' AND deleted_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(db_count(total))
    }

    async fn create_punishment(
        &self,
        new: NewPunishment,
        bonus_points: Option<i64>,
    ) -> Result<Punishment, DbError> {
        let target = db_id(new.target_id)?;
        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, target).await?;

        let row: PunishmentRow = sqlx::query_as(&format!(
            "INSERT INTO punishments (target_id, assigned_by, punishment_type, description, expires_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {PUNISHMENT_COLUMNS}"
        ))
        .bind(target)
        .bind(db_id(new.assigned_by)?)
        .bind(new.punishment_type.as_str())
        .bind(&new.description)
        .bind(new.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(points) = bonus_points {
            add_to_statistic(
                &mut tx,
                target,
                StatDelta {
                    points,
                    ..StatDelta::default()
                },
            )
            .await?;
        }
        reconcile_sanctions(&mut tx, target).await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn update_punishment(
        &self,
        id: PunishmentId,
        expected: PunishmentStatus,
        patch: PunishmentPatch,
    ) -> Result<Punishment, DbError> {
        let raw = db_id(id)?;
        let mut tx = self.pool.begin().await?;
        let current: Option<(i64, String)> = sqlx::query_as(
            "SELECT target_id, status FROM punishments
             WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(raw)
        .fetch_optional(&mut *tx)
        .await?;
        let (target, status) = current.ok_or_else(|| DbError::not_found("punishment", id))?;
        if status != expected.as_str() {
            return Err(DbError::Conflict(format!(
                "punishment {id} is {status}, expected {expected}"
            )));
        }
        lock_user(&mut tx, target).await?;

        let clear_expiry = matches!(patch.expires_at, Some(None));
        let row: PunishmentRow = sqlx::query_as(&format!(
            "UPDATE punishments SET
                 status = COALESCE($2, status),
                 description = COALESCE($3, description),
                 expires_at = CASE WHEN $5 THEN NULL ELSE COALESCE($4, expires_at) END,
                 updated_at = now()
             WHERE id = $1
             RETURNING {PUNISHMENT_COLUMNS}"
        ))
        .bind(raw)
        .bind(patch.status.map(PunishmentStatus::as_str))
        .bind(patch.description.as_deref())
        .bind(patch.expires_at.flatten())
        .bind(clear_expiry)
        .fetch_one(&mut *tx)
        .await?;

        reconcile_sanctions(&mut tx, target).await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn soft_delete_punishment(&self, id: PunishmentId) -> Result<Punishment, DbError> {
        let raw = db_id(id)?;
        let mut tx = self.pool.begin().await?;
        let target: Option<i64> = sqlx::query_scalar(
            "SELECT target_id FROM punishments WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(raw)
        .fetch_optional(&mut *tx)
        .await?;
        let target = target.ok_or_else(|| DbError::not_found("punishment", id))?;
        lock_user(&mut tx, target).await?;

        let row: PunishmentRow = sqlx::query_as(&format!(
            "UPDATE punishments SET deleted_at = now() WHERE id = $1
             RETURNING {PUNISHMENT_COLUMNS}"
        ))
        .bind(raw)
        .fetch_one(&mut *tx)
        .await?;

        reconcile_sanctions(&mut tx, target).await?;
        tx.commit().await?;
        row.try_into()
    }
}

#[async_trait]
impl StatisticStore for PgStore {
    async fn find_statistic(&self, user: UserId) -> Result<Option<Statistic>, DbError> {
        let row: Option<StatisticRow> = sqlx::query_as(&format!(
            "SELECT {STATISTIC_COLUMNS} FROM statistics WHERE user_id = $1"
        ))
        .bind(db_id(user)?)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Statistic::try_from).transpose()
    }

    async fn increment(&self, user: UserId, delta: StatDelta) -> Result<Statistic, DbError> {
        let mut conn = self.pool.acquire().await?;
        add_to_statistic(&mut conn, db_id(user)?, delta).await
    }

    async fn override_statistic(
        &self,
        user: UserId,
        values: StatOverride,
    ) -> Result<Statistic, DbError> {
        let row: StatisticRow = sqlx::query_as(&format!(
            "INSERT INTO statistics (user_id, captures_count, reports_count, points)
             VALUES ($1, COALESCE($2, 0), COALESCE($3, 0), COALESCE($4, 0))
             ON CONFLICT (user_id) DO UPDATE SET
                 captures_count = COALESCE($2, statistics.captures_count),
                 reports_count = COALESCE($3, statistics.reports_count),
                 points = COALESCE($4, statistics.points),
                 updated_at = now()
             RETURNING {STATISTIC_COLUMNS}"
        ))
        .bind(db_id(user)?)
        .bind(values.captures_count)
        .bind(values.reports_count)
        .bind(values.points)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn agent_standings(&self) -> Result<Vec<Standing>, DbError> {
        let rows: Vec<StandingRow> = sqlx::query_as(
            "SELECT u.id AS user_id, u.username, s.id AS statistic_id, s.captures_count,
                    s.reports_count, s.points, s.ranking, s.updated_at
             FROM users u
             LEFT JOIN statistics s ON s.user_id = u.id
             WHERE u.role = 'agent' AND u.deleted_at IS NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now();
        rows.into_iter()
            .map(|row| {
                let user_id = UserId::new(domain_id(row.user_id)?);
                let statistic = match row.statistic_id {
                    Some(stat_id) => Statistic {
                        id: StatisticId::new(domain_id(stat_id)?),
                        user_id,
                        captures_count: row.captures_count.unwrap_or(0),
                        reports_count: row.reports_count.unwrap_or(0),
                        points: row.points.unwrap_or(0),
                        ranking: row.ranking.unwrap_or(0),
                        updated_at: row.updated_at.unwrap_or(now),
                    },
                    None => Statistic::zeroed(user_id, now),
                };
                Ok(Standing {
                    user_id,
                    username: row.username,
                    statistic,
                })
            })
            .collect()
    }

    async fn write_rankings(&self, rankings: &[(UserId, i64)]) -> Result<(), DbError> {
        if rankings.is_empty() {
            return Ok(());
        }
        let mut users = Vec::with_capacity(rankings.len());
        let mut positions = Vec::with_capacity(rankings.len());
        for (user, ranking) in rankings {
            users.push(db_id(*user)?);
            positions.push(*ranking);
        }

        // One statement, so the whole snapshot lands or none of it does.
        sqlx::query(
            "INSERT INTO statistics (user_id, ranking)
             SELECT * FROM UNNEST($1::BIGINT[], $2::BIGINT[])
             ON CONFLICT (user_id) DO UPDATE SET ranking = EXCLUDED.ranking",
        )
        .bind(&users)
        .bind(&positions)
        .execute(&self.pool)
        .await?;

        tracing::debug!(count = rankings.len(), "Wrote rankings (batch UNNEST)");
        Ok(())
    }
}

#[async_trait]
impl CaptureStore for PgStore {
    async fn commit_capture(&self, new: NewCapture) -> Result<Capture, DbError> {
        let target = db_id(new.target_id)?;
        let agent = db_id(new.agent_id)?;
        let mut tx = self.pool.begin().await?;

        let (role, status) = lock_user(&mut tx, target).await?;
        if role != Role::Target {
            return Err(DbError::Conflict(format!(
                "user {} is not a target",
                new.target_id
            )));
        }
        if status == UserStatus::Captured {
            return Err(DbError::Conflict(format!(
                "target {} is already captured",
                new.target_id
            )));
        }

        sqlx::query("UPDATE users SET status = 'captured', updated_at = now() WHERE id = $1")
            .bind(target)
            .execute(&mut *tx)
            .await?;

        let points = new.difficulty.points();
        let row: CaptureRow = sqlx::query_as(&format!(
            "INSERT INTO captures (agent_id, target_id, method, difficulty, points)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {CAPTURE_COLUMNS}"
        ))
        .bind(agent)
        .bind(target)
        .bind(&new.method)
        .bind(new.difficulty.as_str())
        .bind(points)
        .fetch_one(&mut *tx)
        .await?;

        add_to_statistic(
            &mut tx,
            agent,
            StatDelta {
                captures: 1,
                points,
                ..StatDelta::default()
            },
        )
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn captures_by_agent(
        &self,
        agent: UserId,
        limit: Option<u64>,
    ) -> Result<Vec<Capture>, DbError> {
        let limit = limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));
        let rows: Vec<CaptureRow> = sqlx::query_as(&format!(
            "SELECT {CAPTURE_COLUMNS} FROM captures WHERE agent_id = $1
             ORDER BY captured_at DESC, id DESC LIMIT $2"
        ))
        .bind(db_id(agent)?)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn all_captures(&self) -> Result<Vec<Capture>, DbError> {
        let rows: Vec<CaptureRow> = sqlx::query_as(&format!(
            "SELECT {CAPTURE_COLUMNS} FROM captures ORDER BY captured_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn count_captures(&self) -> Result<u64, DbError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM captures")
            .fetch_one(&self.pool)
            .await?;
        Ok(db_count(total))
    }
}
