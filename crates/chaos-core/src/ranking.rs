//! Ranking engine.
//!
//! Agents are ordered by a single comparator, [`compare`]: points
//! descending, then captures descending, then user ID ascending. Every read
//! path (leaderboard, statistics, dashboards) computes positions live with
//! it. The persisted `ranking` column is a snapshot written only by
//! [`RankingEngine::recalculate`], using the same comparator, so the two
//! agree right after each recalculation.

use std::cmp::Ordering;
use std::sync::Arc;

use chaos_db::{Standing, StatOverride, StatisticStore, UserStore};
use chaos_types::{
    LeaderboardEntry, MAX_STATISTIC_VALUE, Role, Statistic, StatisticView, UserId,
};
use serde::Deserialize;

use crate::authz::{self, Action, Actor};
use crate::error::CoreError;

/// Ordering of two agents on the leaderboard; `Less` ranks higher.
pub fn compare(a: &Standing, b: &Standing) -> Ordering {
    b.statistic
        .points
        .cmp(&a.statistic.points)
        .then_with(|| b.statistic.captures_count.cmp(&a.statistic.captures_count))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// Input for [`RankingEngine::override_statistics`]. Absent counters are
/// left as they are.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct StatOverrideInput {
    /// New capture count.
    pub captures_count: Option<i64>,
    /// New report count.
    pub reports_count: Option<i64>,
    /// New point total.
    pub points: Option<i64>,
}

/// Leaderboard reads, statistics, and ranking recalculation.
#[derive(Clone)]
pub struct RankingEngine {
    statistics: Arc<dyn StatisticStore>,
    users: Arc<dyn UserStore>,
}

impl RankingEngine {
    /// Create the engine from its collaborators.
    pub const fn new(statistics: Arc<dyn StatisticStore>, users: Arc<dyn UserStore>) -> Self {
        Self { statistics, users }
    }

    /// Recompute and persist the ranking of every agent. Administrator only.
    ///
    /// The write is all or nothing and touches only the `ranking` column,
    /// so concurrent captures never lose points to a recalculation.
    pub async fn recalculate(&self, actor: Actor) -> Result<Vec<LeaderboardEntry>, CoreError> {
        authz::require(actor, Action::RecalculateRanking)?;
        self.persist_rankings().await
    }

    /// The top `limit` agents.
    pub async fn leaderboard(
        &self,
        actor: Actor,
        limit: u64,
    ) -> Result<Vec<LeaderboardEntry>, CoreError> {
        authz::require(actor, Action::ViewLeaderboard)?;
        leaderboard(self.statistics.as_ref(), limit).await
    }

    /// One agent's counters and live position. An agent without a row
    /// reads as all zero.
    pub async fn statistics(&self, actor: Actor, user: UserId) -> Result<StatisticView, CoreError> {
        authz::require(actor, Action::ViewStatistics { user })?;
        self.require_agent(user).await?;
        statistic_view(self.statistics.as_ref(), user).await
    }

    /// Overwrite any subset of an agent's counters, then recalculate.
    /// Administrator only. Values must lie in `0..=MAX_STATISTIC_VALUE`.
    pub async fn override_statistics(
        &self,
        actor: Actor,
        user: UserId,
        input: StatOverrideInput,
    ) -> Result<StatisticView, CoreError> {
        authz::require(actor, Action::OverrideStatistics)?;
        let values = [input.captures_count, input.reports_count, input.points];
        if values.iter().flatten().any(|v| *v < 0) {
            return Err(CoreError::InvalidInput(String::from(
                "statistic values cannot be negative",
            )));
        }
        if values.iter().flatten().any(|v| *v > MAX_STATISTIC_VALUE) {
            return Err(CoreError::InvalidInput(format!(
                "statistic values cannot exceed {MAX_STATISTIC_VALUE}"
            )));
        }
        self.require_agent(user).await?;

        self.statistics
            .override_statistic(
                user,
                StatOverride {
                    captures_count: input.captures_count,
                    reports_count: input.reports_count,
                    points: input.points,
                },
            )
            .await?;
        tracing::info!(user_id = %user, ?input, "Statistics overridden");

        self.persist_rankings().await?;
        statistic_view(self.statistics.as_ref(), user).await
    }

    async fn persist_rankings(&self) -> Result<Vec<LeaderboardEntry>, CoreError> {
        let standings = standings(self.statistics.as_ref()).await?;
        let rankings: Vec<(UserId, i64)> = (1_i64..)
            .zip(&standings)
            .map(|(rank, standing)| (standing.user_id, rank))
            .collect();
        self.statistics.write_rankings(&rankings).await?;
        tracing::info!(agents = rankings.len(), "Ranking recalculated");
        Ok(entries(standings))
    }

    async fn require_agent(&self, id: UserId) -> Result<(), CoreError> {
        let user = self
            .users
            .find_user(id)
            .await?
            .ok_or_else(|| CoreError::not_found("user", id))?;
        if user.role == Role::Agent {
            Ok(())
        } else {
            Err(CoreError::InvalidInput(format!(
                "user {id} is not an agent and has no statistics"
            )))
        }
    }
}

/// Every live agent, best first.
pub(crate) async fn standings(
    statistics: &dyn StatisticStore,
) -> Result<Vec<Standing>, CoreError> {
    let mut standings = statistics.agent_standings().await?;
    standings.sort_by(compare);
    Ok(standings)
}

/// The top `limit` agents with their live positions.
pub(crate) async fn leaderboard(
    statistics: &dyn StatisticStore,
    limit: u64,
) -> Result<Vec<LeaderboardEntry>, CoreError> {
    let mut entries = entries(standings(statistics).await?);
    entries.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    Ok(entries)
}

/// An agent's counters with its live position, zeroed when it has no row.
pub(crate) async fn statistic_view(
    statistics: &dyn StatisticStore,
    user: UserId,
) -> Result<StatisticView, CoreError> {
    let standings = standings(statistics).await?;
    let found = (1_u64..)
        .zip(standings)
        .find(|(_, standing)| standing.user_id == user);
    Ok(match found {
        Some((position, standing)) => StatisticView {
            statistic: standing.statistic,
            position,
        },
        None => StatisticView {
            statistic: Statistic::zeroed(user, chrono::Utc::now()),
            position: 0,
        },
    })
}

fn entries(standings: Vec<Standing>) -> Vec<LeaderboardEntry> {
    (1_u64..)
        .zip(standings)
        .map(|(position, standing)| LeaderboardEntry {
            position,
            user_id: standing.user_id,
            username: standing.username,
            points: standing.statistic.points,
            captures_count: standing.statistic.captures_count,
            reports_count: standing.statistic.reports_count,
        })
        .collect()
}
