//! Punishment workflow.
//!
//! ```text
//! active --update--> completed | cancelled   (terminal)
//! ```
//!
//! Sanctions (`timeout`, `demotion`, `extra_tasks`) hold their agent in
//! `punished` status while active. Rewards never punish; they credit a
//! fixed bonus on creation. The punished-status invariant is maintained by
//! the store, which re-derives the target's status from all of its active
//! sanctions inside every mutation.

use std::sync::Arc;

use chaos_db::{NewPunishment, PunishmentFilter, PunishmentPatch, PunishmentStore, UserStore};
use chaos_types::{
    Page, PageRequest, Punishment, PunishmentId, PunishmentStatus, PunishmentType,
    REWARD_BONUS_POINTS, Role, UserId,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::authz::{self, Action, Actor, Collection, ListScope};
use crate::error::CoreError;

/// Input for [`PunishmentService::assign`].
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AssignPunishmentInput {
    /// The agent to punish or reward.
    pub target_id: UserId,
    /// `timeout`, `demotion`, `extra_tasks`, or `reward`.
    #[serde(rename = "type")]
    pub punishment_type: String,
    /// Free-form explanation.
    #[validate(length(min = 1))]
    pub description: String,
    /// Optional RFC 3339 end time.
    pub expires_at: Option<String>,
}

/// Input for [`PunishmentService::update`]. Absent fields are unchanged;
/// an empty `expires_at` clears the expiry.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdatePunishmentInput {
    /// New status.
    pub status: Option<String>,
    /// New description.
    #[validate(length(min = 1))]
    pub description: Option<String>,
    /// New RFC 3339 end time.
    pub expires_at: Option<String>,
}

/// Optional filters for [`PunishmentService::list`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PunishmentQuery {
    /// Only punishments in this status.
    pub status: Option<String>,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CoreError::InvalidInput(format!("expires_at '{raw}' is not RFC 3339: {e}")))
}

/// Assigning, transitioning, and reading punishments.
#[derive(Clone)]
pub struct PunishmentService {
    users: Arc<dyn UserStore>,
    punishments: Arc<dyn PunishmentStore>,
}

impl PunishmentService {
    /// Create the service from its collaborators.
    pub const fn new(users: Arc<dyn UserStore>, punishments: Arc<dyn PunishmentStore>) -> Self {
        Self { users, punishments }
    }

    /// Assign a punishment or reward to an agent. Administrator only.
    pub async fn assign(
        &self,
        actor: Actor,
        input: AssignPunishmentInput,
    ) -> Result<Punishment, CoreError> {
        authz::require(actor, Action::AssignPunishment)?;
        input.validate()?;
        let punishment_type: PunishmentType = input.punishment_type.parse()?;
        let expires_at = input.expires_at.as_deref().map(parse_timestamp).transpose()?;

        let target = self
            .users
            .find_user(input.target_id)
            .await?
            .ok_or_else(|| CoreError::not_found("user", input.target_id))?;
        if target.role != Role::Agent {
            return Err(CoreError::InvalidInput(format!(
                "punishments apply to agents, user {} is a {}",
                target.id, target.role
            )));
        }

        let bonus = (punishment_type == PunishmentType::Reward).then_some(REWARD_BONUS_POINTS);
        let punishment = self
            .punishments
            .create_punishment(
                NewPunishment {
                    target_id: target.id,
                    assigned_by: actor.id,
                    punishment_type,
                    description: input.description,
                    expires_at,
                },
                bonus,
            )
            .await?;

        tracing::info!(
            punishment_id = %punishment.id,
            target_id = %target.id,
            punishment_type = %punishment_type,
            "Punishment assigned"
        );
        Ok(punishment)
    }

    /// Change status, description, or expiry. Administrator only.
    ///
    /// Requesting the current status again leaves it alone; any other move
    /// out of a terminal status is a conflict.
    pub async fn update(
        &self,
        actor: Actor,
        id: PunishmentId,
        input: UpdatePunishmentInput,
    ) -> Result<Punishment, CoreError> {
        authz::require(actor, Action::ManagePunishments)?;
        input.validate()?;
        let next: Option<PunishmentStatus> = input.status.as_deref().map(str::parse).transpose()?;
        let expires_at = match input.expires_at.as_deref() {
            None => None,
            Some("") => Some(None),
            Some(raw) => Some(Some(parse_timestamp(raw)?)),
        };

        let current = self
            .punishments
            .find_punishment(id)
            .await?
            .ok_or_else(|| CoreError::not_found("punishment", id))?;
        if let Some(next) = next
            && !current.status.can_transition_to(next)
        {
            return Err(CoreError::Conflict(format!(
                "punishment {id} cannot move from {} to {next}",
                current.status
            )));
        }

        let updated = self
            .punishments
            .update_punishment(
                id,
                current.status,
                PunishmentPatch {
                    status: next.filter(|s| *s != current.status),
                    description: input.description,
                    expires_at,
                },
            )
            .await?;

        if updated.status != current.status {
            tracing::info!(
                punishment_id = %id,
                target_id = %updated.target_id,
                from = %current.status,
                to = %updated.status,
                "Punishment transitioned"
            );
        }
        Ok(updated)
    }

    /// Soft-delete a punishment. Administrator only.
    pub async fn delete(&self, actor: Actor, id: PunishmentId) -> Result<(), CoreError> {
        authz::require(actor, Action::ManagePunishments)?;
        let removed = self.punishments.soft_delete_punishment(id).await?;
        tracing::info!(
            punishment_id = %id,
            target_id = %removed.target_id,
            "Punishment deleted"
        );
        Ok(())
    }

    /// One punishment. Administrator, or the agent it targets.
    pub async fn get(&self, actor: Actor, id: PunishmentId) -> Result<Punishment, CoreError> {
        let punishment = self
            .punishments
            .find_punishment(id)
            .await?
            .ok_or_else(|| CoreError::not_found("punishment", id))?;
        authz::require(
            actor,
            Action::ViewPunishment {
                target: punishment.target_id,
            },
        )?;
        Ok(punishment)
    }

    /// A page of punishments within the caller's scope.
    pub async fn list(
        &self,
        actor: Actor,
        query: PunishmentQuery,
        page: PageRequest,
    ) -> Result<Page<Punishment>, CoreError> {
        let mut filter = PunishmentFilter {
            status: query.status.as_deref().map(str::parse).transpose()?,
            target_id: None,
        };
        match authz::list_scope(actor, Collection::Punishments) {
            ListScope::All => {}
            ListScope::Owned(me) => filter.target_id = Some(me),
            ListScope::AnonymousOnly | ListScope::Empty => return Ok(Page::empty(page)),
        }
        Ok(self.punishments.list_punishments(filter, page).await?)
    }

    /// Active punishments of one agent. Administrator, or that agent.
    pub async fn active_for(
        &self,
        actor: Actor,
        target: UserId,
    ) -> Result<Vec<Punishment>, CoreError> {
        authz::require(actor, Action::ViewActivePunishments { target })?;
        Ok(self.punishments.active_punishments(target).await?)
    }
}
