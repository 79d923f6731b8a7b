//! Capture workflow.
//!
//! ```text
//! target.status: active | punished --capture(by agent)--> captured
//! ```
//!
//! The status flip, the capture record, and the agent's statistic credit
//! are committed by [`CaptureStore::commit_capture`] as one operation. The
//! checks here fail fast with a precise error; the store re-checks under
//! its own lock so two agents racing for one target cannot both win.

use std::collections::BTreeSet;
use std::sync::Arc;

use chaos_db::{CaptureStore, NewCapture, UserFilter, UserStore};
use chaos_types::{
    CAPTURE_METHOD, Capture, CaptureView, Difficulty, PageRequest, Role, User, UserId, UserStatus,
};

use crate::authz::{self, Action, Actor};
use crate::error::CoreError;

/// How many capturable targets are listed at most.
const CAPTURE_TARGETS_LIMIT: u64 = 100;

/// Capturing targets and reading capture history.
#[derive(Clone)]
pub struct CaptureService {
    users: Arc<dyn UserStore>,
    captures: Arc<dyn CaptureStore>,
}

impl CaptureService {
    /// Create the service from its collaborators.
    pub const fn new(users: Arc<dyn UserStore>, captures: Arc<dyn CaptureStore>) -> Self {
        Self { users, captures }
    }

    /// Capture `target_id` on behalf of the acting agent.
    ///
    /// Difficulty is derived from the target's ID and the points from the
    /// difficulty, so repeating the computation for the same target always
    /// gives the same award.
    pub async fn capture(&self, actor: Actor, target_id: UserId) -> Result<Capture, CoreError> {
        let target = self
            .users
            .find_user(target_id)
            .await?
            .ok_or_else(|| CoreError::not_found("user", target_id))?;
        authz::require(
            actor,
            Action::Capture {
                target_role: target.role,
            },
        )?;
        if target.status == UserStatus::Captured {
            return Err(CoreError::Conflict(format!(
                "target {target_id} is already captured"
            )));
        }

        let difficulty = Difficulty::for_target(target_id);
        let capture = self
            .captures
            .commit_capture(NewCapture {
                agent_id: actor.id,
                target_id,
                method: CAPTURE_METHOD.to_owned(),
                difficulty,
            })
            .await?;

        tracing::info!(
            agent_id = %actor.id,
            target_id = %target_id,
            %difficulty,
            points = capture.points,
            "Target captured"
        );
        Ok(capture)
    }

    /// Targets that can currently be captured, by ID.
    pub async fn capture_targets(&self, actor: Actor) -> Result<Vec<User>, CoreError> {
        authz::require(actor, Action::ViewCaptureTargets)?;
        let page = self
            .users
            .list_users(
                UserFilter {
                    role: Some(Role::Target),
                    status: Some(UserStatus::Active),
                    id: None,
                },
                PageRequest::first(CAPTURE_TARGETS_LIMIT),
            )
            .await?;
        Ok(page.items)
    }

    /// Captures made by `agent`, newest first.
    pub async fn agent_captures(
        &self,
        actor: Actor,
        agent: UserId,
    ) -> Result<Vec<CaptureView>, CoreError> {
        authz::require(actor, Action::ViewCaptures { agent })?;
        let captures = self.captures.captures_by_agent(agent, None).await?;
        capture_views(self.users.as_ref(), captures).await
    }

    /// Every capture, newest first. Administrator only.
    pub async fn all_captures(&self, actor: Actor) -> Result<Vec<CaptureView>, CoreError> {
        authz::require(actor, Action::ViewAllCaptures)?;
        let captures = self.captures.all_captures().await?;
        capture_views(self.users.as_ref(), captures).await
    }
}

/// Join capture records with the usernames of both parties. Deleted users
/// keep their names.
pub(crate) async fn capture_views(
    users: &dyn UserStore,
    captures: Vec<Capture>,
) -> Result<Vec<CaptureView>, CoreError> {
    let ids: BTreeSet<UserId> = captures
        .iter()
        .flat_map(|c| [c.agent_id, c.target_id])
        .collect();
    let ids: Vec<UserId> = ids.into_iter().collect();
    let names = users.usernames(&ids).await?;
    let name_of = |id: UserId| names.get(&id).cloned().unwrap_or_default();
    Ok(captures
        .into_iter()
        .map(|capture| CaptureView {
            agent_username: name_of(capture.agent_id),
            target_username: name_of(capture.target_id),
            capture,
        })
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chaos_db::{MemoryStore, NewUser, StatisticStore, Stores};

    async fn user(stores: &Stores, name: &str, role: Role) -> Actor {
        let user = stores
            .users
            .create_user(NewUser {
                username: name.to_owned(),
                email: format!("{name}@chaos.dev"),
                credential_hash: String::from("salt$hash"),
                role,
            })
            .await
            .unwrap();
        Actor::new(user.id, user.role)
    }

    fn fixture() -> (Stores, CaptureService) {
        let stores = Stores::from_backend(Arc::new(MemoryStore::new()));
        let service = CaptureService::new(Arc::clone(&stores.users), Arc::clone(&stores.captures));
        (stores, service)
    }

    #[tokio::test]
    async fn capture_credits_agent_and_flips_target() {
        let (stores, service) = fixture();
        let agent = user(&stores, "daemon_alpha", Role::Agent).await;
        let target = user(&stores, "alice", Role::Target).await;

        let capture = service.capture(agent, target.id).await.unwrap();
        assert_eq!(capture.difficulty, Difficulty::for_target(target.id));
        assert_eq!(capture.points, capture.difficulty.points());
        assert_eq!(capture.method, CAPTURE_METHOD);

        let stat = stores.statistics.find_statistic(agent.id).await.unwrap().unwrap();
        assert_eq!(stat.captures_count, 1);
        assert_eq!(stat.points, capture.points);
        let status = stores.users.find_user(target.id).await.unwrap().unwrap().status;
        assert_eq!(status, UserStatus::Captured);
    }

    #[tokio::test]
    async fn second_capture_conflicts_and_changes_nothing() {
        let (stores, service) = fixture();
        let agent = user(&stores, "daemon_alpha", Role::Agent).await;
        let target = user(&stores, "alice", Role::Target).await;

        service.capture(agent, target.id).await.unwrap();
        let err = service.capture(agent, target.id).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let stat = stores.statistics.find_statistic(agent.id).await.unwrap().unwrap();
        assert_eq!(stat.captures_count, 1);
    }

    #[tokio::test]
    async fn only_agents_capture_and_only_targets_are_captured() {
        let (stores, service) = fixture();
        let admin = user(&stores, "andrei", Role::Administrator).await;
        let agent = user(&stores, "daemon_alpha", Role::Agent).await;
        let other_agent = user(&stores, "daemon_beta", Role::Agent).await;
        let target = user(&stores, "alice", Role::Target).await;

        assert!(matches!(
            service.capture(admin, target.id).await,
            Err(CoreError::Unauthorized(_))
        ));
        assert!(matches!(
            service.capture(agent, other_agent.id).await,
            Err(CoreError::Unauthorized(_))
        ));
        assert!(matches!(
            service.capture(agent, UserId::new(999)).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn capture_views_carry_usernames() {
        let (stores, service) = fixture();
        let admin = user(&stores, "andrei", Role::Administrator).await;
        let agent = user(&stores, "daemon_alpha", Role::Agent).await;
        let target = user(&stores, "alice", Role::Target).await;
        service.capture(agent, target.id).await.unwrap();

        let views = service.all_captures(admin).await.unwrap();
        assert_eq!(views.len(), 1);
        let view = views.first().unwrap();
        assert_eq!(view.agent_username, "daemon_alpha");
        assert_eq!(view.target_username, "alice");

        let own = service.agent_captures(agent, agent.id).await.unwrap();
        assert_eq!(own.len(), 1);
        assert!(service.all_captures(agent).await.is_err());
    }

    #[tokio::test]
    async fn captured_targets_leave_the_target_list() {
        let (stores, service) = fixture();
        let agent = user(&stores, "daemon_alpha", Role::Agent).await;
        let alice = user(&stores, "alice", Role::Target).await;
        user(&stores, "bob", Role::Target).await;

        assert_eq!(service.capture_targets(agent).await.unwrap().len(), 2);
        service.capture(agent, alice.id).await.unwrap();
        let remaining = service.capture_targets(agent).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining.iter().all(|u| u.username == "bob"));
    }
}
