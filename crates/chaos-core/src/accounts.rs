//! Account management: registration, login, profiles, and the
//! administrator's user CRUD.
//!
//! The single-administrator invariant is enforced here: a second
//! administrator cannot be registered, no user can be promoted to or
//! demoted from the role, and the administrator cannot be deleted.

use std::sync::Arc;

use chaos_db::{NewUser, UserFilter, UserPatch, UserStore};
use chaos_types::{Page, PageRequest, PopulationStats, Role, User, UserId, UserStatus};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::authz::{self, Action, Actor, Collection, ListScope};
use crate::error::CoreError;
use crate::identity::{CredentialHasher, TokenIssuer};

/// Input for [`AccountService::register`].
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterInput {
    /// Unique login name.
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    /// Unique contact address.
    #[validate(email)]
    pub email: String,
    /// Initial password.
    #[validate(length(min = 6))]
    pub password: String,
    /// `administrator`, `agent`, or `target`.
    pub role: String,
}

/// Input for [`AccountService::login`].
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginInput {
    /// Login name.
    #[validate(length(min = 1))]
    pub username: String,
    /// Password.
    #[validate(length(min = 1))]
    pub password: String,
}

/// Result of a successful login.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    /// Bearer token for subsequent calls.
    pub token: String,
    /// The authenticated user.
    pub user: User,
}

/// Input for [`AccountService::change_password`].
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChangePasswordInput {
    /// The current password.
    pub old_password: String,
    /// The replacement password.
    #[validate(length(min = 6))]
    pub new_password: String,
}

/// Input for [`AccountService::update_user`]. Absent fields are unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateUserInput {
    /// New login name.
    #[validate(length(min = 3, max = 50))]
    pub username: Option<String>,
    /// New contact address.
    #[validate(email)]
    pub email: Option<String>,
    /// New role.
    pub role: Option<String>,
    /// New status.
    pub status: Option<String>,
}

/// Optional filters for [`AccountService::list_users`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserQuery {
    /// Only users with this role.
    pub role: Option<String>,
    /// Only users with this status.
    pub status: Option<String>,
}

/// Registration, authentication, and user administration.
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenIssuer>,
    hasher: Arc<dyn CredentialHasher>,
}

impl AccountService {
    /// Create the service from its collaborators.
    pub const fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenIssuer>,
        hasher: Arc<dyn CredentialHasher>,
    ) -> Self {
        Self {
            users,
            tokens,
            hasher,
        }
    }

    /// Create an account. Administrator only.
    pub async fn register(&self, actor: Actor, input: RegisterInput) -> Result<User, CoreError> {
        authz::require(actor, Action::RegisterUser)?;
        self.create_account(input).await
    }

    /// Create an account without an acting user. Used to bootstrap the
    /// administrator before anyone can authenticate. The store rejects a
    /// second administrator atomically with the insert.
    pub(crate) async fn create_account(&self, input: RegisterInput) -> Result<User, CoreError> {
        input.validate()?;
        let role: Role = input.role.parse()?;

        let user = self
            .users
            .create_user(NewUser {
                username: input.username,
                email: input.email,
                credential_hash: self.hasher.hash(&input.password),
                role,
            })
            .await?;
        tracing::info!(user_id = %user.id, username = %user.username, role = %user.role, "User registered");
        Ok(user)
    }

    /// Exchange a username and password for a bearer token.
    pub async fn login(&self, input: LoginInput) -> Result<LoginOutcome, CoreError> {
        input.validate()?;
        let invalid = || CoreError::Unauthorized(String::from("invalid credentials"));

        let user = self
            .users
            .find_user_by_username(&input.username)
            .await?
            .ok_or_else(invalid)?;
        let stored = self.users.credential_hash(user.id).await?;
        if !self.hasher.verify(&input.password, &stored) {
            tracing::warn!(username = %input.username, "Login rejected");
            return Err(invalid());
        }

        let token = self.tokens.issue_token(&user).map_err(|e| {
            tracing::error!(error = %e, "Token issuance failed");
            CoreError::Storage(String::from("could not issue token"))
        })?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok(LoginOutcome { token, user })
    }

    /// Resolve a bearer token into the acting user.
    ///
    /// The role comes from the store, not the token, and deleted accounts
    /// are rejected.
    pub async fn authenticate(&self, token: &str) -> Result<Actor, CoreError> {
        let claims = self.tokens.verify_token(token).map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            CoreError::Unauthorized(String::from("invalid or expired token"))
        })?;
        let user = self
            .users
            .find_user(claims.user_id)
            .await?
            .ok_or_else(|| CoreError::Unauthorized(String::from("account no longer exists")))?;
        Ok(Actor::new(user.id, user.role))
    }

    /// The caller's own record.
    pub async fn profile(&self, actor: Actor) -> Result<User, CoreError> {
        self.users
            .find_user(actor.id)
            .await?
            .ok_or_else(|| CoreError::not_found("user", actor.id))
    }

    /// Replace the caller's password after verifying the current one.
    pub async fn change_password(
        &self,
        actor: Actor,
        input: ChangePasswordInput,
    ) -> Result<(), CoreError> {
        input.validate()?;
        let stored = self.users.credential_hash(actor.id).await?;
        if !self.hasher.verify(&input.old_password, &stored) {
            return Err(CoreError::Unauthorized(String::from(
                "current password is incorrect",
            )));
        }
        self.users
            .set_credential_hash(actor.id, self.hasher.hash(&input.new_password))
            .await?;
        tracing::info!(user_id = %actor.id, "Password changed");
        Ok(())
    }

    /// One user record. Administrator, or the user itself.
    pub async fn get_user(&self, actor: Actor, id: UserId) -> Result<User, CoreError> {
        authz::require(actor, Action::ViewUser { user: id })?;
        self.users
            .find_user(id)
            .await?
            .ok_or_else(|| CoreError::not_found("user", id))
    }

    /// A page of users. Non-administrators only ever see themselves.
    pub async fn list_users(
        &self,
        actor: Actor,
        query: UserQuery,
        page: PageRequest,
    ) -> Result<Page<User>, CoreError> {
        let mut filter = UserFilter {
            role: query.role.as_deref().map(str::parse).transpose()?,
            status: query.status.as_deref().map(str::parse).transpose()?,
            id: None,
        };
        match authz::list_scope(actor, Collection::Users) {
            ListScope::All => {}
            ListScope::Owned(me) => filter.id = Some(me),
            ListScope::AnonymousOnly | ListScope::Empty => return Ok(Page::empty(page)),
        }
        Ok(self.users.list_users(filter, page).await?)
    }

    /// Apply a partial update to a user. Administrator only.
    pub async fn update_user(
        &self,
        actor: Actor,
        id: UserId,
        input: UpdateUserInput,
    ) -> Result<User, CoreError> {
        authz::require(actor, Action::ManageUsers)?;
        input.validate()?;
        let user = self
            .users
            .find_user(id)
            .await?
            .ok_or_else(|| CoreError::not_found("user", id))?;

        let role: Option<Role> = input.role.as_deref().map(str::parse).transpose()?;
        let status: Option<UserStatus> = input.status.as_deref().map(str::parse).transpose()?;

        let role = role.filter(|r| *r != user.role);
        if let Some(next) = role {
            if next == Role::Administrator || user.role == Role::Administrator {
                return Err(CoreError::Conflict(String::from(
                    "the administrator role cannot be granted or revoked",
                )));
            }
            if user.status != UserStatus::Active {
                return Err(CoreError::Conflict(format!(
                    "user {id} is {} and cannot change role",
                    user.status
                )));
            }
        }

        let status = status.filter(|s| *s != user.status);
        if let Some(next) = status {
            if next == UserStatus::Punished || user.status == UserStatus::Punished {
                return Err(CoreError::Conflict(String::from(
                    "punished status follows active sanctions and cannot be set directly",
                )));
            }
            if next == UserStatus::Captured && role.unwrap_or(user.role) != Role::Target {
                return Err(CoreError::InvalidInput(String::from(
                    "only targets can be captured",
                )));
            }
        }

        let updated = self
            .users
            .update_user(
                id,
                UserPatch {
                    username: input.username,
                    email: input.email,
                    role,
                    status,
                },
            )
            .await?;
        tracing::info!(user_id = %id, "User updated");
        Ok(updated)
    }

    /// Soft-delete a user. Administrator only; the administrator itself
    /// cannot be deleted.
    pub async fn delete_user(&self, actor: Actor, id: UserId) -> Result<(), CoreError> {
        authz::require(actor, Action::ManageUsers)?;
        let user = self
            .users
            .find_user(id)
            .await?
            .ok_or_else(|| CoreError::not_found("user", id))?;
        if user.role == Role::Administrator {
            return Err(CoreError::Conflict(String::from(
                "the administrator cannot be deleted",
            )));
        }
        self.users.soft_delete_user(id).await?;
        tracing::info!(user_id = %id, "User deleted");
        Ok(())
    }

    /// Undo a soft delete. Administrator only.
    pub async fn restore_user(&self, actor: Actor, id: UserId) -> Result<User, CoreError> {
        authz::require(actor, Action::ManageUsers)?;
        let user = self.users.restore_user(id).await?;
        tracing::info!(user_id = %id, "User restored");
        Ok(user)
    }

    /// User counts by role and status. Administrator only.
    pub async fn population(&self, actor: Actor) -> Result<PopulationStats, CoreError> {
        authz::require(actor, Action::ManageUsers)?;
        population(self.users.as_ref()).await
    }

    /// Look up a live user by username.
    pub(crate) async fn find_by_username(&self, username: &str) -> Result<Option<User>, CoreError> {
        Ok(self.users.find_user_by_username(username).await?)
    }
}

/// Count live users by role and by status.
pub(crate) async fn population(users: &dyn UserStore) -> Result<PopulationStats, CoreError> {
    let by_role = |role| UserFilter {
        role: Some(role),
        ..UserFilter::default()
    };
    let by_status = |status| UserFilter {
        status: Some(status),
        ..UserFilter::default()
    };
    Ok(PopulationStats {
        total_users: users.count_users(UserFilter::default()).await?,
        administrators: users.count_users(by_role(Role::Administrator)).await?,
        agents: users.count_users(by_role(Role::Agent)).await?,
        targets: users.count_users(by_role(Role::Target)).await?,
        active: users.count_users(by_status(UserStatus::Active)).await?,
        captured: users.count_users(by_status(UserStatus::Captured)).await?,
        punished: users.count_users(by_status(UserStatus::Punished)).await?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chaos_db::MemoryStore;

    use crate::identity::{JwtIssuer, SaltedSha256};

    const SECRET: &str = "account-tests-secret-long-enough-000000";

    fn service() -> AccountService {
        AccountService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(JwtIssuer::new(SECRET, "chaos", 3600).unwrap()),
            Arc::new(SaltedSha256),
        )
    }

    fn input(username: &str, role: &str) -> RegisterInput {
        RegisterInput {
            username: username.to_owned(),
            email: format!("{username}@chaos.dev"),
            password: String::from("Secret123!"),
            role: role.to_owned(),
        }
    }

    async fn with_admin() -> (AccountService, Actor) {
        let accounts = service();
        let admin = accounts.create_account(input("andrei", "administrator")).await.unwrap();
        (accounts, Actor::new(admin.id, admin.role))
    }

    #[tokio::test]
    async fn second_administrator_is_rejected() {
        let (accounts, admin) = with_admin().await;
        let err = accounts
            .register(admin, input("usurper", "administrator"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn racing_bootstraps_create_one_administrator() {
        let accounts = service();
        let (first, second) = futures::join!(
            accounts.create_account(input("andrei", "administrator")),
            accounts.create_account(input("mallory", "administrator")),
        );
        assert_eq!(usize::from(first.is_ok()) + usize::from(second.is_ok()), 1);
        let err = first.err().or(second.err()).unwrap();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn only_the_administrator_registers() {
        let (accounts, admin) = with_admin().await;
        let agent = accounts.register(admin, input("daemon_alpha", "agent")).await.unwrap();
        let as_agent = Actor::new(agent.id, agent.role);
        let err = accounts
            .register(as_agent, input("daemon_beta", "agent"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn malformed_registration_is_invalid_input() {
        let (accounts, admin) = with_admin().await;
        let err = accounts
            .register(admin, input("x", "agent"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
        let err = accounts
            .register(admin, input("wizard", "wizard"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn login_and_authenticate() {
        let (accounts, admin) = with_admin().await;
        accounts.register(admin, input("alice", "target")).await.unwrap();

        let outcome = accounts
            .login(LoginInput {
                username: String::from("alice"),
                password: String::from("Secret123!"),
            })
            .await
            .unwrap();
        let actor = accounts.authenticate(&outcome.token).await.unwrap();
        assert_eq!(actor.id, outcome.user.id);
        assert_eq!(actor.role, Role::Target);

        let err = accounts
            .login(LoginInput {
                username: String::from("alice"),
                password: String::from("wrong-password"),
            })
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::Unauthorized(String::from("invalid credentials")));
    }

    #[tokio::test]
    async fn deleted_users_cannot_authenticate() {
        let (accounts, admin) = with_admin().await;
        let bob = accounts.register(admin, input("bob", "target")).await.unwrap();
        let token = accounts
            .login(LoginInput {
                username: String::from("bob"),
                password: String::from("Secret123!"),
            })
            .await
            .unwrap()
            .token;

        accounts.delete_user(admin, bob.id).await.unwrap();
        assert!(matches!(
            accounts.authenticate(&token).await,
            Err(CoreError::Unauthorized(_))
        ));

        accounts.restore_user(admin, bob.id).await.unwrap();
        assert!(accounts.authenticate(&token).await.is_ok());
    }

    #[tokio::test]
    async fn change_password_requires_the_old_one() {
        let (accounts, admin) = with_admin().await;
        let wrong = accounts
            .change_password(
                admin,
                ChangePasswordInput {
                    old_password: String::from("nope"),
                    new_password: String::from("NewSecret1!"),
                },
            )
            .await;
        assert!(matches!(wrong, Err(CoreError::Unauthorized(_))));

        accounts
            .change_password(
                admin,
                ChangePasswordInput {
                    old_password: String::from("Secret123!"),
                    new_password: String::from("NewSecret1!"),
                },
            )
            .await
            .unwrap();
        assert!(
            accounts
                .login(LoginInput {
                    username: String::from("andrei"),
                    password: String::from("NewSecret1!"),
                })
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn administrator_cannot_be_deleted_or_demoted() {
        let (accounts, admin) = with_admin().await;
        assert!(matches!(
            accounts.delete_user(admin, admin.id).await,
            Err(CoreError::Conflict(_))
        ));
        let demote = UpdateUserInput {
            role: Some(String::from("agent")),
            ..UpdateUserInput::default()
        };
        assert!(matches!(
            accounts.update_user(admin, admin.id, demote).await,
            Err(CoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn punished_status_cannot_be_set_by_hand() {
        let (accounts, admin) = with_admin().await;
        let agent = accounts.register(admin, input("daemon_beta", "agent")).await.unwrap();
        let update = UpdateUserInput {
            status: Some(String::from("punished")),
            ..UpdateUserInput::default()
        };
        assert!(matches!(
            accounts.update_user(admin, agent.id, update).await,
            Err(CoreError::Conflict(_))
        ));

        let capture_agent = UpdateUserInput {
            status: Some(String::from("captured")),
            ..UpdateUserInput::default()
        };
        assert!(matches!(
            accounts.update_user(admin, agent.id, capture_agent).await,
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn non_admins_list_only_themselves() {
        let (accounts, admin) = with_admin().await;
        let alice = accounts.register(admin, input("alice", "target")).await.unwrap();
        accounts.register(admin, input("bob", "target")).await.unwrap();

        let all = accounts
            .list_users(admin, UserQuery::default(), PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(all.total_items, 3);

        let own = accounts
            .list_users(
                Actor::new(alice.id, alice.role),
                UserQuery::default(),
                PageRequest::first(10),
            )
            .await
            .unwrap();
        assert_eq!(own.total_items, 1);
        assert_eq!(own.items.first().map(|u| u.id), Some(alice.id));
    }

    #[tokio::test]
    async fn population_counts_roles_and_statuses() {
        let (accounts, admin) = with_admin().await;
        accounts.register(admin, input("daemon_alpha", "agent")).await.unwrap();
        accounts.register(admin, input("alice", "target")).await.unwrap();
        let stats = accounts.population(admin).await.unwrap();
        assert_eq!(stats.total_users, 3);
        assert_eq!(stats.administrators, 1);
        assert_eq!(stats.agents, 1);
        assert_eq!(stats.targets, 1);
        assert_eq!(stats.active, 3);
    }
}
