//! The assembled backend: every workflow service wired to one store bundle.

use std::sync::Arc;

use chaos_db::Stores;

use crate::accounts::AccountService;
use crate::capture::CaptureService;
use crate::config::AuthConfig;
use crate::dashboard::DashboardService;
use crate::identity::{CredentialHasher, IdentityError, JwtIssuer, SaltedSha256, TokenIssuer};
use crate::punishment::PunishmentService;
use crate::ranking::RankingEngine;
use crate::report::ReportService;

/// Handles to all workflow services. Cheap to clone; every clone shares
/// the same stores.
#[derive(Clone)]
pub struct Backend {
    /// Registration, login, and user administration.
    pub accounts: AccountService,
    /// Capturing targets.
    pub captures: CaptureService,
    /// Assigning and transitioning punishments.
    pub punishments: PunishmentService,
    /// Filing and moderating reports.
    pub reports: ReportService,
    /// Leaderboard, statistics, and recalculation.
    pub ranking: RankingEngine,
    /// Per-role dashboards.
    pub dashboards: DashboardService,
}

impl Backend {
    /// Wire every service to `stores` with explicit identity collaborators.
    pub fn new(
        stores: Stores,
        tokens: Arc<dyn TokenIssuer>,
        hasher: Arc<dyn CredentialHasher>,
    ) -> Self {
        Self {
            accounts: AccountService::new(Arc::clone(&stores.users), tokens, hasher),
            captures: CaptureService::new(Arc::clone(&stores.users), Arc::clone(&stores.captures)),
            punishments: PunishmentService::new(
                Arc::clone(&stores.users),
                Arc::clone(&stores.punishments),
            ),
            reports: ReportService::new(Arc::clone(&stores.users), Arc::clone(&stores.reports)),
            ranking: RankingEngine::new(Arc::clone(&stores.statistics), Arc::clone(&stores.users)),
            dashboards: DashboardService::new(stores),
        }
    }

    /// Wire every service with a JWT issuer built from `auth` and the
    /// default credential hasher.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::WeakSecret`] if the signing secret is too
    /// short.
    pub fn from_auth_config(stores: Stores, auth: &AuthConfig) -> Result<Self, IdentityError> {
        let tokens = JwtIssuer::new(&auth.jwt_secret, &auth.issuer, auth.token_ttl_secs)?;
        Ok(Self::new(stores, Arc::new(tokens), Arc::new(SaltedSha256)))
    }
}
