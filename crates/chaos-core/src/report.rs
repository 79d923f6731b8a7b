//! Reporting workflow.
//!
//! ```text
//! pending --moderate--> approved | rejected   (terminal)
//! ```
//!
//! Anonymous reports never carry an author, whoever files them. An agent
//! author is credited one report at creation and a fixed bonus when the
//! report is approved; the store's conditional transition guarantees the
//! bonus is paid at most once.

use std::sync::Arc;

use chaos_db::{Award, NewReport, ReportFilter, ReportStore, UserStore};
use chaos_types::{
    APPROVAL_BONUS_POINTS, Page, PageRequest, Report, ReportId, ReportStatus, ReportType, Role,
};
use serde::Deserialize;
use validator::Validate;

use crate::authz::{self, Action, Actor, Collection, ListScope};
use crate::error::CoreError;

/// Input for [`ReportService::create`].
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateReportInput {
    /// Short headline.
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    /// Full body.
    #[validate(length(min = 1))]
    pub description: String,
    /// `resistance`, `capture`, or `anonymous`.
    #[serde(rename = "type")]
    pub report_type: String,
}

/// Input for [`ReportService::update_status`].
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateReportStatusInput {
    /// `pending`, `approved`, or `rejected`.
    pub status: String,
}

/// Optional filters for [`ReportService::list`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportQuery {
    /// Only reports of this type.
    #[serde(rename = "type")]
    pub report_type: Option<String>,
    /// Only reports in this status.
    pub status: Option<String>,
}

/// Filing, moderating, and reading reports.
#[derive(Clone)]
pub struct ReportService {
    users: Arc<dyn UserStore>,
    reports: Arc<dyn ReportStore>,
}

impl ReportService {
    /// Create the service from its collaborators.
    pub const fn new(users: Arc<dyn UserStore>, reports: Arc<dyn ReportStore>) -> Self {
        Self { users, reports }
    }

    /// File a report as the acting user.
    pub async fn create(&self, actor: Actor, input: CreateReportInput) -> Result<Report, CoreError> {
        input.validate()?;
        let report_type: ReportType = input.report_type.parse()?;
        authz::require(actor, Action::CreateReport { report_type })?;

        let author = (report_type != ReportType::Anonymous).then_some(actor.id);
        let credit = author.filter(|_| actor.role == Role::Agent);
        let report = self
            .reports
            .create_report(
                NewReport {
                    title: input.title,
                    description: input.description,
                    report_type,
                    author_id: author,
                },
                credit,
            )
            .await?;

        tracing::info!(report_id = %report.id, %report_type, "Report filed");
        Ok(report)
    }

    /// One report, if the caller may see it.
    pub async fn get(&self, actor: Actor, id: ReportId) -> Result<Report, CoreError> {
        let report = self.find(id).await?;
        authz::require(
            actor,
            Action::ViewReport {
                report_type: report.report_type,
                author: report.author_id,
            },
        )?;
        Ok(report)
    }

    /// A page of reports within the caller's scope, newest first.
    pub async fn list(
        &self,
        actor: Actor,
        query: ReportQuery,
        page: PageRequest,
    ) -> Result<Page<Report>, CoreError> {
        let mut filter = ReportFilter {
            report_type: query.report_type.as_deref().map(str::parse).transpose()?,
            status: query.status.as_deref().map(str::parse).transpose()?,
            author_id: None,
        };
        match authz::list_scope(actor, Collection::Reports) {
            ListScope::All => {}
            ListScope::Owned(me) => filter.author_id = Some(me),
            ListScope::AnonymousOnly => match filter.report_type {
                None | Some(ReportType::Anonymous) => {
                    filter.report_type = Some(ReportType::Anonymous);
                }
                Some(_) => return Ok(Page::empty(page)),
            },
            ListScope::Empty => return Ok(Page::empty(page)),
        }
        Ok(self.reports.list_reports(filter, page).await?)
    }

    /// Moderate a report. Administrator only.
    ///
    /// Only `pending -> approved | rejected` is accepted; everything else,
    /// including approving an approved report, is a conflict.
    pub async fn update_status(
        &self,
        actor: Actor,
        id: ReportId,
        input: UpdateReportStatusInput,
    ) -> Result<Report, CoreError> {
        authz::require(actor, Action::ModerateReport)?;
        let next: ReportStatus = input.status.parse()?;
        let report = self.find(id).await?;
        if !report.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "report {id} cannot move from {} to {next}",
                report.status
            )));
        }

        let award = match (next, report.author_id) {
            (ReportStatus::Approved, Some(author)) => self
                .users
                .find_user(author)
                .await?
                .filter(|u| u.role == Role::Agent)
                .map(|u| Award {
                    user_id: u.id,
                    points: APPROVAL_BONUS_POINTS,
                }),
            _ => None,
        };

        let updated = self
            .reports
            .transition_report(id, report.status, next, award)
            .await?;
        tracing::info!(
            report_id = %id,
            from = %report.status,
            to = %next,
            awarded = award.is_some(),
            "Report moderated"
        );
        Ok(updated)
    }

    /// Soft-delete a report. Administrator, or the report's author.
    pub async fn delete(&self, actor: Actor, id: ReportId) -> Result<(), CoreError> {
        let report = self.find(id).await?;
        authz::require(
            actor,
            Action::DeleteReport {
                author: report.author_id,
            },
        )?;
        self.reports.soft_delete_report(id).await?;
        tracing::info!(report_id = %id, "Report deleted");
        Ok(())
    }

    /// The `limit` most recent reports. Administrator only.
    pub async fn recent(&self, actor: Actor, limit: u64) -> Result<Vec<Report>, CoreError> {
        authz::require(actor, Action::ViewRecentReports)?;
        Ok(self.reports.recent_reports(limit).await?)
    }

    async fn find(&self, id: ReportId) -> Result<Report, CoreError> {
        self.reports
            .find_report(id)
            .await?
            .ok_or_else(|| CoreError::not_found("report", id))
    }
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

    fn fixture() -> (Stores, ReportService) {
        let stores = Stores::from_backend(Arc::new(MemoryStore::new()));
        let service = ReportService::new(Arc::clone(&stores.users), Arc::clone(&stores.reports));
        (stores, service)
    }

    fn input(kind: &str) -> CreateReportInput {
        CreateReportInput {
            title: String::from("Firewall Configuration Changes"),
            description: String::from("Rules changed during off-hours."),
            report_type: kind.to_owned(),
        }
    }

    fn status(value: &str) -> UpdateReportStatusInput {
        UpdateReportStatusInput {
            status: value.to_owned(),
        }
    }

    #[tokio::test]
    async fn anonymous_reports_never_have_an_author() {
        let (stores, service) = fixture();
        let admin = user(&stores, "andrei", Role::Administrator).await;
        let alice = user(&stores, "alice", Role::Target).await;

        for actor in [admin, alice] {
            let report = service.create(actor, input("anonymous")).await.unwrap();
            assert_eq!(report.author_id, None);
            assert_eq!(report.status, ReportStatus::Pending);
        }
    }

    #[tokio::test]
    async fn agent_reports_are_credited_at_creation() {
        let (stores, service) = fixture();
        let alpha = user(&stores, "daemon_alpha", Role::Agent).await;
        let report = service.create(alpha, input("resistance")).await.unwrap();
        assert_eq!(report.author_id, Some(alpha.id));

        let stat = stores.statistics.find_statistic(alpha.id).await.unwrap().unwrap();
        assert_eq!(stat.reports_count, 1);
        assert_eq!(stat.points, 0);
    }

    #[tokio::test]
    async fn type_permissions_follow_the_role() {
        let (stores, service) = fixture();
        let alpha = user(&stores, "daemon_alpha", Role::Agent).await;
        let alice = user(&stores, "alice", Role::Target).await;
        assert!(matches!(
            service.create(alpha, input("anonymous")).await,
            Err(CoreError::Unauthorized(_))
        ));
        assert!(matches!(
            service.create(alice, input("capture")).await,
            Err(CoreError::Unauthorized(_))
        ));
        assert!(matches!(
            service.create(alice, input("gossip")).await,
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn rejection_awards_nothing_and_is_terminal() {
        let (stores, service) = fixture();
        let admin = user(&stores, "andrei", Role::Administrator).await;
        let beta = user(&stores, "daemon_beta", Role::Agent).await;
        let report = service.create(beta, input("capture")).await.unwrap();

        service.update_status(admin, report.id, status("rejected")).await.unwrap();
        assert!(matches!(
            service.update_status(admin, report.id, status("approved")).await,
            Err(CoreError::Conflict(_))
        ));
        let stat = stores.statistics.find_statistic(beta.id).await.unwrap().unwrap();
        assert_eq!(stat.points, 0);
    }

    #[tokio::test]
    async fn scoped_listing_and_reading() {
        let (stores, service) = fixture();
        let admin = user(&stores, "andrei", Role::Administrator).await;
        let alpha = user(&stores, "daemon_alpha", Role::Agent).await;
        let beta = user(&stores, "daemon_beta", Role::Agent).await;
        let alice = user(&stores, "alice", Role::Target).await;

        let own = service.create(alpha, input("capture")).await.unwrap();
        service.create(beta, input("capture")).await.unwrap();
        let anon = service.create(alice, input("anonymous")).await.unwrap();

        let page = PageRequest::first(10);
        assert_eq!(service.list(admin, ReportQuery::default(), page).await.unwrap().total_items, 3);
        let mine = service.list(alpha, ReportQuery::default(), page).await.unwrap();
        assert_eq!(mine.items.iter().map(|r| r.id).collect::<Vec<_>>(), vec![own.id]);
        let anonymous = service.list(alice, ReportQuery::default(), page).await.unwrap();
        assert_eq!(anonymous.items.iter().map(|r| r.id).collect::<Vec<_>>(), vec![anon.id]);
        let filtered = ReportQuery {
            report_type: Some(String::from("capture")),
            status: None,
        };
        assert!(service.list(alice, filtered, page).await.unwrap().items.is_empty());

        assert!(service.get(alpha, own.id).await.is_ok());
        assert!(service.get(beta, own.id).await.is_err());
        assert!(service.get(alice, anon.id).await.is_ok());
        assert!(service.get(alice, own.id).await.is_err());
    }

    #[tokio::test]
    async fn authors_delete_their_own_reports() {
        let (stores, service) = fixture();
        let alpha = user(&stores, "daemon_alpha", Role::Agent).await;
        let beta = user(&stores, "daemon_beta", Role::Agent).await;
        let alice = user(&stores, "alice", Role::Target).await;
        let report = service.create(alpha, input("capture")).await.unwrap();
        let anon = service.create(alice, input("anonymous")).await.unwrap();

        assert!(matches!(
            service.delete(beta, report.id).await,
            Err(CoreError::Unauthorized(_))
        ));
        assert!(matches!(
            service.delete(alice, anon.id).await,
            Err(CoreError::Unauthorized(_))
        ));
        service.delete(alpha, report.id).await.unwrap();
        assert!(matches!(
            service.get(alpha, report.id).await,
            Err(CoreError::NotFound(_))
        ));
    }
}
