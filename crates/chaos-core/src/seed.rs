//! Demo data for a fresh installation.
//!
//! Accounts are created whenever their username is missing. The reports,
//! statistics, and punishments that bring the game to life are only added
//! the first time, when the administrator itself had to be created, so a
//! restart never duplicates them.
//!
//! Everything goes through the regular workflow services, so seeded data
//! obeys the same invariants as data created over the API.

use std::collections::BTreeMap;

use chaos_types::{ReportType, Role};
use chrono::{TimeDelta, Utc};

use crate::accounts::RegisterInput;
use crate::authz::Actor;
use crate::backend::Backend;
use crate::error::CoreError;
use crate::punishment::AssignPunishmentInput;
use crate::ranking::StatOverrideInput;
use crate::report::{CreateReportInput, UpdateReportStatusInput};

const ADMINISTRATOR: &str = "andrei";

struct SeedUser {
    username: &'static str,
    email: &'static str,
    password: &'static str,
    role: Role,
}

const USERS: [SeedUser; 10] = [
    SeedUser {
        username: ADMINISTRATOR,
        email: "andrei@chaos.dev",
        password: "AndreI2024!",
        role: Role::Administrator,
    },
    SeedUser {
        username: "daemon_alpha",
        email: "alpha@daemon.chaos",
        password: "DaemonAlpha123!",
        role: Role::Agent,
    },
    SeedUser {
        username: "daemon_beta",
        email: "beta@daemon.chaos",
        password: "DaemonBeta123!",
        role: Role::Agent,
    },
    SeedUser {
        username: "daemon_gamma",
        email: "gamma@daemon.chaos",
        password: "DaemonGamma123!",
        role: Role::Agent,
    },
    SeedUser {
        username: "daemon_delta",
        email: "delta@daemon.chaos",
        password: "DaemonDelta123!",
        role: Role::Agent,
    },
    SeedUser {
        username: "daemon_omega",
        email: "omega@daemon.chaos",
        password: "DaemonOmega123!",
        role: Role::Agent,
    },
    SeedUser {
        username: "alice",
        email: "alice@resistance.net",
        password: "Alice123!",
        role: Role::Target,
    },
    SeedUser {
        username: "bob",
        email: "bob@resistance.net",
        password: "Bob123!",
        role: Role::Target,
    },
    SeedUser {
        username: "chalier",
        email: "chalier@resistance.net",
        password: "Chalier123!",
        role: Role::Target,
    },
    SeedUser {
        username: "diana",
        email: "diana@resistance.net",
        password: "Diana123!",
        role: Role::Target,
    },
];

struct SeedReport {
    title: &'static str,
    description: &'static str,
    report_type: ReportType,
    filed_by: &'static str,
    approved: bool,
}

const REPORTS: [SeedReport; 8] = [
    SeedReport {
        title: "Successful Server Infiltration",
        description: "Gained root access to the main database server through an injectable \
                      login form. Extracted user credentials and system configurations.",
        report_type: ReportType::Capture,
        filed_by: "daemon_alpha",
        approved: true,
    },
    SeedReport {
        title: "Network Admin Behavioral Analysis",
        description: "Network admin 'alice' has been working late hours and accessing \
                      unusual network segments. Recommend increased surveillance.",
        report_type: ReportType::Capture,
        filed_by: "daemon_beta",
        approved: false,
    },
    SeedReport {
        title: "Social Engineering Success",
        description: "Extracted VPN credentials from a junior network admin through a \
                      phishing campaign posing as an IT security test.",
        report_type: ReportType::Capture,
        filed_by: "daemon_delta",
        approved: true,
    },
    SeedReport {
        title: "Firewall Configuration Changes",
        description: "Firewall rules were modified during off-hours to allow outbound \
                      traffic on non-standard ports.",
        report_type: ReportType::Resistance,
        filed_by: "daemon_alpha",
        approved: true,
    },
    SeedReport {
        title: "Suspicious Daemon Activity Detected",
        description: "Someone is accessing server rooms during night shifts when no \
                      maintenance is scheduled.",
        report_type: ReportType::Anonymous,
        filed_by: "alice",
        approved: false,
    },
    SeedReport {
        title: "Potential Network Compromise",
        description: "Internal monitoring shows data exfiltration during off-peak hours \
                      that does not match normal business operations.",
        report_type: ReportType::Anonymous,
        filed_by: "bob",
        approved: false,
    },
    SeedReport {
        title: "Physical Security Breach",
        description: "Bypassed keycard security and planted network monitoring devices \
                      in the main server room.",
        report_type: ReportType::Capture,
        filed_by: "daemon_omega",
        approved: true,
    },
    SeedReport {
        title: "Emergency: Admin Credentials Compromised",
        description: "Login attempts from unknown locations suggest my credentials have \
                      been compromised. Please investigate immediately.",
        report_type: ReportType::Anonymous,
        filed_by: "diana",
        approved: true,
    },
];

/// `(agent, captures_count, reports_count, points)`
const STATISTICS: [(&str, i64, i64, i64); 5] = [
    ("daemon_alpha", 8, 12, 120),
    ("daemon_beta", 5, 8, 85),
    ("daemon_gamma", 3, 4, 45),
    ("daemon_delta", 6, 9, 95),
    ("daemon_omega", 10, 15, 150),
];

const PUNISHED_AGENT: &str = "daemon_gamma";

/// What a seeding run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedSummary {
    /// Usernames created by this run.
    pub created_users: Vec<String>,
    /// Whether reports, statistics, and punishments were added.
    pub demo_data: bool,
}

/// Create the demo accounts, and on a fresh installation the demo game
/// state.
pub async fn seed(backend: &Backend) -> Result<SeedSummary, CoreError> {
    let fresh = backend
        .accounts
        .find_by_username(ADMINISTRATOR)
        .await?
        .is_none();

    let mut actors = BTreeMap::new();
    let mut created_users = Vec::new();
    for account in &USERS {
        let user = match backend.accounts.find_by_username(account.username).await? {
            Some(user) => user,
            None => {
                let user = backend
                    .accounts
                    .create_account(RegisterInput {
                        username: account.username.to_owned(),
                        email: account.email.to_owned(),
                        password: account.password.to_owned(),
                        role: account.role.as_str().to_owned(),
                    })
                    .await?;
                created_users.push(user.username.clone());
                user
            }
        };
        actors.insert(account.username, Actor::new(user.id, user.role));
    }

    if !fresh {
        tracing::info!(
            created = created_users.len(),
            "Seed data already present, only missing accounts were created"
        );
        return Ok(SeedSummary {
            created_users,
            demo_data: false,
        });
    }

    let admin = actor(&actors, ADMINISTRATOR)?;
    seed_reports(backend, &actors, admin).await?;
    seed_statistics(backend, &actors, admin).await?;
    seed_punishments(backend, &actors, admin).await?;
    backend.ranking.recalculate(admin).await?;

    tracing::info!(
        users = created_users.len(),
        reports = REPORTS.len(),
        "Demo data seeded"
    );
    Ok(SeedSummary {
        created_users,
        demo_data: true,
    })
}

fn actor(actors: &BTreeMap<&str, Actor>, username: &str) -> Result<Actor, CoreError> {
    actors
        .get(username)
        .copied()
        .ok_or_else(|| CoreError::not_found("user", username))
}

async fn seed_reports(
    backend: &Backend,
    actors: &BTreeMap<&str, Actor>,
    admin: Actor,
) -> Result<(), CoreError> {
    for entry in &REPORTS {
        let report = backend
            .reports
            .create(
                actor(actors, entry.filed_by)?,
                CreateReportInput {
                    title: entry.title.to_owned(),
                    description: entry.description.to_owned(),
                    report_type: entry.report_type.as_str().to_owned(),
                },
            )
            .await?;
        if entry.approved {
            backend
                .reports
                .update_status(
                    admin,
                    report.id,
                    UpdateReportStatusInput {
                        status: String::from("approved"),
                    },
                )
                .await?;
        }
    }
    Ok(())
}

async fn seed_statistics(
    backend: &Backend,
    actors: &BTreeMap<&str, Actor>,
    admin: Actor,
) -> Result<(), CoreError> {
    for (agent, captures_count, reports_count, points) in STATISTICS {
        backend
            .ranking
            .override_statistics(
                admin,
                actor(actors, agent)?.id,
                StatOverrideInput {
                    captures_count: Some(captures_count),
                    reports_count: Some(reports_count),
                    points: Some(points),
                },
            )
            .await?;
    }
    Ok(())
}

async fn seed_punishments(
    backend: &Backend,
    actors: &BTreeMap<&str, Actor>,
    admin: Actor,
) -> Result<(), CoreError> {
    let target_id = actor(actors, PUNISHED_AGENT)?.id;
    let suspension_end = Utc::now()
        .checked_add_signed(TimeDelta::hours(48))
        .map(|t| t.to_rfc3339());

    let sanctions = [
        (
            "timeout",
            "Excessive system access during unauthorized hours. 48-hour network access \
             suspension for security review.",
            suspension_end,
        ),
        (
            "extra_tasks",
            "Additional security protocol documentation required. Must complete a \
             comprehensive security audit report within 72 hours.",
            None,
        ),
    ];
    for (kind, description, expires_at) in sanctions {
        backend
            .punishments
            .assign(
                admin,
                AssignPunishmentInput {
                    target_id,
                    punishment_type: kind.to_owned(),
                    description: description.to_owned(),
                    expires_at,
                },
            )
            .await?;
    }
    Ok(())
}
