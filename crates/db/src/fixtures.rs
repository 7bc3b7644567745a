use chrono::{SecondsFormat, Utc};

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Demo categories. `Access` and `Data` are the names the keyword guardrails look up.
const SEED_CATEGORIES: &[(&str, &str)] = &[
    ("Access", "Authentication, roles and permission problems"),
    ("Billing", "Invoices, charges and refunds"),
    ("Bug", "Functional defects in the product"),
    ("Data", "Exports, imports and data formatting issues"),
    ("Incident", "Global outage or unavailability"),
];

#[derive(Debug, Clone, Copy)]
struct SeedTicket {
    title: &'static str,
    description: &'static str,
    status: &'static str,
    priority: &'static str,
}

const SEED_TICKETS: &[SeedTicket] = &[
    SeedTicket {
        title: "Cannot open admin dashboard",
        description: "Since this morning I get a 403 forbidden error when opening /admin. \
                      Nothing changed on my account as far as I know.",
        status: "OPEN",
        priority: "MEDIUM",
    },
    SeedTicket {
        title: "CSV export uses the wrong separator",
        description: "The monthly export puts every column in a single cell. The separator \
                      looks like a comma instead of a semicolon.",
        status: "OPEN",
        priority: "LOW",
    },
    SeedTicket {
        title: "Charged twice this month",
        description: "Our card was charged twice for the March invoice. Please refund the \
                      duplicate payment.",
        status: "OPEN",
        priority: "MEDIUM",
    },
    SeedTicket {
        title: "Whole platform unreachable",
        description: "No user in our company can load the application, every page times out \
                      since 09:00.",
        status: "OPEN",
        priority: "HIGH",
    },
    SeedTicket {
        title: "Typo on pricing page",
        description: "The word subscription is misspelled in the pricing table footer.",
        status: "CLOSED",
        priority: "LOW",
    },
];

/// Deterministic demo dataset for local triage runs. Loading is idempotent.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let mut categories_inserted = 0;
        for (name, description) in SEED_CATEGORIES {
            let result = sqlx::query(
                "INSERT INTO category (name, description) VALUES (?1, ?2)
                 ON CONFLICT(name) DO NOTHING",
            )
            .bind(name)
            .bind(description)
            .execute(&mut *tx)
            .await?;
            categories_inserted += result.rows_affected();
        }

        let mut tickets_inserted = 0;
        for ticket in SEED_TICKETS {
            let result = sqlx::query(
                "INSERT INTO ticket (title, description, status, priority, created_at, updated_at)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?5
                 WHERE NOT EXISTS (SELECT 1 FROM ticket WHERE title = ?1)",
            )
            .bind(ticket.title)
            .bind(ticket.description)
            .bind(ticket.status)
            .bind(ticket.priority)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            tickets_inserted += result.rows_affected();
        }

        tx.commit().await?;

        Ok(SeedResult { categories_inserted, tickets_inserted })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for (name, _) in SEED_CATEGORIES {
            let exists: i64 =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM category WHERE name = ?1)")
                    .bind(name)
                    .fetch_one(pool)
                    .await?;
            checks.push((*name, exists == 1));
        }

        for ticket in SEED_TICKETS {
            let exists: i64 =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM ticket WHERE title = ?1)")
                    .bind(ticket.title)
                    .fetch_one(pool)
                    .await?;
            checks.push((ticket.title, exists == 1));
        }

        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes seeded rows only; tickets created by hand are left alone.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        for ticket in SEED_TICKETS {
            sqlx::query("DELETE FROM ticket WHERE title = ?1")
                .bind(ticket.title)
                .execute(&mut *tx)
                .await?;
        }
        for (name, _) in SEED_CATEGORIES {
            sqlx::query("DELETE FROM category WHERE name = ?1").bind(name).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedResult {
    pub categories_inserted: u64,
    pub tickets_inserted: u64,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
