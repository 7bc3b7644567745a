use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;

use triage_core::domain::category::CategoryId;
use triage_core::domain::suggestion::TicketPatch;
use triage_core::domain::ticket::{Ticket, TicketId, TicketPriority, TicketStatus};

use super::{NewTicket, RepositoryError, TicketRepository};
use crate::DbPool;

const TICKET_COLUMNS: &str =
    "id, title, description, status, priority, category_id, created_at, updated_at";

pub struct SqlTicketRepository {
    pool: DbPool,
}

impl SqlTicketRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Fixed-width UTC timestamps so `ORDER BY created_at` sorts chronologically.
fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_err(error: impl ToString) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

fn row_to_ticket(row: &sqlx::sqlite::SqliteRow) -> Result<Ticket, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(decode_err)?;
    let title: String = row.try_get("title").map_err(decode_err)?;
    let description: String = row.try_get("description").map_err(decode_err)?;
    let status_str: String = row.try_get("status").map_err(decode_err)?;
    let priority_str: String = row.try_get("priority").map_err(decode_err)?;
    let category_id: Option<i64> = row.try_get("category_id").map_err(decode_err)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at_str: String = row.try_get("updated_at").map_err(decode_err)?;

    Ok(Ticket {
        id: TicketId(id),
        title,
        description,
        status: status_str.parse::<TicketStatus>().map_err(decode_err)?,
        priority: priority_str.parse::<TicketPriority>().map_err(decode_err)?,
        category_id: category_id.map(CategoryId),
        created_at: parse_timestamp("created_at", &created_at_str)?,
        updated_at: parse_timestamp("updated_at", &updated_at_str)?,
    })
}

#[async_trait::async_trait]
impl TicketRepository for SqlTicketRepository {
    async fn find_by_id(&self, id: TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TICKET_COLUMNS} FROM ticket WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_ticket).transpose()
    }

    async fn list(&self) -> Result<Vec<Ticket>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM ticket ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_ticket).collect()
    }

    async fn create(&self, ticket: NewTicket) -> Result<Ticket, RepositoryError> {
        let now = timestamp_now();
        let status = ticket.status.unwrap_or_default();
        let priority = ticket.priority.unwrap_or_default();

        let row = sqlx::query(&format!(
            "INSERT INTO ticket (title, description, status, priority, category_id,
                                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(&ticket.title)
        .bind(&ticket.description)
        .bind(status.as_str())
        .bind(priority.as_str())
        .bind(ticket.category_id.map(|id| id.0))
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        row_to_ticket(&row)
    }

    async fn apply_patch(
        &self,
        id: TicketId,
        patch: &TicketPatch,
    ) -> Result<Option<Ticket>, RepositoryError> {
        let row = sqlx::query(&format!(
            "UPDATE ticket
             SET category_id = COALESCE(?, category_id),
                 priority = ?,
                 status = ?,
                 updated_at = ?
             WHERE id = ?
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(patch.category_id.map(|category| category.0))
        .bind(patch.priority.as_str())
        .bind(patch.status.as_str())
        .bind(timestamp_now())
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_ticket).transpose()
    }

    async fn delete(&self, id: TicketId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM ticket WHERE id = ?").bind(id.0).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
