use async_trait::async_trait;
use thiserror::Error;

use triage_core::domain::category::{Category, CategoryId};
use triage_core::domain::suggestion::TicketPatch;
use triage_core::domain::ticket::{Ticket, TicketId, TicketPriority, TicketStatus};

pub mod category;
pub mod memory;
pub mod ticket;

pub use category::SqlCategoryRepository;
pub use memory::{InMemoryCategoryRepository, InMemoryTicketRepository};
pub use ticket::SqlTicketRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Fields accepted when creating a ticket. Omitted status/priority take the store defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub category_id: Option<CategoryId>,
}

impl NewTicket {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self { title: title.into(), description: description.into(), ..Self::default() }
    }
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn find_by_id(&self, id: TicketId) -> Result<Option<Ticket>, RepositoryError>;

    /// Newest first.
    async fn list(&self) -> Result<Vec<Ticket>, RepositoryError>;

    async fn create(&self, ticket: NewTicket) -> Result<Ticket, RepositoryError>;

    /// Writes the patched fields and bumps `updated_at`. `None` when the ticket does not exist.
    async fn apply_patch(
        &self,
        id: TicketId,
        patch: &TicketPatch,
    ) -> Result<Option<Ticket>, RepositoryError>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: TicketId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Ordered by name.
    async fn list(&self) -> Result<Vec<Category>, RepositoryError>;

    async fn create(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Category, RepositoryError>;
}
