use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::RwLock;

use triage_core::domain::category::{Category, CategoryId};
use triage_core::domain::suggestion::TicketPatch;
use triage_core::domain::ticket::{Ticket, TicketId};

use super::{CategoryRepository, NewTicket, RepositoryError, TicketRepository};

#[derive(Default)]
pub struct InMemoryTicketRepository {
    tickets: RwLock<BTreeMap<i64, Ticket>>,
}

impl InMemoryTicketRepository {
    /// Inserts a ticket exactly as given, keeping its id and timestamps.
    pub async fn insert(&self, ticket: Ticket) {
        let mut tickets = self.tickets.write().await;
        tickets.insert(ticket.id.0, ticket);
    }
}

#[async_trait::async_trait]
impl TicketRepository for InMemoryTicketRepository {
    async fn find_by_id(&self, id: TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let tickets = self.tickets.read().await;
        Ok(tickets.get(&id.0).cloned())
    }

    async fn list(&self) -> Result<Vec<Ticket>, RepositoryError> {
        let tickets = self.tickets.read().await;
        let mut listed: Vec<Ticket> = tickets.values().cloned().collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(listed)
    }

    async fn create(&self, ticket: NewTicket) -> Result<Ticket, RepositoryError> {
        let mut tickets = self.tickets.write().await;
        let next_id = tickets.keys().next_back().copied().unwrap_or(0) + 1;

        let mut created = Ticket::new(TicketId(next_id), ticket.title, ticket.description);
        created.status = ticket.status.unwrap_or_default();
        created.priority = ticket.priority.unwrap_or_default();
        created.category_id = ticket.category_id;

        tickets.insert(next_id, created.clone());
        Ok(created)
    }

    async fn apply_patch(
        &self,
        id: TicketId,
        patch: &TicketPatch,
    ) -> Result<Option<Ticket>, RepositoryError> {
        let mut tickets = self.tickets.write().await;
        let Some(ticket) = tickets.get_mut(&id.0) else {
            return Ok(None);
        };

        if let Some(category_id) = patch.category_id {
            ticket.category_id = Some(category_id);
        }
        ticket.priority = patch.priority;
        ticket.status = patch.status;
        ticket.updated_at = Utc::now();

        Ok(Some(ticket.clone()))
    }

    async fn delete(&self, id: TicketId) -> Result<bool, RepositoryError> {
        let mut tickets = self.tickets.write().await;
        Ok(tickets.remove(&id.0).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryCategoryRepository {
    categories: RwLock<Vec<Category>>,
}

#[async_trait::async_trait]
impl CategoryRepository for InMemoryCategoryRepository {
    async fn list(&self) -> Result<Vec<Category>, RepositoryError> {
        let categories = self.categories.read().await;
        let mut listed = categories.clone();
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listed)
    }

    async fn create(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Category, RepositoryError> {
        let mut categories = self.categories.write().await;
        if categories.iter().any(|category| category.name == name) {
            return Err(RepositoryError::Conflict(format!("category `{name}` already exists")));
        }

        let next_id = categories.iter().map(|category| category.id.0).max().unwrap_or(0) + 1;
        let category = Category {
            id: CategoryId(next_id),
            name: name.to_string(),
            description: description.map(str::to_string),
        };
        categories.push(category.clone());
        Ok(category)
    }
}

#[cfg(test)]
mod tests {
    use triage_core::domain::suggestion::TicketPatch;
    use triage_core::domain::ticket::{Ticket, TicketId, TicketPriority, TicketStatus};

    use crate::repositories::{
        CategoryRepository, InMemoryCategoryRepository, InMemoryTicketRepository, NewTicket,
        TicketRepository,
    };

    #[tokio::test]
    async fn in_memory_ticket_repo_creates_with_defaults_and_patches() {
        let repo = InMemoryTicketRepository::default();
        let ticket = repo.create(NewTicket::new("Export broken", "csv")).await.expect("create");
        assert_eq!(ticket.id, TicketId(1));
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.priority, TicketPriority::Medium);

        let patched = repo
            .apply_patch(
                ticket.id,
                &TicketPatch {
                    category_id: None,
                    priority: TicketPriority::Urgent,
                    status: TicketStatus::InProgress,
                },
            )
            .await
            .expect("patch")
            .expect("exists");
        assert_eq!(patched.priority, TicketPriority::Urgent);
        assert_eq!(patched.category_id, None);
    }

    #[tokio::test]
    async fn inserted_tickets_keep_their_ids() {
        let repo = InMemoryTicketRepository::default();
        repo.insert(Ticket::new(TicketId(40), "seeded", "ticket")).await;

        let next = repo.create(NewTicket::new("next", "ticket")).await.expect("create");
        assert_eq!(next.id, TicketId(41));
        assert_eq!(repo.list().await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn in_memory_categories_sort_by_name() {
        let repo = InMemoryCategoryRepository::default();
        repo.create("Data", None).await.expect("create");
        repo.create("Access", None).await.expect("create");

        let names: Vec<String> =
            repo.list().await.expect("list").into_iter().map(|category| category.name).collect();
        assert_eq!(names, vec!["Access", "Data"]);
        assert!(repo.create("Access", None).await.is_err());
    }
}
