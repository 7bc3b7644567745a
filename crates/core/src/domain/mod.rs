pub mod category;
pub mod suggestion;
pub mod ticket;

pub use category::{Category, CategoryCatalog, CategoryId};
pub use suggestion::{
    CategoryDraft, PriorityDraft, ProposedPatch, ReplyDraft, Suggestion, TicketPatch, TriageDraft,
    TriageOutcome, MAX_RATIONALE_ITEMS,
};
pub use ticket::{Ticket, TicketId, TicketPriority, TicketStatus};
