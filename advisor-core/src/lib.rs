//! Advisor Core - shared contracts for ingestion and retrieval
//!
//! Everything the sync pipeline and the agent have to agree on lives here:
//! - Domain entities (users, knowledge chunks, tasks, instructions)
//! - Persistence traits with an in-memory implementation
//! - Black-box connector contracts for mailbox, calendar and CRM providers
//! - The embedder contract and a deterministic offline embedder
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐     ┌──────────────┐
//!  │ advisor-sync │     │ advisor-agent│
//!  └──────┬───────┘     └──────┬───────┘
//!         │  ReactionJob (mpsc)│
//!         └─────────┬──────────┘
//!                   ▼
//!          ┌─────────────────┐
//!          │  advisor-core   │
//!          │ stores/connectors│
//!          └─────────────────┘
//! ```

pub mod connector;
pub mod embedding;
pub mod error;
pub mod events;
pub mod memory;
pub mod store;
pub mod tokens;
pub mod types;

pub use connector::{
    CalendarConnector, CalendarEvent, ContactInput, CreatedEvent, CrmChanges, CrmConnector,
    CrmContact, CrmNote, MailHeader, MailMessage, MailboxConnector, MimePart, NewCalendarEvent,
    OutgoingEmail, RefreshedToken, TokenRefresh,
};
pub use embedding::{cosine_similarity, Embedder, HashingEmbedder};
pub use error::{ConnectorError, EmbedError, StoreError};
pub use events::{ReactionJob, SyncEvent, SyncReport};
pub use memory::MemoryStore;
pub use store::{InsertOutcome, InstructionStore, KnowledgeStore, TaskStore, UserStore};
pub use tokens::{connect_crm, fresh_access_token, CredentialError};
pub use types::*;
