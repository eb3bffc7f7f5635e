//! Advisor Sync - incremental ingestion of external data
//!
//! Pulls mailbox, calendar and CRM records changed since the last stored
//! record, cleans and chunks them, embeds each chunk and stores it in the
//! knowledge store. Re-running a sync is always safe: chunk identities are
//! derived from the record, so duplicates are rejected by the store.
//!
//! ```text
//! connector ──► normalize ──► clean/chunk ──► embed ──► KnowledgeStore
//!                                                   │
//!                                                   └──► ReactionJob (mpsc)
//! ```

pub mod chunker;
pub mod embedder;
pub mod error;
pub mod html;
pub mod mime;
pub mod orchestrator;
pub mod sources;

pub use chunker::{Chunker, ChunkerConfig};
pub use embedder::OpenAiEmbedder;
pub use error::SyncError;
pub use html::clean_markup;
pub use mime::{decode_body, extract_body};
pub use orchestrator::{SyncConfig, SyncOrchestrator};
pub use sources::{
    CalendarSource, CrmSource, MailboxSource, RecordBody, SourceConnector, SourceRecord,
};
