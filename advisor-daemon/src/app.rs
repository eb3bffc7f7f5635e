//! Component wiring shared by every advisord command.
//!
//! ```text
//! Stores ──┬──▶ SyncOrchestrator ──(ReactionJob)──▶ ReactionWorker
//!          │            ▲                                │
//!          │   Google / HubSpot clients                  ▼
//!          └──▶ ToolExecutor ◀──────────────────── AgentLoop ◀── AskService
//! ```

use std::sync::Arc;

use tracing::{info, warn};

use advisor_agent::{
    reaction_channel, AgentConfig, AgentLoop, AskService, LlmBackend, OpenAiBackend,
    ReactionEngine, ReactionWorker, ToolExecutor,
};
use advisor_core::{
    CalendarConnector, CrmConnector, Embedder, HashingEmbedder, InstructionStore, KnowledgeStore,
    MailboxConnector, MemoryStore, StoreError, TaskStore, UserStore,
};
use advisor_sync::{
    CalendarSource, CrmSource, MailboxSource, OpenAiEmbedder, SyncConfig, SyncOrchestrator,
};

use crate::clients::{GoogleClient, HubspotClient};
use crate::config::{Args, OAuthArgs};
use crate::db::{MongoClient, MongoStore};

/// The four persistence contracts, backed by one implementation.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub instructions: Arc<dyn InstructionStore>,
}

impl Stores {
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            knowledge: store.clone(),
            tasks: store.clone(),
            instructions: store,
        }
    }

    pub fn mongo(store: MongoStore) -> Self {
        let store = Arc::new(store);
        Self {
            users: store.clone(),
            knowledge: store.clone(),
            tasks: store.clone(),
            instructions: store,
        }
    }
}

/// Provider clients for whichever OAuth apps are configured.
#[derive(Clone, Default)]
pub struct Connectors {
    pub mailbox: Option<Arc<dyn MailboxConnector>>,
    pub calendar: Option<Arc<dyn CalendarConnector>>,
    pub crm: Option<Arc<dyn CrmConnector>>,
}

impl Connectors {
    pub fn from_oauth(oauth: &OAuthArgs) -> Self {
        let mut connectors = Connectors::default();
        if let Some((id, secret)) = oauth.google() {
            let google = Arc::new(GoogleClient::new(id, secret));
            connectors.mailbox = Some(google.clone());
            connectors.calendar = Some(google);
        }
        if let Some((id, secret)) = oauth.hubspot() {
            connectors.crm = Some(Arc::new(HubspotClient::new(id, secret)));
        }
        connectors
    }
}

/// Open the configured persistence and embedding backends.
///
/// Dev mode keeps everything in memory and embeds with the local hashing
/// embedder, so no external service is needed.
pub async fn open_backends(args: &Args) -> Result<(Stores, Arc<dyn Embedder>), StoreError> {
    if args.dev_mode {
        warn!("Dev mode: in-memory store and hashing embedder, nothing is persisted");
        let embedder = Arc::new(HashingEmbedder::new(args.embedding.embedding_dimensions));
        return Ok((Stores::memory(Arc::new(MemoryStore::new())), embedder));
    }

    let client = MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await?;
    info!(db = client.db_name(), "MongoDB connected successfully");
    let store = MongoStore::open(&client, &args.vector_index).await?;

    let embedder = Arc::new(OpenAiEmbedder::new(
        args.embedding.embedding_base_url.clone(),
        args.embedding.embedding_model.clone(),
        args.embedding.embedding_api_key.clone(),
        args.embedding.embedding_dimensions,
    ));
    Ok((Stores::mongo(store), embedder))
}

pub fn chat_backend(args: &Args) -> Arc<dyn LlmBackend> {
    Arc::new(OpenAiBackend::new(
        args.llm.llm_base_url.clone(),
        args.llm.llm_model.clone(),
        args.llm.llm_api_key.clone(),
    ))
}

/// Everything a command needs, assembled once.
pub struct App {
    pub stores: Stores,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub ask: AskService,
    /// Taken by `serve`; other commands drop it, which closes the queue.
    pub reactions: Option<ReactionWorker>,
}

pub struct AppSettings {
    pub sync: SyncConfig,
    pub agent: AgentConfig,
    pub reaction_queue_size: usize,
}

impl AppSettings {
    pub fn from_args(args: &Args) -> Self {
        Self {
            sync: args.sync_config(),
            agent: args.agent_config(),
            reaction_queue_size: args.reaction_queue_size,
        }
    }
}

impl App {
    pub fn build(
        stores: Stores,
        embedder: Arc<dyn Embedder>,
        backend: Arc<dyn LlmBackend>,
        connectors: Connectors,
        settings: AppSettings,
    ) -> Self {
        let mut tools = ToolExecutor::new(
            stores.users.clone(),
            stores.knowledge.clone(),
            stores.tasks.clone(),
            stores.instructions.clone(),
            embedder.clone(),
        );
        let mut orchestrator = SyncOrchestrator::new(
            stores.users.clone(),
            stores.knowledge.clone(),
            embedder,
            settings.sync,
        );

        if let Some(mailbox) = connectors.mailbox {
            tools = tools.with_mailbox(mailbox.clone());
            orchestrator = orchestrator.with_connector(Arc::new(MailboxSource::new(mailbox)));
        }
        if let Some(calendar) = connectors.calendar {
            tools = tools.with_calendar(calendar.clone());
            orchestrator = orchestrator.with_connector(Arc::new(CalendarSource::new(calendar)));
        }
        if let Some(crm) = connectors.crm {
            tools = tools.with_crm(crm.clone());
            orchestrator = orchestrator.with_connector(Arc::new(CrmSource::new(crm)));
        }

        let agent = Arc::new(AgentLoop::new(backend, Arc::new(tools)).with_config(settings.agent));
        let (sender, receiver) = reaction_channel(settings.reaction_queue_size);
        let worker = ReactionWorker::new(Arc::new(ReactionEngine::new(agent.clone())), receiver);

        Self {
            stores,
            orchestrator: Arc::new(orchestrator.with_reactions(sender)),
            ask: AskService::new(agent),
            reactions: Some(worker),
        }
    }
}
