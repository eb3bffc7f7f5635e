//! Action tools the agent can call.
//!
//! Tools form a closed set: a model tool call is parsed into an
//! [`ActionTool`] and dispatched by [`ToolExecutor`]. Execution never fails
//! the agent loop; every outcome, including errors, comes back as text the
//! model can read.

use std::sync::Arc;

use advisor_core::{
    fresh_access_token, parse_loose_datetime, CalendarConnector, ConnectorError, ContactInput,
    CredentialError, CrmConnector, Embedder, Instruction, InstructionCategory, InstructionStore,
    KnowledgeStore, MailboxConnector, NewCalendarEvent, OutgoingEmail, Provider, Task,
    TaskPriority, TaskSource, TaskStatus, TaskStore, UserId, UserStore,
};
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::backend::{ToolCall, ToolDefinition};
use crate::context::format_context;

/// Minutes used when the model gives no duration.
pub const DEFAULT_EVENT_MINUTES: i64 = 30;

/// Longest event the agent may schedule (7 days).
pub const MAX_EVENT_MINUTES: i64 = 7 * 24 * 60;

/// Results returned by `search_knowledge_base`.
pub const SEARCH_RESULTS: usize = 5;

pub const CALENDAR_SCOPE_MESSAGE: &str =
    "Error: App needs Calendar Write permissions. Please re-login.";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
}

/// A parsed tool invocation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ActionTool {
    AddInstruction {
        content: String,
        category: String,
    },
    CreateTask {
        title: String,
        #[serde(default)]
        details: Option<String>,
        #[serde(default)]
        due_date: Option<String>,
        #[serde(default)]
        priority: Option<String>,
    },
    CompleteTask {
        task_id: String,
    },
    SendClientEmail {
        to: String,
        subject: String,
        body: String,
    },
    CreateCalendarEvent {
        title: String,
        start_datetime: String,
        #[serde(default)]
        duration: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
    UpdateHubspotContact {
        email: String,
        #[serde(default)]
        first_name: Option<String>,
        #[serde(default)]
        last_name: Option<String>,
        #[serde(default)]
        notes: Option<String>,
    },
    AddHubspotNote {
        email: String,
        content: String,
    },
    SearchKnowledgeBase {
        query: String,
    },
}

const TOOL_NAMES: [&str; 8] = [
    "add_instruction",
    "create_task",
    "complete_task",
    "send_client_email",
    "create_calendar_event",
    "update_hubspot_contact",
    "add_hubspot_note",
    "search_knowledge_base",
];

impl ActionTool {
    /// Parse a model tool call. Empty arguments are treated as `{}`.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, ToolError> {
        if !TOOL_NAMES.contains(&name) {
            return Err(ToolError::UnknownTool(name.to_string()));
        }

        let invalid = |reason: String| ToolError::InvalidArguments {
            tool: name.to_string(),
            reason,
        };

        let args: serde_json::Value = if arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(arguments).map_err(|e| invalid(e.to_string()))?
        };

        serde_json::from_value(json!({ "name": name, "arguments": args }))
            .map_err(|e| invalid(e.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ActionTool::AddInstruction { .. } => "add_instruction",
            ActionTool::CreateTask { .. } => "create_task",
            ActionTool::CompleteTask { .. } => "complete_task",
            ActionTool::SendClientEmail { .. } => "send_client_email",
            ActionTool::CreateCalendarEvent { .. } => "create_calendar_event",
            ActionTool::UpdateHubspotContact { .. } => "update_hubspot_contact",
            ActionTool::AddHubspotNote { .. } => "add_hubspot_note",
            ActionTool::SearchKnowledgeBase { .. } => "search_knowledge_base",
        }
    }
}

/// JSON-schema descriptions of every tool, in a stable order.
pub fn definitions() -> Vec<ToolDefinition> {
    fn def(name: &str, description: &str, parameters: serde_json::Value) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }

    vec![
        def(
            "add_instruction",
            "Save a standing instruction the assistant must follow from now on.",
            json!({
                "type": "object",
                "properties": {
                    "content": {"type": "string", "description": "The instruction text"},
                    "category": {"type": "string", "enum": ["compliance", "workflow", "personal"]}
                },
                "required": ["content", "category"]
            }),
        ),
        def(
            "create_task",
            "Record a follow-up task for the advisor.",
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "details": {"type": "string"},
                    "due_date": {"type": "string", "description": "ISO 8601 date or date-time"},
                    "priority": {"type": "string", "enum": ["low", "medium", "high"]}
                },
                "required": ["title"]
            }),
        ),
        def(
            "complete_task",
            "Mark an existing pending task as completed.",
            json!({
                "type": "object",
                "properties": {"task_id": {"type": "string"}},
                "required": ["task_id"]
            }),
        ),
        def(
            "send_client_email",
            "Send an email from the advisor's mailbox.",
            json!({
                "type": "object",
                "properties": {
                    "to": {"type": "string"},
                    "subject": {"type": "string"},
                    "body": {"type": "string"}
                },
                "required": ["to", "subject", "body"]
            }),
        ),
        def(
            "create_calendar_event",
            "Schedule an event on the advisor's primary calendar.",
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "start_datetime": {"type": "string", "description": "ISO 8601 start, e.g. 2025-06-01T10:00:00Z"},
                    "duration": {"type": "string", "description": "e.g. 30m, 1h, 1d (default 30 minutes)"},
                    "description": {"type": "string"}
                },
                "required": ["title", "start_datetime"]
            }),
        ),
        def(
            "update_hubspot_contact",
            "Create a contact in HubSpot, optionally attaching a note.",
            json!({
                "type": "object",
                "properties": {
                    "email": {"type": "string"},
                    "first_name": {"type": "string"},
                    "last_name": {"type": "string"},
                    "notes": {"type": "string"}
                },
                "required": ["email"]
            }),
        ),
        def(
            "add_hubspot_note",
            "Attach a note to the HubSpot contact with this email, creating the contact if needed.",
            json!({
                "type": "object",
                "properties": {
                    "email": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["email", "content"]
            }),
        ),
        def(
            "search_knowledge_base",
            "Search the advisor's emails, calendar and CRM records.",
            json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }),
        ),
    ]
}

/// Parse a duration such as `30m`, `1h`, `1d`, `1h30m`, `2 hours` or a bare
/// number of minutes. Returns `None` for anything else, a zero duration, or
/// anything longer than [`MAX_EVENT_MINUTES`].
pub fn parse_duration_minutes(input: &str) -> Option<i64> {
    let text: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    if text.is_empty() {
        return None;
    }

    let mut total = 0f64;
    let mut chars = text.chars().peekable();
    while chars.peek().is_some() {
        let mut number = String::new();
        while let Some(c) = chars.peek().copied().filter(|c| c.is_ascii_digit() || *c == '.') {
            number.push(c);
            chars.next();
        }
        let mut unit = String::new();
        while let Some(c) = chars.peek().copied().filter(|c| c.is_ascii_alphabetic()) {
            unit.push(c);
            chars.next();
        }

        let value: f64 = number.parse().ok()?;
        let factor = match unit.as_str() {
            "" | "m" | "min" | "mins" | "minute" | "minutes" => 1.0,
            "h" | "hr" | "hrs" | "hour" | "hours" => 60.0,
            "d" | "day" | "days" => 1440.0,
            _ => return None,
        };
        total += value * factor;
        if !total.is_finite() || total > MAX_EVENT_MINUTES as f64 {
            return None;
        }
    }

    let minutes = total.round() as i64;
    (1..=MAX_EVENT_MINUTES).contains(&minutes).then_some(minutes)
}

/// Build the calendar request for `create_calendar_event`.
pub fn plan_event(
    title: &str,
    start_datetime: &str,
    duration: Option<&str>,
    description: Option<&str>,
) -> Result<NewCalendarEvent, String> {
    let start = parse_loose_datetime(start_datetime)
        .ok_or_else(|| format!("Error: could not understand start time '{}'.", start_datetime))?;
    let minutes = match duration.map(str::trim).filter(|d| !d.is_empty()) {
        Some(d) => parse_duration_minutes(d)
            .ok_or_else(|| format!("Error: could not understand duration '{}'.", d))?,
        None => DEFAULT_EVENT_MINUTES,
    };

    let end = Duration::try_minutes(minutes)
        .and_then(|length| start.checked_add_signed(length))
        .ok_or_else(|| format!("Error: event starting at '{}' ends out of range.", start_datetime))?;

    Ok(NewCalendarEvent {
        title: title.to_string(),
        start,
        end,
        description: description.map(str::to_string),
    })
}

/// Who a tool runs for.
#[derive(Debug, Clone)]
pub struct ToolScope {
    pub user_id: UserId,
    /// Source recorded on tasks created in this run
    pub origin: TaskSource,
}

impl ToolScope {
    pub fn new(user_id: UserId, origin: TaskSource) -> Self {
        Self { user_id, origin }
    }
}

/// One executed tool call, as recorded in an agent outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub result: String,
}

/// Everything tools read from or act on.
pub struct ToolExecutor {
    users: Arc<dyn UserStore>,
    knowledge: Arc<dyn KnowledgeStore>,
    tasks: Arc<dyn TaskStore>,
    instructions: Arc<dyn InstructionStore>,
    embedder: Arc<dyn Embedder>,
    mailbox: Option<Arc<dyn MailboxConnector>>,
    calendar: Option<Arc<dyn CalendarConnector>>,
    crm: Option<Arc<dyn CrmConnector>>,
}

impl ToolExecutor {
    pub fn new(
        users: Arc<dyn UserStore>,
        knowledge: Arc<dyn KnowledgeStore>,
        tasks: Arc<dyn TaskStore>,
        instructions: Arc<dyn InstructionStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            users,
            knowledge,
            tasks,
            instructions,
            embedder,
            mailbox: None,
            calendar: None,
            crm: None,
        }
    }

    pub fn with_mailbox(mut self, mailbox: Arc<dyn MailboxConnector>) -> Self {
        self.mailbox = Some(mailbox);
        self
    }

    pub fn with_calendar(mut self, calendar: Arc<dyn CalendarConnector>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    pub fn with_crm(mut self, crm: Arc<dyn CrmConnector>) -> Self {
        self.crm = Some(crm);
        self
    }

    pub fn knowledge(&self) -> &Arc<dyn KnowledgeStore> {
        &self.knowledge
    }

    pub fn tasks(&self) -> &Arc<dyn TaskStore> {
        &self.tasks
    }

    pub fn instructions(&self) -> &Arc<dyn InstructionStore> {
        &self.instructions
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Parse and run a model tool call.
    pub async fn dispatch(&self, scope: &ToolScope, call: &ToolCall) -> ToolInvocation {
        let result = match ActionTool::parse(&call.name, &call.arguments) {
            Ok(tool) => self.execute(scope, &tool).await,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Rejected tool call");
                format!("Error: {}", e)
            }
        };
        ToolInvocation {
            call_id: call.id.clone(),
            name: call.name.clone(),
            result,
        }
    }

    /// Run a parsed tool. Failures come back as text.
    pub async fn execute(&self, scope: &ToolScope, tool: &ActionTool) -> String {
        debug!(user_id = %scope.user_id, tool = tool.name(), "Executing tool");
        let user_id = &scope.user_id;

        match tool {
            ActionTool::AddInstruction { content, category } => {
                self.add_instruction(user_id, content, category).await
            }
            ActionTool::CreateTask {
                title,
                details,
                due_date,
                priority,
            } => {
                self.create_task(
                    scope,
                    title,
                    details.as_deref(),
                    due_date.as_deref(),
                    priority.as_deref(),
                )
                .await
            }
            ActionTool::CompleteTask { task_id } => self.complete_task(user_id, task_id).await,
            ActionTool::SendClientEmail { to, subject, body } => {
                self.send_email(user_id, to, subject, body).await
            }
            ActionTool::CreateCalendarEvent {
                title,
                start_datetime,
                duration,
                description,
            } => {
                self.create_event(
                    user_id,
                    title,
                    start_datetime,
                    duration.as_deref(),
                    description.as_deref(),
                )
                .await
            }
            ActionTool::UpdateHubspotContact {
                email,
                first_name,
                last_name,
                notes,
            } => {
                let contact = ContactInput {
                    email: email.clone(),
                    first_name: first_name.clone(),
                    last_name: last_name.clone(),
                };
                self.create_contact(user_id, &contact, notes.as_deref()).await
            }
            ActionTool::AddHubspotNote { email, content } => {
                self.add_note(user_id, email, content).await
            }
            ActionTool::SearchKnowledgeBase { query } => self.search(user_id, query).await,
        }
    }

    async fn add_instruction(&self, user_id: &UserId, content: &str, category: &str) -> String {
        let category: InstructionCategory = match category.parse() {
            Ok(c) => c,
            Err(e) => return format!("Error: {}", e),
        };
        match self
            .instructions
            .add(Instruction::new(user_id.clone(), content, category))
            .await
        {
            Ok(_) => format!("Instruction saved ({}): {}", category.as_str(), content),
            Err(e) => format!("Error saving instruction: {}", e),
        }
    }

    async fn create_task(
        &self,
        scope: &ToolScope,
        title: &str,
        details: Option<&str>,
        due_date: Option<&str>,
        priority: Option<&str>,
    ) -> String {
        let mut task = Task::pending(scope.user_id.clone(), title, scope.origin);
        if let Some(details) = details.filter(|d| !d.trim().is_empty()) {
            task = task.with_details(details);
        }
        if let Some(due) = due_date.filter(|d| !d.trim().is_empty()) {
            match parse_loose_datetime(due) {
                Some(at) => task = task.with_due_date(at),
                None => return format!("Error: could not understand due date '{}'.", due),
            }
        }
        if let Some(priority) = priority {
            task.priority = match priority.trim().to_ascii_lowercase().as_str() {
                "low" => TaskPriority::Low,
                "high" => TaskPriority::High,
                _ => TaskPriority::Medium,
            };
        }

        match self.tasks.create(task).await {
            Ok(task) => format!("Task created with ID: {} ({})", task.id, task.title),
            Err(e) => format!("Error creating task: {}", e),
        }
    }

    async fn complete_task(&self, user_id: &UserId, task_id: &str) -> String {
        match self
            .tasks
            .set_status(user_id, task_id, TaskStatus::Completed)
            .await
        {
            Ok(true) => format!("Task {} marked as completed.", task_id),
            Ok(false) => format!("Error: no task with ID {}.", task_id),
            Err(e) => format!("Error updating task: {}", e),
        }
    }

    async fn send_email(&self, user_id: &UserId, to: &str, subject: &str, body: &str) -> String {
        let Some(mailbox) = &self.mailbox else {
            return "Error: email sending is not configured.".to_string();
        };
        let token =
            match fresh_access_token(self.users.as_ref(), user_id, Provider::Google, mailbox.as_ref())
                .await
            {
                Ok(token) => token,
                Err(e) => return credential_message("Gmail", &e),
            };

        let email = OutgoingEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        };
        match mailbox.send(&token, &email).await {
            Ok(id) => format!("Email sent to {} (message ID: {}).", to, id),
            Err(e) => connector_message("sending email", &e),
        }
    }

    async fn create_event(
        &self,
        user_id: &UserId,
        title: &str,
        start_datetime: &str,
        duration: Option<&str>,
        description: Option<&str>,
    ) -> String {
        let Some(calendar) = &self.calendar else {
            return "Error: calendar is not configured.".to_string();
        };
        let event = match plan_event(title, start_datetime, duration, description) {
            Ok(event) => event,
            Err(message) => return message,
        };
        let token = match fresh_access_token(
            self.users.as_ref(),
            user_id,
            Provider::Google,
            calendar.as_ref(),
        )
        .await
        {
            Ok(token) => token,
            Err(e) => return credential_message("Google Calendar", &e),
        };

        match calendar.create_event(&token, &event).await {
            Ok(created) => format!(
                "Calendar Event created: {}",
                created.html_link.unwrap_or(created.id)
            ),
            Err(ConnectorError::InsufficientScope(_)) => CALENDAR_SCOPE_MESSAGE.to_string(),
            Err(e) => connector_message("creating calendar event", &e),
        }
    }

    async fn crm_token(&self, user_id: &UserId) -> Result<(Arc<dyn CrmConnector>, String), String> {
        let crm = self
            .crm
            .clone()
            .ok_or_else(|| "Error: HubSpot is not configured.".to_string())?;
        let token = fresh_access_token(self.users.as_ref(), user_id, Provider::Hubspot, crm.as_ref())
            .await
            .map_err(|e| credential_message("HubSpot", &e))?;
        Ok((crm, token))
    }

    async fn create_contact(
        &self,
        user_id: &UserId,
        contact: &ContactInput,
        notes: Option<&str>,
    ) -> String {
        let (crm, token) = match self.crm_token(user_id).await {
            Ok(pair) => pair,
            Err(message) => return message,
        };

        let contact_id = match crm.create_contact(&token, contact).await {
            Ok(id) => id,
            Err(ConnectorError::Conflict(_)) => {
                return format!(
                    "Error: A contact with the email {} already exists in HubSpot.",
                    contact.email
                )
            }
            Err(e) => return connector_message("adding contact to HubSpot", &e),
        };

        let mut message = format!("Contact created successfully with ID: {}", contact_id);
        if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
            match crm.add_note(&token, &contact_id, notes).await {
                Ok(_) => message.push_str(" and note was attached."),
                Err(e) => {
                    message.push_str(&format!(" but the note could not be attached: {}", e))
                }
            }
        }
        message
    }

    async fn add_note(&self, user_id: &UserId, email: &str, content: &str) -> String {
        let (crm, token) = match self.crm_token(user_id).await {
            Ok(pair) => pair,
            Err(message) => return message,
        };

        let existing = match crm.find_contact(&token, email).await {
            Ok(found) => found,
            Err(e) => return connector_message(&format!("adding note for {}", email), &e),
        };
        let contact_id = match existing {
            Some(id) => id,
            None => {
                let input = ContactInput {
                    email: email.to_string(),
                    first_name: None,
                    last_name: None,
                };
                match crm.create_contact(&token, &input).await {
                    Ok(id) => id,
                    Err(e) => return connector_message(&format!("adding note for {}", email), &e),
                }
            }
        };

        match crm.add_note(&token, &contact_id, content).await {
            Ok(_) => format!("Note successfully added to contact: {}", email),
            Err(e) => connector_message(&format!("adding note for {}", email), &e),
        }
    }

    async fn search(&self, user_id: &UserId, query: &str) -> String {
        let vector = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => return format!("Error searching knowledge base: {}", e),
        };
        match self.knowledge.query(user_id, &vector, SEARCH_RESULTS).await {
            Ok(results) => format_context(&results),
            Err(e) => format!("Error searching knowledge base: {}", e),
        }
    }
}

fn credential_message(service: &str, error: &CredentialError) -> String {
    match error {
        CredentialError::NotConnected(_) => {
            format!("Error: {} is not connected. Ask the user to connect it.", service)
        }
        CredentialError::NoRefreshToken(_) => {
            format!("Error: {} session expired. Please re-login.", service)
        }
        CredentialError::Connector(e) if e.needs_reauth() => {
            format!("Error: {} rejected the stored credentials. Please re-login.", service)
        }
        other => format!("Error: {} credentials unavailable: {}", service, other),
    }
}

fn connector_message(action: &str, error: &ConnectorError) -> String {
    if error.is_transient() {
        format!("Error in {}: the service is busy, try again later. ({})", action, error)
    } else if error.needs_reauth() {
        format!("Error in {}: permission denied, please re-login. ({})", action, error)
    } else {
        format!("Error in {}: {}", action, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_parse_known_tool() {
        let tool = ActionTool::parse(
            "create_calendar_event",
            r#"{"title":"Intro Call","start_datetime":"2025-06-01T10:00:00Z","duration":"30m"}"#,
        )
        .unwrap();
        assert_eq!(
            tool,
            ActionTool::CreateCalendarEvent {
                title: "Intro Call".into(),
                start_datetime: "2025-06-01T10:00:00Z".into(),
                duration: Some("30m".into()),
                description: None,
            }
        );
        assert_eq!(tool.name(), "create_calendar_event");
    }

    #[test]
    fn test_parse_rejections() {
        assert_eq!(
            ActionTool::parse("launch_rocket", "{}"),
            Err(ToolError::UnknownTool("launch_rocket".into()))
        );
        assert!(matches!(
            ActionTool::parse("create_task", "{}"),
            Err(ToolError::InvalidArguments { .. })
        ));
        assert!(matches!(
            ActionTool::parse("create_task", "not json"),
            Err(ToolError::InvalidArguments { .. })
        ));
        assert!(ActionTool::parse("search_knowledge_base", r#"{"query":"x"}"#).is_ok());
    }

    #[test]
    fn test_definitions_cover_every_tool() {
        let defs = definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, TOOL_NAMES.to_vec());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration_minutes("30m"), Some(30));
        assert_eq!(parse_duration_minutes("1h"), Some(60));
        assert_eq!(parse_duration_minutes("1d"), Some(1440));
        assert_eq!(parse_duration_minutes("45"), Some(45));
        assert_eq!(parse_duration_minutes("1h30m"), Some(90));
        assert_eq!(parse_duration_minutes("2 hours"), Some(120));
        assert_eq!(parse_duration_minutes("1.5h"), Some(90));
        assert_eq!(parse_duration_minutes("0m"), None);
        assert_eq!(parse_duration_minutes("soon"), None);
        assert_eq!(parse_duration_minutes(""), None);
    }

    #[test]
    fn test_plan_event_intro_call() {
        let event = plan_event("Intro Call", "2025-06-01T10:00:00Z", Some("30m"), None).unwrap();
        assert_eq!(event.start, Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap());
        assert_eq!(event.end, Utc.with_ymd_and_hms(2025, 6, 1, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_plan_event_defaults_and_errors() {
        let event = plan_event("Sync", "2025-06-01T10:00:00Z", None, Some("agenda")).unwrap();
        assert_eq!(event.end - event.start, Duration::minutes(DEFAULT_EVENT_MINUTES));
        assert_eq!(event.description.as_deref(), Some("agenda"));

        assert!(plan_event("Sync", "tomorrow-ish", None, None).is_err());
        assert!(plan_event("Sync", "2025-06-01T10:00:00Z", Some("forever"), None).is_err());
    }

    #[test]
    fn test_absurd_durations_are_rejected() {
        assert_eq!(parse_duration_minutes("7d"), Some(MAX_EVENT_MINUTES));
        assert_eq!(parse_duration_minutes("8d"), None);
        assert_eq!(parse_duration_minutes("100000000d"), None);
        assert_eq!(parse_duration_minutes("99999999999999d"), None);
        assert_eq!(parse_duration_minutes("1e308d"), None);

        let err = plan_event("x", "2025-06-01T10:00:00Z", Some("100000000d"), None).unwrap_err();
        assert!(err.starts_with("Error:"));
        let err = plan_event("x", "2025-06-01T10:00:00Z", Some("99999999999999d"), None).unwrap_err();
        assert!(err.starts_with("Error:"));
    }
}
