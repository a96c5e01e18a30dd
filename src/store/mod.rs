//! Ordered, typed record store with referential integrity, cascade deletes,
//! and atomic flat-file persistence.
//!
//! All collections live behind one `RwLock`: mutations serialize on the write
//! lock and readers observe pre- or post-state only, never a partial cascade.
//! Every successful mutation re-persists the store; a failed flush is logged,
//! flags the store degraded, and the mutation still reports success.

pub mod ordered;

use crate::shared::errors::{StoreError, StoreResult};
use crate::shared::models::{
    Agent, Conversation, Document, Message, NewAgent, NewDocument, NewMessage,
    NewOrganizationCategory, NewQaLog, OrganizationCategory, QaLog, User, Visibility,
    AGENT_CATEGORIES, WILDCARD,
};
use chrono::Utc;
use log::{info, warn};
use ordered::OrderedMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::shared::models::Direction;

// ============================================================================
// Collections & counters
// ============================================================================

/// Monotonic id counters, persisted alongside the data so ids are never
/// reused after deletion or restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Counters {
    agent: i64,
    conversation: i64,
    message: i64,
    document: i64,
    qa_log: i64,
    organization_category: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Default)]
struct Collections {
    users: OrderedMap<String, User>,
    agents: OrderedMap<i64, Agent>,
    conversations: OrderedMap<i64, Conversation>,
    messages: OrderedMap<i64, Message>,
    documents: OrderedMap<i64, Document>,
    qa_logs: OrderedMap<i64, QaLog>,
    categories: OrderedMap<i64, OrganizationCategory>,
    counters: Counters,
}

const USERS_FILE: &str = "users.json";
const AGENTS_FILE: &str = "agents.json";
const CONVERSATIONS_FILE: &str = "conversations.json";
const MESSAGES_FILE: &str = "messages.json";
const DOCUMENTS_FILE: &str = "documents.json";
const QA_LOGS_FILE: &str = "qa_logs.json";
const CATEGORIES_FILE: &str = "organization_categories.json";
const META_FILE: &str = "meta.json";

// ============================================================================
// EntityStore
// ============================================================================

pub struct EntityStore {
    inner: RwLock<Collections>,
    data_dir: Option<PathBuf>,
    degraded: AtomicBool,
}

impl EntityStore {
    /// Store without a backing directory; `persist()` is a no-op. Used by
    /// tests and callers that manage durability themselves.
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(Collections::default()),
            data_dir: None,
            degraded: AtomicBool::new(false),
        }
    }

    /// Opens (or initializes) a store backed by `dir`. Missing files mean
    /// empty collections; present files reload in their original insertion
    /// order.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let cols = Collections {
            users: load_file(&dir.join(USERS_FILE))?,
            agents: load_file(&dir.join(AGENTS_FILE))?,
            conversations: load_file(&dir.join(CONVERSATIONS_FILE))?,
            messages: load_file(&dir.join(MESSAGES_FILE))?,
            documents: load_file(&dir.join(DOCUMENTS_FILE))?,
            qa_logs: load_file(&dir.join(QA_LOGS_FILE))?,
            categories: load_file(&dir.join(CATEGORIES_FILE))?,
            counters: load_meta(&dir.join(META_FILE))?,
        };

        info!(
            "entity store opened at {}: {} users, {} agents, {} conversations",
            dir.display(),
            cols.users.len(),
            cols.agents.len(),
            cols.conversations.len()
        );

        Ok(Self {
            inner: RwLock::new(cols),
            data_dir: Some(dir),
            degraded: AtomicBool::new(false),
        })
    }

    /// True while the last automatic flush failed and the store is serving
    /// from memory only.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Explicit flush. Unlike the automatic flush after mutations, errors are
    /// returned to the caller. Takes the write lock so persists never
    /// interleave with each other or with mutations.
    pub fn persist(&self) -> StoreResult<()> {
        let cols = self.write();
        match self.write_all(&cols) {
            Ok(()) => {
                self.degraded.store(false, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.degraded.store(true, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Collections> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collections> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Flush while still holding the write lock, so persists never interleave
    /// with mutations. Failure degrades the store but never fails the
    /// mutation that triggered it.
    fn flush_after_mutation(&self, cols: &Collections) {
        match self.write_all(cols) {
            Ok(()) => self.degraded.store(false, Ordering::Relaxed),
            Err(e) => {
                if !self.degraded.swap(true, Ordering::Relaxed) {
                    warn!("persistence degraded, serving from memory: {}", e);
                }
            }
        }
    }

    fn write_all(&self, cols: &Collections) -> StoreResult<()> {
        let dir = match &self.data_dir {
            Some(dir) => dir,
            None => return Ok(()),
        };
        write_file(&dir.join(USERS_FILE), &cols.users)?;
        write_file(&dir.join(AGENTS_FILE), &cols.agents)?;
        write_file(&dir.join(CONVERSATIONS_FILE), &cols.conversations)?;
        write_file(&dir.join(MESSAGES_FILE), &cols.messages)?;
        write_file(&dir.join(DOCUMENTS_FILE), &cols.documents)?;
        write_file(&dir.join(QA_LOGS_FILE), &cols.qa_logs)?;
        write_file(&dir.join(CATEGORIES_FILE), &cols.categories)?;
        write_file(&dir.join(META_FILE), &cols.counters)?;
        Ok(())
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Insert or replace by id. A replaced user keeps its insertion position.
    pub fn put_user(&self, mut user: User) -> StoreResult<User> {
        if user.id.trim().is_empty() {
            return Err(StoreError::validation("user id must not be empty"));
        }
        if user.username.trim().is_empty() {
            return Err(StoreError::validation("username must not be empty"));
        }
        user.updated_at = Utc::now();

        let mut cols = self.write();
        if let Some(existing) = cols.users.get(&user.id) {
            user.created_at = existing.created_at;
        }
        cols.users.insert(user.id.clone(), user.clone());
        self.flush_after_mutation(&cols);
        Ok(user)
    }

    pub fn get_user(&self, id: &str) -> StoreResult<User> {
        self.read()
            .users
            .get(&id.to_string())
            .cloned()
            .ok_or_else(|| StoreError::not_found("user", id))
    }

    pub fn list_users(&self) -> Vec<User> {
        self.read().users.values().cloned().collect()
    }

    /// Rejected while conversations reference the user or the user manages
    /// agents. Editor and document-manager memberships are detached as part
    /// of the delete.
    pub fn delete_user(&self, id: &str) -> StoreResult<()> {
        let key = id.to_string();
        let mut cols = self.write();
        if !cols.users.contains_key(&key) {
            return Err(StoreError::not_found("user", id));
        }
        if cols.conversations.values().any(|c| c.user_id == key) {
            return Err(StoreError::conflict(format!(
                "user {} has conversations",
                id
            )));
        }
        if cols.agents.values().any(|a| a.manager_id == key) {
            return Err(StoreError::conflict(format!("user {} manages agents", id)));
        }

        let member_of: Vec<i64> = cols
            .agents
            .values()
            .filter(|a| {
                a.editor_ids.iter().any(|e| e == &key)
                    || a.document_manager_ids.iter().any(|d| d == &key)
            })
            .map(|a| a.id)
            .collect();
        for agent_id in member_of {
            if let Some(agent) = cols.agents.get_mut(&agent_id) {
                agent.editor_ids.retain(|e| e != &key);
                agent.document_manager_ids.retain(|d| d != &key);
            }
        }
        cols.users.remove(&key);
        self.flush_after_mutation(&cols);
        Ok(())
    }

    // ========================================================================
    // Agents
    // ========================================================================

    fn validate_agent(
        cols: &Collections,
        manager_id: &str,
        category: &str,
        visibility: Visibility,
        upper: &Option<String>,
    ) -> StoreResult<()> {
        if !cols.users.contains_key(&manager_id.to_string()) {
            return Err(StoreError::validation(format!(
                "manager {} does not exist",
                manager_id
            )));
        }
        if !AGENT_CATEGORIES.contains(&category) {
            return Err(StoreError::validation(format!(
                "unknown agent category: {}",
                category
            )));
        }
        if visibility == Visibility::Group && upper.as_deref().map_or(true, str::is_empty) {
            return Err(StoreError::validation(
                "group visibility requires an upper category",
            ));
        }
        Ok(())
    }

    pub fn create_agent(&self, new: NewAgent) -> StoreResult<Agent> {
        let mut cols = self.write();
        Self::validate_agent(
            &cols,
            &new.manager_id,
            &new.category,
            new.visibility,
            &new.upper_category,
        )?;

        let now = Utc::now();
        let mut agent = Agent {
            id: next_id(&mut cols.counters.agent),
            name: new.name,
            description: new.description,
            category: new.category,
            icon: new.icon,
            background_color: new.background_color,
            visibility: new.visibility,
            upper_category: new.upper_category,
            lower_category: new.lower_category,
            detail_category: new.detail_category,
            manager_id: new.manager_id,
            editor_ids: new.editor_ids,
            document_manager_ids: new.document_manager_ids,
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
        };
        if agent.visibility != Visibility::Group {
            agent.clear_scoping();
        }
        cols.agents.insert(agent.id, agent.clone());
        self.flush_after_mutation(&cols);
        Ok(agent)
    }

    /// Replaces an existing agent record. The id must already exist; creation
    /// always goes through `create_agent` so counters stay authoritative.
    pub fn update_agent(&self, mut agent: Agent) -> StoreResult<Agent> {
        let mut cols = self.write();
        let existing = cols
            .agents
            .get(&agent.id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("agent", agent.id))?;
        Self::validate_agent(
            &cols,
            &agent.manager_id,
            &agent.category,
            agent.visibility,
            &agent.upper_category,
        )?;

        agent.created_at = existing.created_at;
        agent.updated_at = Utc::now();
        if agent.visibility != Visibility::Group {
            agent.clear_scoping();
        }
        cols.agents.insert(agent.id, agent.clone());
        self.flush_after_mutation(&cols);
        Ok(agent)
    }

    pub fn set_agent_visibility(
        &self,
        id: i64,
        visibility: Visibility,
        upper: Option<String>,
        lower: Option<String>,
        detail: Option<String>,
    ) -> StoreResult<Agent> {
        let mut agent = self.get_agent(id)?;
        agent.visibility = visibility;
        agent.upper_category = upper;
        agent.lower_category = lower;
        agent.detail_category = detail;
        self.update_agent(agent)
    }

    pub fn get_agent(&self, id: i64) -> StoreResult<Agent> {
        self.read()
            .agents
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("agent", id))
    }

    pub fn list_agents(&self) -> Vec<Agent> {
        self.read().agents.values().cloned().collect()
    }

    pub fn agents_by_manager(&self, user_id: &str) -> Vec<Agent> {
        self.read()
            .agents
            .values()
            .filter(|a| a.is_operator(user_id))
            .cloned()
            .collect()
    }

    /// Cascade: the agent's conversations, those conversations' messages, and
    /// its documents go with it. QaLogs are retained untouched.
    pub fn delete_agent(&self, id: i64) -> StoreResult<()> {
        let mut cols = self.write();
        if !cols.agents.contains_key(&id) {
            return Err(StoreError::not_found("agent", id));
        }
        let conversation_ids: HashSet<i64> = cols
            .conversations
            .values()
            .filter(|c| c.agent_id == id)
            .map(|c| c.id)
            .collect();
        cols.messages
            .retain(|_, m| !conversation_ids.contains(&m.conversation_id));
        cols.conversations.retain(|_, c| c.agent_id != id);
        cols.documents.retain(|_, d| d.agent_id != id);
        cols.agents.remove(&id);
        self.flush_after_mutation(&cols);
        Ok(())
    }

    // ========================================================================
    // Conversations & messages
    // ========================================================================

    /// At most one conversation per (user, agent): returns the existing one
    /// when present, otherwise creates it.
    pub fn get_or_create_conversation(
        &self,
        user_id: &str,
        agent_id: i64,
    ) -> StoreResult<Conversation> {
        let mut cols = self.write();
        if !cols.users.contains_key(&user_id.to_string()) {
            return Err(StoreError::validation(format!(
                "user {} does not exist",
                user_id
            )));
        }
        if !cols.agents.contains_key(&agent_id) {
            return Err(StoreError::validation(format!(
                "agent {} does not exist",
                agent_id
            )));
        }
        if let Some(existing) = cols
            .conversations
            .values()
            .find(|c| c.user_id == user_id && c.agent_id == agent_id)
        {
            return Ok(existing.clone());
        }

        let conversation = Conversation {
            id: next_id(&mut cols.counters.conversation),
            user_id: user_id.to_string(),
            agent_id,
            last_message_at: None,
            unread_count: 0,
            created_at: Utc::now(),
        };
        cols.conversations
            .insert(conversation.id, conversation.clone());
        self.flush_after_mutation(&cols);
        Ok(conversation)
    }

    pub fn get_conversation(&self, id: i64) -> StoreResult<Conversation> {
        self.read()
            .conversations
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("conversation", id))
    }

    pub fn user_conversations(&self, user_id: &str) -> Vec<Conversation> {
        self.read()
            .conversations
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn mark_conversation_read(&self, id: i64) -> StoreResult<Conversation> {
        let mut cols = self.write();
        let conversation = cols
            .conversations
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("conversation", id))?;
        conversation.unread_count = 0;
        let snapshot = conversation.clone();
        self.flush_after_mutation(&cols);
        Ok(snapshot)
    }

    pub fn delete_conversation(&self, id: i64) -> StoreResult<()> {
        let mut cols = self.write();
        if cols.conversations.remove(&id).is_none() {
            return Err(StoreError::not_found("conversation", id));
        }
        cols.messages.retain(|_, m| m.conversation_id != id);
        self.flush_after_mutation(&cols);
        Ok(())
    }

    /// Messages are immutable and append-only. A message from the agent bumps
    /// the conversation's unread count; any message refreshes
    /// `last_message_at`.
    pub fn create_message(&self, new: NewMessage) -> StoreResult<Message> {
        let mut cols = self.write();
        if !cols.conversations.contains_key(&new.conversation_id) {
            return Err(StoreError::validation(format!(
                "conversation {} does not exist",
                new.conversation_id
            )));
        }

        let message = Message {
            id: next_id(&mut cols.counters.message),
            conversation_id: new.conversation_id,
            content: new.content,
            direction: new.direction,
            created_at: Utc::now(),
        };
        if let Some(conversation) = cols.conversations.get_mut(&new.conversation_id) {
            conversation.last_message_at = Some(message.created_at);
            if message.direction == Direction::FromAgent {
                conversation.unread_count += 1;
            }
        }
        cols.messages.insert(message.id, message.clone());
        self.flush_after_mutation(&cols);
        Ok(message)
    }

    pub fn conversation_messages(&self, conversation_id: i64) -> StoreResult<Vec<Message>> {
        let cols = self.read();
        if !cols.conversations.contains_key(&conversation_id) {
            return Err(StoreError::not_found("conversation", conversation_id));
        }
        Ok(cols
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    pub fn get_message(&self, id: i64) -> StoreResult<Message> {
        self.read()
            .messages
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("message", id))
    }

    // ========================================================================
    // Documents
    // ========================================================================

    pub fn create_document(&self, new: NewDocument) -> StoreResult<Document> {
        let mut cols = self.write();
        if !cols.agents.contains_key(&new.agent_id) {
            return Err(StoreError::validation(format!(
                "agent {} does not exist",
                new.agent_id
            )));
        }
        let document = Document {
            id: next_id(&mut cols.counters.document),
            agent_id: new.agent_id,
            filename: new.filename,
            mime_type: new.mime_type,
            content: new.content,
            uploaded_by: new.uploaded_by,
            created_at: Utc::now(),
        };
        cols.documents.insert(document.id, document.clone());
        self.flush_after_mutation(&cols);
        Ok(document)
    }

    pub fn update_document(&self, document: Document) -> StoreResult<Document> {
        let mut cols = self.write();
        let existing = cols
            .documents
            .get(&document.id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("document", document.id))?;
        if !cols.agents.contains_key(&document.agent_id) {
            return Err(StoreError::validation(format!(
                "agent {} does not exist",
                document.agent_id
            )));
        }
        let mut document = document;
        document.created_at = existing.created_at;
        cols.documents.insert(document.id, document.clone());
        self.flush_after_mutation(&cols);
        Ok(document)
    }

    pub fn get_document(&self, id: i64) -> StoreResult<Document> {
        self.read()
            .documents
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("document", id))
    }

    pub fn list_documents(&self) -> Vec<Document> {
        self.read().documents.values().cloned().collect()
    }

    pub fn agent_documents(&self, agent_id: i64) -> StoreResult<Vec<Document>> {
        let cols = self.read();
        if !cols.agents.contains_key(&agent_id) {
            return Err(StoreError::not_found("agent", agent_id));
        }
        Ok(cols
            .documents
            .values()
            .filter(|d| d.agent_id == agent_id)
            .cloned()
            .collect())
    }

    pub fn delete_document(&self, id: i64) -> StoreResult<()> {
        let mut cols = self.write();
        if cols.documents.remove(&id).is_none() {
            return Err(StoreError::not_found("document", id));
        }
        self.flush_after_mutation(&cols);
        Ok(())
    }

    // ========================================================================
    // QA logs
    // ========================================================================

    /// Append-only; agent/user references are not validated so historical
    /// entries survive deletions.
    pub fn create_qa_log(&self, new: NewQaLog) -> StoreResult<QaLog> {
        let mut cols = self.write();
        let log = QaLog {
            id: next_id(&mut cols.counters.qa_log),
            occurred_at: new.occurred_at.unwrap_or_else(Utc::now),
            agent_id: new.agent_id,
            user_id: new.user_id,
            question: new.question,
            answer: new.answer,
            response_time_seconds: new.response_time_seconds,
            category: new.category,
        };
        cols.qa_logs.insert(log.id, log.clone());
        self.flush_after_mutation(&cols);
        Ok(log)
    }

    pub fn list_qa_logs(&self) -> Vec<QaLog> {
        self.read().qa_logs.values().cloned().collect()
    }

    // ========================================================================
    // Organization categories
    // ========================================================================

    pub fn create_category(
        &self,
        new: NewOrganizationCategory,
    ) -> StoreResult<OrganizationCategory> {
        if new.upper_category.trim().is_empty() {
            return Err(StoreError::validation("upper category must not be empty"));
        }
        let mut cols = self.write();
        if cols.categories.values().any(|c| {
            c.upper_category == new.upper_category
                && c.lower_category == new.lower_category
                && c.detail_category == new.detail_category
        }) {
            return Err(StoreError::validation("duplicate organization category"));
        }
        let category = OrganizationCategory {
            id: next_id(&mut cols.counters.organization_category),
            upper_category: new.upper_category,
            lower_category: new.lower_category,
            detail_category: new.detail_category,
        };
        cols.categories.insert(category.id, category.clone());
        self.flush_after_mutation(&cols);
        Ok(category)
    }

    pub fn list_categories(&self) -> Vec<OrganizationCategory> {
        self.read().categories.values().cloned().collect()
    }

    /// Rejected when removal would leave some user position or group-agent
    /// scoping triple uncovered by the remaining vocabulary. Removing one leaf
    /// of a department that still has sibling leaves stays legal.
    pub fn delete_category(&self, id: i64) -> StoreResult<()> {
        let mut cols = self.write();
        if !cols.categories.contains_key(&id) {
            return Err(StoreError::not_found("organization category", id));
        }

        let remaining: Vec<&OrganizationCategory> = cols
            .categories
            .values()
            .filter(|c| c.id != id)
            .collect();

        for user in cols.users.values() {
            if !position_covered(
                &remaining,
                user.upper_category.as_deref(),
                user.lower_category.as_deref(),
                user.detail_category.as_deref(),
            ) {
                return Err(StoreError::conflict(format!(
                    "user {} position would lose vocabulary coverage",
                    user.id
                )));
            }
        }
        for agent in cols.agents.values().filter(|a| a.visibility == Visibility::Group) {
            if !position_covered(
                &remaining,
                agent.upper_category.as_deref(),
                agent.lower_category.as_deref(),
                agent.detail_category.as_deref(),
            ) {
                return Err(StoreError::conflict(format!(
                    "agent {} scoping would lose vocabulary coverage",
                    agent.id
                )));
            }
        }

        cols.categories.remove(&id);
        self.flush_after_mutation(&cols);
        Ok(())
    }
}

/// True when some remaining category leaf covers the position. Unpopulated
/// and wildcard levels constrain nothing.
fn position_covered(
    remaining: &[&OrganizationCategory],
    upper: Option<&str>,
    lower: Option<&str>,
    detail: Option<&str>,
) -> bool {
    fn constrains(level: Option<&str>) -> Option<&str> {
        level.filter(|v| !v.is_empty() && *v != WILDCARD)
    }
    let (upper, lower, detail) = (constrains(upper), constrains(lower), constrains(detail));
    if upper.is_none() && lower.is_none() && detail.is_none() {
        return true;
    }
    remaining.iter().any(|c| {
        upper.map_or(true, |v| c.upper_category == v)
            && lower.map_or(true, |v| c.lower_category == v)
            && detail.map_or(true, |v| c.detail_category == v)
    })
}

// ============================================================================
// File I/O
// ============================================================================

fn load_file<T: Default + serde::de::DeserializeOwned>(path: &Path) -> StoreResult<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn load_meta(path: &Path) -> StoreResult<Counters> {
    load_file(path)
}

/// Write-to-temp then atomic rename, so readers of the data directory never
/// observe a torn file.
fn write_file<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let bytes = serde_json::to_vec(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
