use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel for a scoping level that matches every value ("all").
pub const WILDCARD: &str = "전체";

/// Fixed agent category labels used across the admin dashboards.
pub const AGENT_CATEGORIES: [&str; 5] = ["학교", "교수", "학생", "그룹", "기능형"];

// ============================================================================
// Roles & Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    AgentAdmin,
    QaAdmin,
    DocAdmin,
    CategoryAdmin,
    MasterAdmin,
}

impl UserRole {
    pub fn is_master(self) -> bool {
        self == Self::MasterAdmin
    }

    /// Roles allowed to create and manage agents they own.
    pub fn can_manage_agents(self) -> bool {
        matches!(self, Self::AgentAdmin | Self::MasterAdmin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Organization,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    FromUser,
    FromAgent,
}

// ============================================================================
// User
// ============================================================================

/// A user account, positioned in the three-level organization hierarchy.
/// Category levels are `None` when the user is unscoped at that level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: UserRole,
    pub user_type: String,
    pub upper_category: Option<String>,
    pub lower_category: Option<String>,
    pub detail_category: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: &str, username: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            username: username.to_string(),
            name: None,
            email: None,
            role: UserRole::User,
            user_type: "student".to_string(),
            upper_category: None,
            lower_category: None,
            detail_category: None,
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_position(
        mut self,
        upper: Option<&str>,
        lower: Option<&str>,
        detail: Option<&str>,
    ) -> Self {
        self.upper_category = upper.map(str::to_string);
        self.lower_category = lower.map(str::to_string);
        self.detail_category = detail.map(str::to_string);
        self
    }
}

// ============================================================================
// Agent
// ============================================================================

/// A chatbot agent. The scoping triple is populated only for
/// `Visibility::Group`; an `organization` agent derives its home organization
/// from its manager's position at resolution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub category: String,
    pub icon: String,
    pub background_color: String,
    pub visibility: Visibility,
    pub upper_category: Option<String>,
    pub lower_category: Option<String>,
    pub detail_category: Option<String>,
    pub manager_id: String,
    pub editor_ids: Vec<String>,
    pub document_manager_ids: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// True when the user administers this agent (owner, editor, or document
    /// manager). Such users see the agent even while it is inactive.
    pub fn is_operator(&self, user_id: &str) -> bool {
        self.manager_id == user_id
            || self.editor_ids.iter().any(|e| e == user_id)
            || self.document_manager_ids.iter().any(|d| d == user_id)
    }

    /// Drops the scoping triple; required whenever visibility is not `group`.
    pub fn clear_scoping(&mut self) {
        self.upper_category = None;
        self.lower_category = None;
        self.detail_category = None;
    }
}

/// Payload for agent creation; the store assigns the id and timestamps.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAgent {
    pub name: String,
    pub description: String,
    pub category: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_background")]
    pub background_color: String,
    #[serde(default = "default_visibility")]
    pub visibility: Visibility,
    #[serde(default)]
    pub upper_category: Option<String>,
    #[serde(default)]
    pub lower_category: Option<String>,
    #[serde(default)]
    pub detail_category: Option<String>,
    pub manager_id: String,
    #[serde(default)]
    pub editor_ids: Vec<String>,
    #[serde(default)]
    pub document_manager_ids: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_icon() -> String {
    "Bot".to_string()
}

fn default_background() -> String {
    "blue".to_string()
}

fn default_visibility() -> Visibility {
    Visibility::Public
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Conversation & Message
// ============================================================================

/// One conversation per (user, agent) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: i64,
    pub user_id: String,
    pub agent_id: i64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub content: String,
    pub direction: Direction,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub conversation_id: i64,
    pub content: String,
    pub direction: Direction,
}

// ============================================================================
// Document
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: i64,
    pub agent_id: i64,
    pub filename: String,
    pub mime_type: String,
    /// Extracted text; produced by an out-of-process collaborator.
    pub content: Option<String>,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    pub agent_id: i64,
    pub filename: String,
    pub mime_type: String,
    #[serde(default)]
    pub content: Option<String>,
    pub uploaded_by: String,
}

// ============================================================================
// QaLog
// ============================================================================

/// Append-only question/answer log entry for reporting. Agent and user
/// references may dangle after the referenced record is deleted; ids are
/// never reused, so a stale reference stays unambiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaLog {
    pub id: i64,
    pub occurred_at: DateTime<Utc>,
    pub agent_id: Option<i64>,
    pub user_id: Option<String>,
    pub question: String,
    pub answer: String,
    pub response_time_seconds: f64,
    pub category: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQaLog {
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub agent_id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub response_time_seconds: f64,
    #[serde(default)]
    pub category: String,
}

// ============================================================================
// OrganizationCategory
// ============================================================================

/// Leaf node of the three-level organization tree; the controlled vocabulary
/// that user positions and agent scoping triples are drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationCategory {
    pub id: i64,
    pub upper_category: String,
    pub lower_category: String,
    pub detail_category: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrganizationCategory {
    pub upper_category: String,
    pub lower_category: String,
    pub detail_category: String,
}
