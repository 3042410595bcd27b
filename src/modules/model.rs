//! Domain types for the module workflow.
//!
//! A "module" is a third-party integration (GitHub, Stripe, Slack, ...) the chat
//! assistant can use once the user has supplied its credentials and enabled it
//! for a conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OAuth provider a requirement can be bound to.
///
/// Typed variant dispatch — providers with special credential flows are
/// enumerated here rather than selected by free-form string tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OauthProvider {
    Github,
    Google,
    Slack,
    Stripe,
}

impl OauthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OauthProvider::Github => "github",
            OauthProvider::Google => "google",
            OauthProvider::Slack => "slack",
            OauthProvider::Stripe => "stripe",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "github" => Some(OauthProvider::Github),
            "google" => Some(OauthProvider::Google),
            "slack" => Some(OauthProvider::Slack),
            "stripe" => Some(OauthProvider::Stripe),
            _ => None,
        }
    }
}

/// OAuth binding on an env-var requirement: which provider issues the value
/// and the scopes it must be granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OauthBinding {
    pub provider: OauthProvider,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// A third-party integration definition from the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: Uuid,
    /// Unique name, also the seeding key (e.g. "github").
    pub name: String,
    pub icon: String,
    pub color: String,
    /// Packages installed into the code-execution sandbox when this module is active.
    pub packages: Vec<String>,
    pub documentation: Option<String>,
    pub setup_instructions: Option<String>,
    /// Listing sort key, descending.
    pub priority: i64,
}

/// A named credential/config slot a module needs before it can run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarRequirement {
    pub id: Uuid,
    pub module_id: Uuid,
    /// Environment variable name as exposed to the sandbox (e.g. "GITHUB_TOKEN").
    pub name: String,
    pub description: String,
    pub example: String,
    /// Must be filled in before the module counts as configured.
    pub required: bool,
    /// Safe to echo back to the client; non-public values are credentials.
    pub public: bool,
    pub oauth: Option<OauthBinding>,
}

/// A user's stored value for one requirement. One row per (user, requirement).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfiguration {
    pub user_id: String,
    pub requirement_id: Uuid,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Per-chat on/off flag for a module. One row per (chat, module).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatModuleEnabled {
    pub chat_id: Uuid,
    pub module_id: Uuid,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

/// State of an assistant-initiated module request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Pending,
    Approved,
    Denied,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Pending => "pending",
            RequestState::Approved => "approved",
            RequestState::Denied => "denied",
        }
    }

    /// Approved and denied are terminal — no transitions out.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestState::Pending)
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An assistant-initiated request to enable a module mid-conversation.
///
/// Created at most once per `tool_call_id`; the user's decision moves it to a
/// terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRequest {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub module_id: Uuid,
    /// Dedup key from the AI tool layer.
    pub tool_call_id: String,
    /// Why the assistant wants the module, shown to the user.
    pub reason: String,
    pub state: RequestState,
    /// Configuration values supplied along with the approval, if any.
    pub config_values: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One requirement joined with the calling user's saved value (listing shape).
///
/// Non-public values are redacted to a set/unset marker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementView {
    #[serde(flatten)]
    pub requirement: EnvVarRequirement,
    /// The saved value for public requirements; `None` otherwise.
    pub value: Option<String>,
    /// Whether any value is saved, public or not.
    pub is_set: bool,
}

/// A module joined with requirement views and computed status (listing shape).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleOverview {
    #[serde(flatten)]
    pub module: Module,
    pub requirements: Vec<RequirementView>,
    pub is_configured: bool,
    /// Present only when the listing was scoped to a chat. A chat with no
    /// enablement row defaults to `false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_enabled: Option<bool>,
}

/// Whether a module counts as configured for a user.
///
/// With at least one required requirement: every required slot must hold a
/// non-empty value. With none: at least one value of any kind must be saved.
pub fn is_configured(requirements: &[EnvVarRequirement], values: &[ModuleConfiguration]) -> bool {
    let has_value = |req: &EnvVarRequirement| {
        values
            .iter()
            .any(|c| c.requirement_id == req.id && !c.value.is_empty())
    };

    let required: Vec<&EnvVarRequirement> =
        requirements.iter().filter(|r| r.required).collect();

    if required.is_empty() {
        requirements.iter().any(|r| has_value(r))
    } else {
        required.iter().all(|r| has_value(r))
    }
}
