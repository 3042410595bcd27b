//! Unified `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::modules::model::{
    ChatModuleEnabled, EnvVarRequirement, Module, ModuleConfiguration, ModuleRequest, RequestState,
};

/// Backend-agnostic database trait covering the module registry, per-user
/// configuration, per-chat enablement, and the request workflow.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Registry ────────────────────────────────────────────────────

    /// Insert a module definition.
    async fn insert_module(&self, module: &Module) -> Result<(), DatabaseError>;

    /// Insert an env-var requirement for a module.
    async fn insert_requirement(&self, req: &EnvVarRequirement) -> Result<(), DatabaseError>;

    /// Get a module by ID.
    async fn get_module(&self, id: Uuid) -> Result<Option<Module>, DatabaseError>;

    /// Look up a module by its unique name (the seeding key).
    async fn get_module_by_name(&self, name: &str) -> Result<Option<Module>, DatabaseError>;

    /// All modules, priority descending.
    async fn list_modules(&self) -> Result<Vec<Module>, DatabaseError>;

    /// Requirements declared by one module.
    async fn list_requirements(&self, module_id: Uuid)
    -> Result<Vec<EnvVarRequirement>, DatabaseError>;

    // ── Configuration ───────────────────────────────────────────────

    /// Get a user's saved value for one requirement.
    async fn get_configuration(
        &self,
        user_id: &str,
        requirement_id: Uuid,
    ) -> Result<Option<ModuleConfiguration>, DatabaseError>;

    /// Insert or update a user's value for a requirement. Last write wins.
    async fn upsert_configuration(
        &self,
        user_id: &str,
        requirement_id: Uuid,
        value: &str,
    ) -> Result<(), DatabaseError>;

    /// All values a user has saved, across modules.
    async fn list_configurations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ModuleConfiguration>, DatabaseError>;

    // ── Chat enablement ─────────────────────────────────────────────

    /// Upsert the enablement flag for (chat, module).
    async fn set_chat_module(
        &self,
        chat_id: Uuid,
        module_id: Uuid,
        enabled: bool,
    ) -> Result<(), DatabaseError>;

    /// Get the enablement row for (chat, module), if one exists.
    async fn get_chat_module(
        &self,
        chat_id: Uuid,
        module_id: Uuid,
    ) -> Result<Option<ChatModuleEnabled>, DatabaseError>;

    /// All enablement rows for a chat.
    async fn list_chat_modules(&self, chat_id: Uuid)
    -> Result<Vec<ChatModuleEnabled>, DatabaseError>;

    // ── Module requests ─────────────────────────────────────────────

    /// Insert a new module request.
    async fn insert_request(&self, request: &ModuleRequest) -> Result<(), DatabaseError>;

    /// Get a request by ID.
    async fn get_request(&self, id: Uuid) -> Result<Option<ModuleRequest>, DatabaseError>;

    /// Look up a request by its tool-call dedup key.
    async fn get_request_by_tool_call(
        &self,
        tool_call_id: &str,
    ) -> Result<Option<ModuleRequest>, DatabaseError>;

    /// Move a request to a new state, optionally recording config values.
    async fn update_request_state(
        &self,
        id: Uuid,
        state: RequestState,
        config_values: Option<&serde_json::Value>,
    ) -> Result<(), DatabaseError>;

    /// Requests for a chat, newest first.
    async fn list_requests(&self, chat_id: Uuid) -> Result<Vec<ModuleRequest>, DatabaseError>;
}
