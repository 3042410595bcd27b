//! Module workflow service — listing, configuration save, chat enablement,
//! and the assistant-initiated request flow.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, ModuleError, Result};
use crate::modules::model::{
    self, ChatModuleEnabled, ModuleOverview, ModuleRequest, RequestState, RequirementView,
};
use crate::modules::runtime::RuntimeEnv;
use crate::store::Database;

/// The user's verdict on a pending module request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDecision {
    Approve,
    Deny,
}

impl RequestDecision {
    fn target_state(&self) -> RequestState {
        match self {
            RequestDecision::Approve => RequestState::Approved,
            RequestDecision::Deny => RequestState::Denied,
        }
    }
}

/// Stateless facade over the `Database` trait implementing the workflow rules.
pub struct ModuleService {
    db: Arc<dyn Database>,
}

impl ModuleService {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    // ── Listing ─────────────────────────────────────────────────────

    /// Every module joined with its requirements, the user's saved values, a
    /// computed `is_configured`, and (when `chat_id` is given) the enablement
    /// flag defaulted to `false` for chats with no row.
    pub async fn list_modules(
        &self,
        user_id: &str,
        chat_id: Option<Uuid>,
    ) -> Result<Vec<ModuleOverview>> {
        let modules = self.db.list_modules().await?;
        let configurations = self.db.list_configurations(user_id).await?;

        let enabled_by_module: HashMap<Uuid, bool> = match chat_id {
            Some(chat_id) => self
                .db
                .list_chat_modules(chat_id)
                .await?
                .into_iter()
                .map(|cm| (cm.module_id, cm.enabled))
                .collect(),
            None => HashMap::new(),
        };

        let mut overviews = Vec::with_capacity(modules.len());
        for module in modules {
            let requirements = self.db.list_requirements(module.id).await?;
            let is_configured = model::is_configured(&requirements, &configurations);

            let requirement_views = requirements
                .into_iter()
                .map(|requirement| {
                    let saved = configurations
                        .iter()
                        .find(|c| c.requirement_id == requirement.id);
                    RequirementView {
                        is_set: saved.is_some_and(|c| !c.value.is_empty()),
                        value: saved
                            .filter(|_| requirement.public)
                            .map(|c| c.value.clone()),
                        requirement,
                    }
                })
                .collect();

            let is_enabled = chat_id
                .map(|_| enabled_by_module.get(&module.id).copied().unwrap_or(false));

            overviews.push(ModuleOverview {
                module,
                requirements: requirement_views,
                is_configured,
                is_enabled,
            });
        }

        Ok(overviews)
    }

    // ── Configuration save ──────────────────────────────────────────

    /// Save the user's values for a module's requirements.
    ///
    /// Every requirement id must belong to the module; otherwise the whole
    /// call is rejected before any write. Unchanged values are skipped.
    /// Writes fan out concurrently and are not transactional across fields —
    /// a failed field leaves earlier fields saved.
    ///
    /// Returns the number of fields actually written.
    pub async fn save_configuration(
        &self,
        user_id: &str,
        module_id: Uuid,
        values: &HashMap<Uuid, String>,
    ) -> Result<usize> {
        let module = self
            .db
            .get_module(module_id)
            .await?
            .ok_or(ModuleError::ModuleNotFound { id: module_id })?;

        let requirements = self.db.list_requirements(module.id).await?;
        for requirement_id in values.keys() {
            if !requirements.iter().any(|r| r.id == *requirement_id) {
                return Err(ModuleError::RequirementMismatch {
                    requirement_id: *requirement_id,
                    module_id,
                }
                .into());
            }
        }

        // Skip fields whose stored value already matches.
        let mut pending = Vec::new();
        for (requirement_id, value) in values {
            let existing = self.db.get_configuration(user_id, *requirement_id).await?;
            if existing.map(|c| c.value) != Some(value.clone()) {
                pending.push((*requirement_id, value.as_str()));
            }
        }

        let written = pending.len();
        let writes = pending
            .into_iter()
            .map(|(requirement_id, value)| {
                self.db.upsert_configuration(user_id, requirement_id, value)
            });
        for result in join_all(writes).await {
            result?;
        }

        info!(user_id, module = %module.name, fields = written, "Module configuration saved");
        Ok(written)
    }

    // ── Chat enablement ─────────────────────────────────────────────

    /// Upsert the enablement flag for (chat, module). Idempotent.
    pub async fn set_chat_module(
        &self,
        chat_id: Uuid,
        module_id: Uuid,
        enabled: bool,
    ) -> Result<()> {
        if self.db.get_module(module_id).await?.is_none() {
            return Err(ModuleError::ModuleNotFound { id: module_id }.into());
        }
        self.db.set_chat_module(chat_id, module_id, enabled).await?;
        Ok(())
    }

    /// All enablement rows for a chat.
    pub async fn list_chat_modules(&self, chat_id: Uuid) -> Result<Vec<ChatModuleEnabled>> {
        Ok(self.db.list_chat_modules(chat_id).await?)
    }

    // ── Request workflow ────────────────────────────────────────────

    /// Create a module request, or return the existing one for this tool call.
    ///
    /// If the module is already enabled for the chat, the request is created
    /// pre-approved so the assistant can proceed without a round-trip to the
    /// user.
    pub async fn get_or_create_request(
        &self,
        chat_id: Uuid,
        module_id: Uuid,
        tool_call_id: &str,
        reason: &str,
    ) -> Result<ModuleRequest> {
        if let Some(existing) = self.db.get_request_by_tool_call(tool_call_id).await? {
            return Ok(existing);
        }

        let module = self
            .db
            .get_module(module_id)
            .await?
            .ok_or(ModuleError::ModuleNotFound { id: module_id })?;

        let already_enabled = self
            .db
            .get_chat_module(chat_id, module_id)
            .await?
            .is_some_and(|cm| cm.enabled);

        let now = chrono::Utc::now();
        let request = ModuleRequest {
            id: Uuid::new_v4(),
            chat_id,
            module_id,
            tool_call_id: tool_call_id.to_string(),
            reason: reason.to_string(),
            state: if already_enabled {
                RequestState::Approved
            } else {
                RequestState::Pending
            },
            config_values: None,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_request(&request).await?;

        info!(
            module = %module.name,
            chat_id = %chat_id,
            state = %request.state,
            "Module request created"
        );
        Ok(request)
    }

    /// Apply the user's decision to a pending request.
    ///
    /// Approval upserts the chat enablement flag; denial has no side effect.
    /// Terminal requests reject further transitions.
    pub async fn resolve_request(
        &self,
        request_id: Uuid,
        decision: RequestDecision,
        config_values: Option<serde_json::Value>,
    ) -> Result<ModuleRequest> {
        let request = self
            .db
            .get_request(request_id)
            .await?
            .ok_or(ModuleError::RequestNotFound { id: request_id })?;

        let target = decision.target_state();
        if request.state.is_terminal() {
            return Err(ModuleError::AlreadyResolved {
                id: request_id,
                state: request.state.to_string(),
                target: target.to_string(),
            }
            .into());
        }

        self.db
            .update_request_state(request_id, target, config_values.as_ref())
            .await?;

        if decision == RequestDecision::Approve {
            self.db
                .set_chat_module(request.chat_id, request.module_id, true)
                .await?;
        }

        info!(request_id = %request_id, state = %target, "Module request resolved");
        self.db
            .get_request(request_id)
            .await?
            .ok_or_else(|| Error::from(ModuleError::RequestNotFound { id: request_id }))
    }

    /// Requests raised in a chat, newest first.
    pub async fn list_requests(&self, chat_id: Uuid) -> Result<Vec<ModuleRequest>> {
        Ok(self.db.list_requests(chat_id).await?)
    }

    // ── Runtime environment ─────────────────────────────────────────

    /// Collect the packages and env vars of every module that is both enabled
    /// for the chat and configured by the user. Enabled-but-unconfigured
    /// modules are skipped with a warning.
    pub async fn runtime_env(&self, user_id: &str, chat_id: Uuid) -> Result<RuntimeEnv> {
        let configurations = self.db.list_configurations(user_id).await?;
        let mut env = RuntimeEnv::default();

        for cm in self.db.list_chat_modules(chat_id).await? {
            if !cm.enabled {
                continue;
            }
            let Some(module) = self.db.get_module(cm.module_id).await? else {
                warn!(module_id = %cm.module_id, "Enabled module no longer in registry");
                continue;
            };
            let requirements = self.db.list_requirements(module.id).await?;
            if !model::is_configured(&requirements, &configurations) {
                warn!(module = %module.name, "Skipping enabled but unconfigured module");
                continue;
            }
            env.add_module(&module, &requirements, &configurations);
        }

        Ok(env)
    }
}
