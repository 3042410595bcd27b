//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::modules::model::{
    ChatModuleEnabled, EnvVarRequirement, Module, ModuleConfiguration, ModuleRequest, OauthBinding,
    OauthProvider, RequestState,
};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Parse a state string from the DB.
fn str_to_state(s: &str) -> RequestState {
    match s {
        "approved" => RequestState::Approved,
        "denied" => RequestState::Denied,
        _ => RequestState::Pending,
    }
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map a libsql Row to a Module.
///
/// Column order matches MODULE_COLUMNS:
/// 0:id, 1:name, 2:icon, 3:color, 4:packages, 5:documentation,
/// 6:setup_instructions, 7:priority
fn row_to_module(row: &libsql::Row) -> Result<Module, libsql::Error> {
    let id_str: String = row.get(0)?;
    let packages_str: String = row.get::<String>(4).unwrap_or_else(|_| "[]".into());

    Ok(Module {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        name: row.get(1)?,
        icon: row.get(2)?,
        color: row.get(3)?,
        packages: serde_json::from_str(&packages_str).unwrap_or_default(),
        documentation: row.get(5).ok(),
        setup_instructions: row.get(6).ok(),
        priority: row.get(7)?,
    })
}

/// Map a libsql Row to an EnvVarRequirement.
///
/// Column order matches REQUIREMENT_COLUMNS:
/// 0:id, 1:module_id, 2:name, 3:description, 4:example, 5:required,
/// 6:public, 7:oauth_provider, 8:oauth_scopes
fn row_to_requirement(row: &libsql::Row) -> Result<EnvVarRequirement, libsql::Error> {
    let id_str: String = row.get(0)?;
    let module_id_str: String = row.get(1)?;
    let required: i64 = row.get(5)?;
    let public: i64 = row.get(6)?;
    let provider_str: Option<String> = row.get(7).ok();
    let scopes_str: Option<String> = row.get(8).ok();

    let oauth = provider_str
        .as_deref()
        .and_then(OauthProvider::parse)
        .map(|provider| OauthBinding {
            provider,
            scopes: scopes_str
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_default(),
        });

    Ok(EnvVarRequirement {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        module_id: Uuid::parse_str(&module_id_str).unwrap_or_else(|_| Uuid::nil()),
        name: row.get(2)?,
        description: row.get(3)?,
        example: row.get(4)?,
        required: required != 0,
        public: public != 0,
        oauth,
    })
}

/// Map a libsql Row to a ModuleConfiguration.
fn row_to_configuration(row: &libsql::Row) -> Result<ModuleConfiguration, libsql::Error> {
    let requirement_id_str: String = row.get(1)?;
    let updated_str: String = row.get(3)?;

    Ok(ModuleConfiguration {
        user_id: row.get(0)?,
        requirement_id: Uuid::parse_str(&requirement_id_str).unwrap_or_else(|_| Uuid::nil()),
        value: row.get(2)?,
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to a ChatModuleEnabled.
fn row_to_chat_module(row: &libsql::Row) -> Result<ChatModuleEnabled, libsql::Error> {
    let chat_id_str: String = row.get(0)?;
    let module_id_str: String = row.get(1)?;
    let enabled: i64 = row.get(2)?;
    let updated_str: String = row.get(3)?;

    Ok(ChatModuleEnabled {
        chat_id: Uuid::parse_str(&chat_id_str).unwrap_or_else(|_| Uuid::nil()),
        module_id: Uuid::parse_str(&module_id_str).unwrap_or_else(|_| Uuid::nil()),
        enabled: enabled != 0,
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to a ModuleRequest.
///
/// Column order matches REQUEST_COLUMNS:
/// 0:id, 1:chat_id, 2:module_id, 3:tool_call_id, 4:reason, 5:state,
/// 6:config_values, 7:created_at, 8:updated_at
fn row_to_request(row: &libsql::Row) -> Result<ModuleRequest, libsql::Error> {
    let id_str: String = row.get(0)?;
    let chat_id_str: String = row.get(1)?;
    let module_id_str: String = row.get(2)?;
    let state_str: String = row.get(5)?;
    let config_str: Option<String> = row.get(6).ok();
    let created_str: String = row.get(7)?;
    let updated_str: String = row.get(8)?;

    Ok(ModuleRequest {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        chat_id: Uuid::parse_str(&chat_id_str).unwrap_or_else(|_| Uuid::nil()),
        module_id: Uuid::parse_str(&module_id_str).unwrap_or_else(|_| Uuid::nil()),
        tool_call_id: row.get(3)?,
        reason: row.get(4)?,
        state: str_to_state(&state_str),
        config_values: config_str.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const MODULE_COLUMNS: &str =
    "id, name, icon, color, packages, documentation, setup_instructions, priority";

const REQUIREMENT_COLUMNS: &str =
    "id, module_id, name, description, example, required, public, oauth_provider, oauth_scopes";

const CONFIGURATION_COLUMNS: &str = "user_id, requirement_id, value, updated_at";

const CHAT_MODULE_COLUMNS: &str = "chat_id, module_id, enabled, updated_at";

const REQUEST_COLUMNS: &str =
    "id, chat_id, module_id, tool_call_id, reason, state, config_values, created_at, updated_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Registry ────────────────────────────────────────────────────

    async fn insert_module(&self, module: &Module) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let packages = serde_json::to_string(&module.packages)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO modules (id, name, icon, color, packages, documentation, setup_instructions, priority) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                module.id.to_string(),
                module.name.clone(),
                module.icon.clone(),
                module.color.clone(),
                packages,
                opt_text(module.documentation.as_deref()),
                opt_text(module.setup_instructions.as_deref()),
                module.priority,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_module: {e}")))?;

        debug!(module = %module.name, "Module inserted into DB");
        Ok(())
    }

    async fn insert_requirement(&self, req: &EnvVarRequirement) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let provider = req.oauth.as_ref().map(|o| o.provider.as_str());
        let scopes = match &req.oauth {
            Some(o) if !o.scopes.is_empty() => Some(
                serde_json::to_string(&o.scopes)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
            ),
            _ => None,
        };

        conn.execute(
            "INSERT INTO env_var_requirements (id, module_id, name, description, example, required, public, oauth_provider, oauth_scopes) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                req.id.to_string(),
                req.module_id.to_string(),
                req.name.clone(),
                req.description.clone(),
                req.example.clone(),
                req.required as i64,
                req.public as i64,
                opt_text(provider),
                opt_text(scopes.as_deref()),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_requirement: {e}")))?;

        Ok(())
    }

    async fn get_module(&self, id: Uuid) -> Result<Option<Module>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {MODULE_COLUMNS} FROM modules WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_module: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let module = row_to_module(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_module row parse: {e}")))?;
                Ok(Some(module))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_module: {e}"))),
        }
    }

    async fn get_module_by_name(&self, name: &str) -> Result<Option<Module>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {MODULE_COLUMNS} FROM modules WHERE name = ?1"),
                params![name],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_module_by_name: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let module = row_to_module(&row)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                Ok(Some(module))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_module_by_name: {e}"))),
        }
    }

    async fn list_modules(&self) -> Result<Vec<Module>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {MODULE_COLUMNS} FROM modules ORDER BY priority DESC, name ASC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_modules: {e}")))?;

        let mut modules = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_module(&row) {
                Ok(m) => modules.push(m),
                Err(e) => tracing::warn!("Skipping module row: {e}"),
            }
        }
        Ok(modules)
    }

    async fn list_requirements(
        &self,
        module_id: Uuid,
    ) -> Result<Vec<EnvVarRequirement>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {REQUIREMENT_COLUMNS} FROM env_var_requirements WHERE module_id = ?1 ORDER BY name ASC"
                ),
                params![module_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_requirements: {e}")))?;

        let mut reqs = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_requirement(&row) {
                Ok(r) => reqs.push(r),
                Err(e) => tracing::warn!("Skipping requirement row: {e}"),
            }
        }
        Ok(reqs)
    }

    // ── Configuration ───────────────────────────────────────────────

    async fn get_configuration(
        &self,
        user_id: &str,
        requirement_id: Uuid,
    ) -> Result<Option<ModuleConfiguration>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CONFIGURATION_COLUMNS} FROM module_configurations WHERE user_id = ?1 AND requirement_id = ?2"
                ),
                params![user_id, requirement_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_configuration: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let config = row_to_configuration(&row)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                Ok(Some(config))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_configuration: {e}"))),
        }
    }

    async fn upsert_configuration(
        &self,
        user_id: &str,
        requirement_id: Uuid,
        value: &str,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO module_configurations (user_id, requirement_id, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_id, requirement_id) DO UPDATE SET value = ?3, updated_at = ?4",
            params![user_id, requirement_id.to_string(), value, now],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("upsert_configuration: {e}")))?;

        debug!(user_id, requirement_id = %requirement_id, "Configuration value saved");
        Ok(())
    }

    async fn list_configurations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ModuleConfiguration>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CONFIGURATION_COLUMNS} FROM module_configurations WHERE user_id = ?1"
                ),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_configurations: {e}")))?;

        let mut configs = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_configuration(&row) {
                Ok(c) => configs.push(c),
                Err(e) => tracing::warn!("Skipping configuration row: {e}"),
            }
        }
        Ok(configs)
    }

    // ── Chat enablement ─────────────────────────────────────────────

    async fn set_chat_module(
        &self,
        chat_id: Uuid,
        module_id: Uuid,
        enabled: bool,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO chat_modules (chat_id, module_id, enabled, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (chat_id, module_id) DO UPDATE SET enabled = ?3, updated_at = ?4",
            params![chat_id.to_string(), module_id.to_string(), enabled as i64, now],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("set_chat_module: {e}")))?;

        debug!(chat_id = %chat_id, module_id = %module_id, enabled, "Chat module toggled");
        Ok(())
    }

    async fn get_chat_module(
        &self,
        chat_id: Uuid,
        module_id: Uuid,
    ) -> Result<Option<ChatModuleEnabled>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CHAT_MODULE_COLUMNS} FROM chat_modules WHERE chat_id = ?1 AND module_id = ?2"
                ),
                params![chat_id.to_string(), module_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_chat_module: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let cm = row_to_chat_module(&row)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                Ok(Some(cm))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_chat_module: {e}"))),
        }
    }

    async fn list_chat_modules(
        &self,
        chat_id: Uuid,
    ) -> Result<Vec<ChatModuleEnabled>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {CHAT_MODULE_COLUMNS} FROM chat_modules WHERE chat_id = ?1"),
                params![chat_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_chat_modules: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_chat_module(&row) {
                Ok(cm) => entries.push(cm),
                Err(e) => tracing::warn!("Skipping chat module row: {e}"),
            }
        }
        Ok(entries)
    }

    // ── Module requests ─────────────────────────────────────────────

    async fn insert_request(&self, request: &ModuleRequest) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let config_values = match &request.config_values {
            Some(v) => Some(
                serde_json::to_string(v)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
            ),
            None => None,
        };

        conn.execute(
            "INSERT INTO module_requests (id, chat_id, module_id, tool_call_id, reason, state, config_values, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                request.id.to_string(),
                request.chat_id.to_string(),
                request.module_id.to_string(),
                request.tool_call_id.clone(),
                request.reason.clone(),
                request.state.as_str(),
                opt_text(config_values.as_deref()),
                request.created_at.to_rfc3339(),
                request.updated_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_request: {e}")))?;

        debug!(request_id = %request.id, tool_call_id = %request.tool_call_id, "Module request inserted");
        Ok(())
    }

    async fn get_request(&self, id: Uuid) -> Result<Option<ModuleRequest>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {REQUEST_COLUMNS} FROM module_requests WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_request: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let request = row_to_request(&row)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                Ok(Some(request))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_request: {e}"))),
        }
    }

    async fn get_request_by_tool_call(
        &self,
        tool_call_id: &str,
    ) -> Result<Option<ModuleRequest>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {REQUEST_COLUMNS} FROM module_requests WHERE tool_call_id = ?1"),
                params![tool_call_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_request_by_tool_call: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let request = row_to_request(&row)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                Ok(Some(request))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_request_by_tool_call: {e}"))),
        }
    }

    async fn update_request_state(
        &self,
        id: Uuid,
        state: RequestState,
        config_values: Option<&serde_json::Value>,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let config_str = match config_values {
            Some(v) => Some(
                serde_json::to_string(v)
                    .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
            ),
            None => None,
        };

        let result = if let Some(config) = config_str {
            conn.execute(
                "UPDATE module_requests SET state = ?1, config_values = ?2, updated_at = ?3 WHERE id = ?4",
                params![state.as_str(), config, now, id.to_string()],
            )
            .await
        } else {
            conn.execute(
                "UPDATE module_requests SET state = ?1, updated_at = ?2 WHERE id = ?3",
                params![state.as_str(), now, id.to_string()],
            )
            .await
        };
        result.map_err(|e| DatabaseError::Query(format!("update_request_state: {e}")))?;

        debug!(request_id = %id, state = %state, "Module request state updated");
        Ok(())
    }

    async fn list_requests(&self, chat_id: Uuid) -> Result<Vec<ModuleRequest>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {REQUEST_COLUMNS} FROM module_requests WHERE chat_id = ?1 ORDER BY created_at DESC"
                ),
                params![chat_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_requests: {e}")))?;

        let mut requests = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_request(&row) {
                Ok(r) => requests.push(r),
                Err(e) => tracing::warn!("Skipping request row: {e}"),
            }
        }
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_module(name: &str, priority: i64) -> Module {
        Module {
            id: Uuid::new_v4(),
            name: name.to_string(),
            icon: "icon".to_string(),
            color: "#000000".to_string(),
            packages: vec![format!("{name}-sdk")],
            documentation: None,
            setup_instructions: None,
            priority,
        }
    }

    fn sample_requirement(module_id: Uuid, name: &str, required: bool) -> EnvVarRequirement {
        EnvVarRequirement {
            id: Uuid::new_v4(),
            module_id,
            name: name.to_string(),
            description: format!("{name} description"),
            example: "example".to_string(),
            required,
            public: false,
            oauth: None,
        }
    }

    #[tokio::test]
    async fn test_module_roundtrip() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let module = sample_module("github", 10);
        db.insert_module(&module).await.unwrap();

        let loaded = db.get_module(module.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "github");
        assert_eq!(loaded.packages, vec!["github-sdk".to_string()]);

        let by_name = db.get_module_by_name("github").await.unwrap().unwrap();
        assert_eq!(by_name.id, module.id);
        assert!(db.get_module_by_name("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_modules_priority_order() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.insert_module(&sample_module("low", 1)).await.unwrap();
        db.insert_module(&sample_module("high", 9)).await.unwrap();
        db.insert_module(&sample_module("mid", 5)).await.unwrap();

        let names: Vec<String> = db
            .list_modules()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn test_requirement_oauth_roundtrip() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let module = sample_module("slack", 1);
        db.insert_module(&module).await.unwrap();

        let mut req = sample_requirement(module.id, "SLACK_BOT_TOKEN", true);
        req.oauth = Some(OauthBinding {
            provider: OauthProvider::Slack,
            scopes: vec!["chat:write".to_string()],
        });
        db.insert_requirement(&req).await.unwrap();

        let loaded = db.list_requirements(module.id).await.unwrap();
        assert_eq!(loaded.len(), 1);
        let oauth = loaded[0].oauth.as_ref().unwrap();
        assert_eq!(oauth.provider, OauthProvider::Slack);
        assert_eq!(oauth.scopes, vec!["chat:write".to_string()]);
    }

    #[tokio::test]
    async fn test_configuration_upsert_is_single_row() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let module = sample_module("github", 1);
        db.insert_module(&module).await.unwrap();
        let req = sample_requirement(module.id, "GITHUB_TOKEN", true);
        db.insert_requirement(&req).await.unwrap();

        db.upsert_configuration("u1", req.id, "tok").await.unwrap();
        db.upsert_configuration("u1", req.id, "tok").await.unwrap();
        db.upsert_configuration("u1", req.id, "tok2").await.unwrap();

        let configs = db.list_configurations("u1").await.unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].value, "tok2");
    }

    #[tokio::test]
    async fn test_chat_module_toggle_single_row() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let module = sample_module("stripe", 1);
        db.insert_module(&module).await.unwrap();
        let chat_id = Uuid::new_v4();

        assert!(db.get_chat_module(chat_id, module.id).await.unwrap().is_none());

        db.set_chat_module(chat_id, module.id, true).await.unwrap();
        db.set_chat_module(chat_id, module.id, false).await.unwrap();

        let rows = db.list_chat_modules(chat_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].enabled);
    }

    #[tokio::test]
    async fn test_request_unique_tool_call_id() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let module = sample_module("github", 1);
        db.insert_module(&module).await.unwrap();
        let chat_id = Uuid::new_v4();

        let request = ModuleRequest {
            id: Uuid::new_v4(),
            chat_id,
            module_id: module.id,
            tool_call_id: "call_1".to_string(),
            reason: "need repo access".to_string(),
            state: RequestState::Pending,
            config_values: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        db.insert_request(&request).await.unwrap();

        let mut duplicate = request.clone();
        duplicate.id = Uuid::new_v4();
        assert!(db.insert_request(&duplicate).await.is_err());

        let found = db.get_request_by_tool_call("call_1").await.unwrap().unwrap();
        assert_eq!(found.id, request.id);
    }

    #[tokio::test]
    async fn test_request_state_update_persists_config_values() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let module = sample_module("github", 1);
        db.insert_module(&module).await.unwrap();

        let request = ModuleRequest {
            id: Uuid::new_v4(),
            chat_id: Uuid::new_v4(),
            module_id: module.id,
            tool_call_id: "call_2".to_string(),
            reason: "list issues".to_string(),
            state: RequestState::Pending,
            config_values: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        db.insert_request(&request).await.unwrap();

        let values = serde_json::json!({"GITHUB_TOKEN": "tok"});
        db.update_request_state(request.id, RequestState::Approved, Some(&values))
            .await
            .unwrap();

        let loaded = db.get_request(request.id).await.unwrap().unwrap();
        assert_eq!(loaded.state, RequestState::Approved);
        assert_eq!(loaded.config_values, Some(values));
    }

    #[tokio::test]
    async fn test_local_file_backend_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modules.db");

        let module = sample_module("github", 1);
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.insert_module(&module).await.unwrap();
        }

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let loaded = db.get_module(module.id).await.unwrap();
        assert!(loaded.is_some());
    }
}
