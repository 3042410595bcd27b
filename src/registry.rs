//! Built-in module catalog and idempotent seeding.
//!
//! The catalog is the static source of truth for which integrations exist and
//! which env vars they declare. Seeding inserts missing modules on startup and
//! leaves existing ones untouched, so stored ids stay stable across restarts.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::DatabaseError;
use crate::modules::model::{EnvVarRequirement, Module, OauthBinding, OauthProvider};
use crate::store::Database;

/// One catalog entry: module metadata plus its declared requirements.
pub struct CatalogModule {
    pub name: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
    pub packages: &'static [&'static str],
    pub documentation: Option<&'static str>,
    pub setup_instructions: Option<&'static str>,
    pub priority: i64,
    pub requirements: Vec<CatalogRequirement>,
}

/// One declared env-var slot in the catalog.
pub struct CatalogRequirement {
    pub name: &'static str,
    pub description: &'static str,
    pub example: &'static str,
    pub required: bool,
    pub public: bool,
    pub oauth: Option<OauthBinding>,
}

/// The built-in integration catalog.
pub fn builtin_catalog() -> Vec<CatalogModule> {
    vec![
        CatalogModule {
            name: "github",
            icon: "github",
            color: "#24292e",
            packages: &["PyGithub"],
            documentation: Some("https://pygithub.readthedocs.io/"),
            setup_instructions: Some(
                "Create a fine-grained personal access token at github.com/settings/tokens.",
            ),
            priority: 100,
            requirements: vec![CatalogRequirement {
                name: "GITHUB_TOKEN",
                description: "Personal access token used for GitHub API calls",
                example: "ghp_xxxxxxxxxxxxxxxx",
                required: true,
                public: false,
                oauth: Some(OauthBinding {
                    provider: OauthProvider::Github,
                    scopes: vec!["repo".to_string(), "read:org".to_string()],
                }),
            }],
        },
        CatalogModule {
            name: "slack",
            icon: "slack",
            color: "#4a154b",
            packages: &["slack-sdk"],
            documentation: Some("https://slack.dev/python-slack-sdk/"),
            setup_instructions: Some("Install the app to your workspace and copy the bot token."),
            priority: 90,
            requirements: vec![
                CatalogRequirement {
                    name: "SLACK_BOT_TOKEN",
                    description: "Bot token for posting and reading messages",
                    example: "xoxb-...",
                    required: true,
                    public: false,
                    oauth: Some(OauthBinding {
                        provider: OauthProvider::Slack,
                        scopes: vec!["chat:write".to_string(), "channels:read".to_string()],
                    }),
                },
                CatalogRequirement {
                    name: "SLACK_DEFAULT_CHANNEL",
                    description: "Channel used when no channel is specified",
                    example: "#general",
                    required: false,
                    public: true,
                    oauth: None,
                },
            ],
        },
        CatalogModule {
            name: "stripe",
            icon: "stripe",
            color: "#635bff",
            packages: &["stripe"],
            documentation: Some("https://stripe.com/docs/api"),
            setup_instructions: Some("Copy a restricted API key from the Stripe dashboard."),
            priority: 80,
            requirements: vec![CatalogRequirement {
                name: "STRIPE_API_KEY",
                description: "Secret API key for the Stripe account",
                example: "sk_test_...",
                required: true,
                public: false,
                oauth: None,
            }],
        },
        CatalogModule {
            name: "google-calendar",
            icon: "calendar",
            color: "#4285f4",
            packages: &["google-api-python-client", "google-auth"],
            documentation: Some("https://developers.google.com/calendar/api"),
            setup_instructions: Some(
                "Connect your Google account; the refresh token is stored as the credential.",
            ),
            priority: 70,
            requirements: vec![
                CatalogRequirement {
                    name: "GOOGLE_REFRESH_TOKEN",
                    description: "OAuth refresh token for the Google account",
                    example: "1//0gxxxxxxxx",
                    required: true,
                    public: false,
                    oauth: Some(OauthBinding {
                        provider: OauthProvider::Google,
                        scopes: vec!["https://www.googleapis.com/auth/calendar".to_string()],
                    }),
                },
                CatalogRequirement {
                    name: "GOOGLE_CALENDAR_ID",
                    description: "Calendar to operate on",
                    example: "primary",
                    required: false,
                    public: true,
                    oauth: None,
                },
            ],
        },
        CatalogModule {
            name: "weather",
            icon: "cloud",
            color: "#0ea5e9",
            packages: &["requests"],
            documentation: Some("https://open-meteo.com/en/docs"),
            setup_instructions: None,
            priority: 10,
            // No required slots — any saved value (e.g. a default location)
            // marks the module configured.
            requirements: vec![CatalogRequirement {
                name: "WEATHER_DEFAULT_LOCATION",
                description: "Location used when the user does not name one",
                example: "Berlin",
                required: false,
                public: true,
                oauth: None,
            }],
        },
    ]
}

/// Seed the catalog into the database. Idempotent: modules already present
/// (matched by name) are skipped entirely, requirements included.
pub async fn seed_catalog(db: &Arc<dyn Database>) -> Result<usize, DatabaseError> {
    let mut inserted = 0;

    for entry in builtin_catalog() {
        if db.get_module_by_name(entry.name).await?.is_some() {
            continue;
        }

        let module = Module {
            id: Uuid::new_v4(),
            name: entry.name.to_string(),
            icon: entry.icon.to_string(),
            color: entry.color.to_string(),
            packages: entry.packages.iter().map(|p| p.to_string()).collect(),
            documentation: entry.documentation.map(String::from),
            setup_instructions: entry.setup_instructions.map(String::from),
            priority: entry.priority,
        };
        db.insert_module(&module).await?;

        for req in entry.requirements {
            let requirement = EnvVarRequirement {
                id: Uuid::new_v4(),
                module_id: module.id,
                name: req.name.to_string(),
                description: req.description.to_string(),
                example: req.example.to_string(),
                required: req.required,
                public: req.public,
                oauth: req.oauth,
            };
            db.insert_requirement(&requirement).await?;
        }

        tracing::info!(module = entry.name, "Seeded module");
        inserted += 1;
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    async fn memory_db() -> Arc<dyn Database> {
        Arc::new(LibSqlBackend::new_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let db = memory_db().await;

        let first = seed_catalog(&db).await.unwrap();
        assert_eq!(first, builtin_catalog().len());

        let second = seed_catalog(&db).await.unwrap();
        assert_eq!(second, 0);

        let modules = db.list_modules().await.unwrap();
        assert_eq!(modules.len(), builtin_catalog().len());
    }

    #[tokio::test]
    async fn test_seed_keeps_existing_module_id() {
        let db = memory_db().await;
        seed_catalog(&db).await.unwrap();
        let before = db.get_module_by_name("github").await.unwrap().unwrap();

        seed_catalog(&db).await.unwrap();
        let after = db.get_module_by_name("github").await.unwrap().unwrap();
        assert_eq!(before.id, after.id);
    }

    #[tokio::test]
    async fn test_github_declares_required_token() {
        let db = memory_db().await;
        seed_catalog(&db).await.unwrap();

        let github = db.get_module_by_name("github").await.unwrap().unwrap();
        let reqs = db.list_requirements(github.id).await.unwrap();
        let token = reqs.iter().find(|r| r.name == "GITHUB_TOKEN").unwrap();
        assert!(token.required);
        assert!(!token.public);
        assert_eq!(
            token.oauth.as_ref().map(|o| o.provider),
            Some(OauthProvider::Github)
        );
    }
}
