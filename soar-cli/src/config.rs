use anyhow::{anyhow, Context, Result};
use soar_core::{ActionRegistry, Database, PlaybookEngine, SoarConfig, Stores};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Settings the CLI needs on top of [`SoarConfig`]: who is acting, for which tenant.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub soar: SoarConfig,
    pub tenant_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

impl CliConfig {
    pub fn load(tenant_id: Option<Uuid>, user_id: Option<Uuid>) -> Result<Self> {
        let soar = SoarConfig::load().context("Failed to load configuration")?;
        Ok(Self {
            soar,
            tenant_id,
            user_id,
        })
    }

    pub fn tenant(&self) -> Result<Uuid> {
        self.tenant_id.ok_or_else(|| {
            anyhow!("No tenant given. Pass --tenant or set SOAR_TENANT_ID")
        })
    }

    pub fn user(&self) -> Result<Uuid> {
        self.user_id
            .ok_or_else(|| anyhow!("No user given. Pass --user or set SOAR_USER_ID"))
    }

    pub fn database_url(&self) -> &str {
        self.soar.database_url()
    }

    pub async fn connect(&self) -> Result<Database> {
        let db = Database::connect(&self.soar.database).await?;
        Ok(db)
    }

    /// Connects to Postgres and wires an engine with the built-in actions.
    pub async fn engine(&self) -> Result<(Database, Arc<PlaybookEngine>)> {
        let db = self.connect().await?;
        debug!(
            database = %mask_password(self.database_url()),
            tenant_id = ?self.tenant_id,
            "Connected, building engine"
        );
        let engine = PlaybookEngine::new(
            Stores::postgres(db.pool().clone()),
            ActionRegistry::with_builtins(),
            &self.soar.engine,
        );
        Ok((db, engine))
    }
}

pub fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(proto_end) = url.find("://") {
            let before_auth = &url[..proto_end + 3];
            let after_at = &url[at_pos..];
            if let Some(colon_pos) = url[proto_end + 3..at_pos].find(':') {
                let user = &url[proto_end + 3..proto_end + 3 + colon_pos];
                return format!("{}{}:****{}", before_auth, user, after_at);
            }
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_password() {
        assert_eq!(
            mask_password("postgres://soar:hunter2@db:5432/soar"),
            "postgres://soar:****@db:5432/soar"
        );
        assert_eq!(
            mask_password("postgres://localhost/soar"),
            "postgres://localhost/soar"
        );
    }

    #[test]
    fn test_missing_identity() {
        let config = CliConfig {
            soar: SoarConfig::default(),
            tenant_id: None,
            user_id: None,
        };
        assert!(config.tenant().is_err());
        assert!(config.user().is_err());

        let tenant = Uuid::new_v4();
        let config = CliConfig {
            tenant_id: Some(tenant),
            ..config
        };
        assert_eq!(config.tenant().unwrap(), tenant);
    }
}
