use std::fs;
use std::path::{Path, PathBuf};

use colored::Colorize;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{MigrateError, Result};
use crate::model::{NewUser, UserRole};
use crate::output::{Format, print_json};
use crate::store::target::{SqliteTarget, TargetStore};

/// Optional bootstrap user that will own migrated services.
#[derive(Debug, Clone, Default)]
pub struct OwnerArgs {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
struct InitReport {
    config: String,
    target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner_user_id: Option<i64>,
}

pub fn run(
    config_path: &Path,
    legacy: PathBuf,
    target: PathBuf,
    owner: OwnerArgs,
    format: Format,
) -> Result<()> {
    if config_path.exists() {
        return Err(MigrateError::AlreadyInitialized(
            config_path.display().to_string(),
        ));
    }

    // The config is written last so a failed target setup can be retried.
    let new_config = Config::new(legacy, target);
    let config = new_config.resolved_for(config_path);
    if let Some(parent) = config.target.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let store = SqliteTarget::open(&config.target.path)?;
    let owner_user_id = match owner.email {
        Some(email) => Some(ensure_owner(&store, &email, owner.name)?),
        None => None,
    };
    new_config.write_new(config_path)?;
    info!(config = %config_path.display(), target = %config.target.path.display(), "initialized");

    let report = InitReport {
        config: config_path.display().to_string(),
        target: config.target.path.display().to_string(),
        owner_user_id,
    };
    match format {
        Format::Json => print_json(&report)?,
        Format::Pretty => {
            println!("Wrote {}", report.config.cyan());
            println!("  {} {}", "target:".dimmed(), report.target);
            if let Some(id) = owner_user_id {
                println!("  {} user {}", "owner:".dimmed(), id);
            }
        }
        Format::Minimal => println!("{}", report.config),
    }
    Ok(())
}

/// Reuse the user with this email, or create it as an admin.
fn ensure_owner(store: &dyn TargetStore, email: &str, name: Option<String>) -> Result<i64> {
    if let Some(id) = store.find_user_by_email(email)? {
        return Ok(id);
    }
    store.create_user(&NewUser {
        name: name.unwrap_or_else(|| "Owner".to_string()),
        email: email.to_lowercase(),
        password: Uuid::new_v4().simple().to_string(),
        phone: None,
        role: UserRole::Admin,
    })
}
