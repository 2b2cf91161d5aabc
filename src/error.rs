use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("config file '{0}' not found (run `tasklift init` first)")]
    ConfigNotFound(String),

    #[error("config file '{0}' already exists")]
    AlreadyInitialized(String),

    #[error("legacy connection '{0}' is not defined in the config file")]
    ConnectionNotFound(String),

    #[error("legacy database '{0}' does not exist")]
    LegacyDatabaseMissing(String),

    #[error("required legacy table '{0}' is missing")]
    MissingLegacyTable(String),

    #[error("target store has no users; create an owner user before migrating services")]
    NoOwnerUser,

    #[error("invalid dynamic table name '{0}'")]
    InvalidTableName(String),

    #[error("legacy row is missing column '{0}'")]
    MissingColumn(String),

    #[error("target write failed: {0}")]
    Target(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl MigrateError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigNotFound(_) => "config_not_found",
            Self::AlreadyInitialized(_) => "already_initialized",
            Self::ConnectionNotFound(_) => "connection_not_found",
            Self::LegacyDatabaseMissing(_) => "legacy_database_missing",
            Self::MissingLegacyTable(_) => "missing_legacy_table",
            Self::NoOwnerUser => "no_owner_user",
            Self::InvalidTableName(_) => "invalid_table_name",
            Self::MissingColumn(_) => "missing_column",
            Self::Target(_) => "target_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Yaml(_) => "yaml_error",
            Self::Db(_) => "db_error",
        }
    }

    /// Errors that abort the whole run instead of failing a single task.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_)
                | Self::AlreadyInitialized(_)
                | Self::ConnectionNotFound(_)
                | Self::LegacyDatabaseMissing(_)
                | Self::MissingLegacyTable(_)
                | Self::NoOwnerUser
        )
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;
