use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub logbook_db: DatabaseConfig,
    /// Absent for dry runs, which never touch the target.
    pub target_db: Option<DatabaseConfig>,
    pub remote: Option<RemoteConfig>,
    pub files: FilesConfig,
}

/// Connection settings for one MySQL database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    pub host_port: String,
    pub username: String,
    pub password: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub api_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    pub root: PathBuf,
}

impl Config {
    pub fn from_env(dry_run: bool) -> anyhow::Result<Self> {
        let max_connections = env::var("MIGRATE_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "8".to_string())
            .parse()
            .unwrap_or(8);

        Ok(Self {
            logbook_db: DatabaseConfig::from_env("MIGRATE_LOGBOOK_DB", max_connections)?,
            target_db: if dry_run {
                None
            } else {
                Some(DatabaseConfig::from_env("MIGRATE_TARGET_DB", max_connections)?)
            },
            remote: if dry_run { None } else { Some(RemoteConfig::from_env()?) },
            files: FilesConfig {
                root: PathBuf::from(required("MIGRATE_LOGBOOK_FILES_DIR")?),
            },
        })
    }
}

impl DatabaseConfig {
    /// Reads `<prefix>_NAME`, `<prefix>_HOSTPORT`, `<prefix>_USERNAME` and `<prefix>_PASSWORD`.
    pub fn from_env(prefix: &str, max_connections: u32) -> anyhow::Result<Self> {
        Ok(Self {
            name: required(&format!("{}_NAME", prefix))?,
            host_port: required(&format!("{}_HOSTPORT", prefix))?,
            username: required(&format!("{}_USERNAME", prefix))?,
            password: env::var(format!("{}_PASSWORD", prefix)).unwrap_or_default(),
            max_connections,
        })
    }

    /// Splits `host:port`, defaulting to the MySQL port.
    pub fn host_and_port(&self) -> anyhow::Result<(String, u16)> {
        match self.host_port.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|e| anyhow::anyhow!("Invalid port in '{}': {}", self.host_port, e))?;
                Ok((host.to_string(), port))
            }
            None => Ok((self.host_port.clone(), 3306)),
        }
    }

    /// Connection target for log output, with the password masked.
    pub fn redacted(&self) -> String {
        format!("{}:****@tcp({})/{}", self.username, self.host_port, self.name)
    }
}

impl RemoteConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            scheme: env::var("MIGRATE_REMOTE_SCHEME").unwrap_or_else(|_| "https".to_string()),
            host: required("MIGRATE_REMOTE_HOST")?,
            path: env::var("MIGRATE_REMOTE_PATH").unwrap_or_default(),
            api_token: required("MIGRATE_REMOTE_API_TOKEN")?,
        })
    }

    pub fn base_url(&self) -> String {
        format!(
            "{}://{}/{}",
            self.scheme,
            self.host.trim_end_matches('/'),
            self.path.trim_matches('/')
        )
        .trim_end_matches('/')
        .to_string()
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required environment variable {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db(host_port: &str) -> DatabaseConfig {
        DatabaseConfig {
            name: "logbook".to_string(),
            host_port: host_port.to_string(),
            username: "reader".to_string(),
            password: "secret".to_string(),
            max_connections: 4,
        }
    }

    #[test]
    fn test_host_and_port() {
        assert_eq!(db("db.local:3307").host_and_port().unwrap(), ("db.local".to_string(), 3307));
        assert_eq!(db("db.local").host_and_port().unwrap(), ("db.local".to_string(), 3306));
        assert!(db("db.local:abc").host_and_port().is_err());
    }

    #[test]
    fn test_redacted_hides_password() {
        let redacted = db("db.local:3306").redacted();
        assert_eq!(redacted, "reader:****@tcp(db.local:3306)/logbook");
        assert!(!redacted.contains("secret"));
    }

    #[test]
    fn test_base_url() {
        let remote = RemoteConfig {
            scheme: "https".to_string(),
            host: "bookkeeping.example.org".to_string(),
            path: "/api/".to_string(),
            api_token: "token".to_string(),
        };
        assert_eq!(remote.base_url(), "https://bookkeeping.example.org/api");

        let bare = RemoteConfig { path: String::new(), ..remote };
        assert_eq!(bare.base_url(), "https://bookkeeping.example.org");
    }
}
