use std::env;

#[derive(Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub identity: IdentityConfig,
    pub push: PushConfig,
}

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub username: String,
    pub password: String,
    pub server: String,
    pub port: u32,
    pub database: String,
    pub pool_size: u32,
}

/// External identity endpoint ("given credentials, return an identity").
/// Unset means logins are disabled.
#[derive(Clone)]
pub struct IdentityConfig {
    pub endpoint: Option<String>,
}

/// External push transport. Unset means delivery is silently skipped.
#[derive(Clone)]
pub struct PushConfig {
    pub endpoint: Option<String>,
    pub api_key: String,
}

fn get_str(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: get_str("SERVER_HOST", "0.0.0.0"),
                port: get_parsed("SERVER_PORT", 8470),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").ok(),
                username: get_str("DB_USERNAME", "forgedesk"),
                password: get_str("DB_PASSWORD", "forgedesk"),
                server: get_str("DB_SERVER", "localhost"),
                port: get_parsed("DB_PORT", 5432),
                database: get_str("DB_NAME", "forgedesk"),
                pool_size: get_parsed("DB_POOL_SIZE", 10),
            },
            identity: IdentityConfig {
                endpoint: env::var("IDENTITY_ENDPOINT").ok(),
            },
            push: PushConfig {
                endpoint: env::var("PUSH_ENDPOINT").ok(),
                api_key: get_str("PUSH_API_KEY", ""),
            },
        }
    }

    pub fn database_url(&self) -> String {
        if let Some(url) = &self.database.url {
            return url.clone();
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.database.username,
            self.database.password,
            self.database.server,
            self.database.port,
            self.database.database
        )
    }
}
