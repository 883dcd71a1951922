//! Applies environment-variable overrides on top of `AppConfig`'s defaults.

use std::env;

use tracing::info;

use crate::AppConfig;

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn new() -> Self {
        Self
    }

    pub fn load(&self) -> AppConfig {
        let mut config = AppConfig::default();
        self.apply_env_overrides(&mut config);
        config
    }

    fn apply_env_overrides(&self, config: &mut AppConfig) {
        if let Ok(val) = env::var("RABBITMQ_URL") {
            config.rabbitmq_url = val;
        }
        if let Ok(val) = env::var("REDIS_URL") {
            config.redis_url = val;
        }
        if let Ok(val) = env::var("API_KEY") {
            config.api_key = val;
        }
        if let Ok(val) = env::var("PORT") {
            if let Ok(port) = val.parse() {
                config.port = port;
            }
        }
        if let Ok(val) = env::var("SERVICE_PORT") {
            if let Ok(port) = val.parse() {
                config.service_port = port;
            }
        }
        if let Ok(val) = env::var("IDEMPOTENCY_TTL_SECONDS") {
            if let Ok(ttl) = val.parse() {
                config.idempotency_ttl_seconds = ttl;
            }
        }
        if let Ok(val) = env::var("STATUS_TTL_SECONDS") {
            if let Ok(ttl) = val.parse() {
                config.status_ttl_seconds = ttl;
            }
        }
        if let Ok(val) = env::var("MAX_ATTEMPTS") {
            if let Ok(max) = val.parse() {
                config.max_attempts = max;
            }
        }

        if let Ok(val) = env::var("SMTP_HOST") {
            config.smtp.host = val;
        }
        if let Ok(val) = env::var("SMTP_PORT") {
            if let Ok(port) = val.parse() {
                config.smtp.port = port;
            }
        }
        if let Ok(val) = env::var("SMTP_USER") {
            config.smtp.user = val;
        }
        if let Ok(val) = env::var("SMTP_PASS") {
            config.smtp.pass = val;
        }
        if let Ok(val) = env::var("EMAIL_FROM") {
            config.smtp.email_from = val;
        }

        if let Ok(val) = env::var("FIREBASE_PROJECT_ID") {
            config.push.firebase_project_id = val;
        }
        if let Ok(val) = env::var("FIREBASE_CLIENT_EMAIL") {
            config.push.firebase_client_email = val;
        }
        if let Ok(val) = env::var("FIREBASE_PRIVATE_KEY") {
            config.push.firebase_private_key = val;
        }

        info!(
            port = config.port,
            service_port = config.service_port,
            max_attempts = config.max_attempts,
            "configuration loaded"
        );
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_without_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        for key in ["MAX_ATTEMPTS", "PORT", "IDEMPOTENCY_TTL_SECONDS"] {
            env::remove_var(key);
        }
        let config = ConfigLoader::new().load();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.port, 3000);
        assert_eq!(config.idempotency_ttl_seconds, 86_400);
    }

    #[test]
    fn env_overrides_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("MAX_ATTEMPTS", "9");
        env::set_var("PORT", "8080");
        let config = ConfigLoader::new().load();
        assert_eq!(config.max_attempts, 9);
        assert_eq!(config.port, 8080);
        env::remove_var("MAX_ATTEMPTS");
        env::remove_var("PORT");
    }

    #[test]
    fn malformed_numeric_env_falls_back_to_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("MAX_ATTEMPTS", "not-a-number");
        let config = ConfigLoader::new().load();
        assert_eq!(config.max_attempts, 5);
        env::remove_var("MAX_ATTEMPTS");
    }
}
