use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Chat credential; without it every reply is a canned one.
    pub deepseek_api_key: Option<String>,
    pub chat_api_base: String,
    pub chat_model: String,
    pub tts_api_url: String,
    pub tts_base_url: String,
    pub audio_load_timeout: Duration,
    pub log_level: Level,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let deepseek_api_key = std::env::var("DEEPSEEK_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        let chat_api_base = var_or("CHAT_API_BASE", "https://api.deepseek.com/v1");
        let chat_model = var_or("CHAT_MODEL", "deepseek-chat");
        let tts_api_url = var_or(
            "TTS_API_URL",
            "https://xbpethd.gaodun.com/api/leftsite-tts/convert",
        );
        let tts_base_url = var_or("TTS_BASE_URL", "https://xbpethd.gaodun.com");

        let timeout_str = var_or("AUDIO_LOAD_TIMEOUT_SECS", "5");
        let audio_load_timeout = match timeout_str.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                return Err(ConfigError::InvalidValue(
                    "AUDIO_LOAD_TIMEOUT_SECS".to_string(),
                    format!("'{}' is not a positive number of seconds", timeout_str),
                ));
            }
        };

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            deepseek_api_key,
            chat_api_base,
            chat_model,
            tts_api_url,
            tts_base_url,
            audio_load_timeout,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("BIND_ADDRESS");
            env::remove_var("DEEPSEEK_API_KEY");
            env::remove_var("CHAT_API_BASE");
            env::remove_var("CHAT_MODEL");
            env::remove_var("TTS_API_URL");
            env::remove_var("TTS_BASE_URL");
            env::remove_var("AUDIO_LOAD_TIMEOUT_SECS");
            env::remove_var("RUST_LOG");
        }
    }

    #[test]
    fn test_config_error_display() {
        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.deepseek_api_key, None);
        assert_eq!(config.chat_api_base, "https://api.deepseek.com/v1");
        assert_eq!(config.chat_model, "deepseek-chat");
        assert_eq!(
            config.tts_api_url,
            "https://xbpethd.gaodun.com/api/leftsite-tts/convert"
        );
        assert_eq!(config.tts_base_url, "https://xbpethd.gaodun.com");
        assert_eq!(config.audio_load_timeout, Duration::from_secs(5));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("DEEPSEEK_API_KEY", "sk-test");
            env::set_var("CHAT_API_BASE", "http://localhost:9000/v1");
            env::set_var("CHAT_MODEL", "deepseek-reasoner");
            env::set_var("TTS_API_URL", "http://localhost:9001/convert");
            env::set_var("TTS_BASE_URL", "http://localhost:9001");
            env::set_var("AUDIO_LOAD_TIMEOUT_SECS", "8");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.deepseek_api_key, Some("sk-test".to_string()));
        assert_eq!(config.chat_api_base, "http://localhost:9000/v1");
        assert_eq!(config.chat_model, "deepseek-reasoner");
        assert_eq!(config.tts_api_url, "http://localhost:9001/convert");
        assert_eq!(config.tts_base_url, "http://localhost:9001");
        assert_eq!(config.audio_load_timeout, Duration::from_secs(8));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_blank_api_key_means_no_credential() {
        clear_env_vars();
        unsafe {
            env::set_var("DEEPSEEK_API_KEY", "   ");
        }

        let config = Config::from_env().expect("Config should load successfully");
        assert_eq!(config.deepseek_api_key, None);
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_timeout() {
        for value in ["0", "soon"] {
            clear_env_vars();
            unsafe {
                env::set_var("AUDIO_LOAD_TIMEOUT_SECS", value);
            }

            let err = Config::from_env().unwrap_err();
            match err {
                ConfigError::InvalidValue(var, _) => assert_eq!(var, "AUDIO_LOAD_TIMEOUT_SECS"),
            }
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
        }
    }
}
