use crate::error::ConfigError;
use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

fn default_initial_backoff() -> u64 {
    2
}

fn default_max_backoff() -> u64 {
    60
}

/// Restart/backoff tuning for the long-poll listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    #[serde(default = "default_initial_backoff")]
    pub channel_initial_backoff_secs: u64,
    #[serde(default = "default_max_backoff")]
    pub channel_max_backoff_secs: u64,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            channel_initial_backoff_secs: default_initial_backoff(),
            channel_max_backoff_secs: default_max_backoff(),
        }
    }
}

/// Payment provider credentials, keyed provider name → token. A missing
/// entry means the provider is shown but unavailable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentsConfig {
    pub click: Option<String>,
    pub payme: Option<String>,
    pub stripe: Option<String>,
}

impl PaymentsConfig {
    /// The configured (name, token) pairs, skipping empty credentials.
    #[must_use]
    pub fn configured_tokens(&self) -> Vec<(String, String)> {
        [
            ("click", &self.click),
            ("payme", &self.payme),
            ("stripe", &self.stripe),
        ]
        .into_iter()
        .filter_map(|(name, token)| {
            token
                .as_deref()
                .filter(|token| !token.is_empty())
                .map(|token| (name.to_string(), token.to_string()))
        })
        .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// User-facing bot token.
    #[serde(default)]
    pub bot_token: String,
    /// Administrative bot token.
    #[serde(default)]
    pub admin_bot_token: String,
    /// Shared password for the admin `/login` handshake.
    #[serde(default)]
    pub admin_password: String,
    /// OpenAI API key for chat and image generation.
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default)]
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub reliability: ReliabilityConfig,
    /// SQLite database file. Empty means `<config dir>/altaira.db`.
    #[serde(default)]
    pub database_path: String,

    #[serde(skip)]
    pub config_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            admin_bot_token: String::new(),
            admin_password: String::new(),
            openai_api_key: String::new(),
            payments: PaymentsConfig::default(),
            reliability: ReliabilityConfig::default(),
            database_path: String::new(),
            config_path: PathBuf::new(),
        }
    }
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let altaira_dir = home.join(".altaira");
        let config_path = altaira_dir.join("config.toml");

        if !altaira_dir.exists() {
            fs::create_dir_all(&altaira_dir).context("Failed to create .altaira directory")?;
        }

        let mut config = if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path.clone_from(&config_path);
            config
        } else {
            let config = Self {
                config_path: config_path.clone(),
                ..Self::default()
            };
            config.save()?;
            config
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        let overrides: [(&[&str], &mut String); 4] = [
            (&["ALTAIRA_BOT_TOKEN", "BOT_TOKEN"], &mut self.bot_token),
            (
                &["ALTAIRA_ADMIN_BOT_TOKEN", "ADMIN_BOT_TOKEN"],
                &mut self.admin_bot_token,
            ),
            (
                &["ALTAIRA_ADMIN_PASSWORD", "ADMIN_PASSWORD"],
                &mut self.admin_password,
            ),
            (
                &["ALTAIRA_OPENAI_API_KEY", "OPENAI_API_KEY"],
                &mut self.openai_api_key,
            ),
        ];

        for (names, target) in overrides {
            for name in names {
                if let Ok(value) = std::env::var(name) {
                    if !value.is_empty() {
                        *target = value;
                        break;
                    }
                }
            }
        }

        let payment_overrides = [
            ("PAYMENT_TOKEN_CLICK", &mut self.payments.click),
            ("PAYMENT_TOKEN_PAYME", &mut self.payments.payme),
            ("PAYMENT_TOKEN_STRIPE", &mut self.payments.stripe),
        ];
        for (name, target) in payment_overrides {
            if let Ok(value) = std::env::var(name) {
                if !value.is_empty() {
                    *target = Some(value);
                }
            }
        }
    }

    /// Resolved SQLite path: explicit setting or a file next to the config.
    #[must_use]
    pub fn resolved_database_path(&self) -> PathBuf {
        if self.database_path.is_empty() {
            self.config_path
                .parent()
                .map(|dir| dir.join("altaira.db"))
                .unwrap_or_else(|| PathBuf::from("altaira.db"))
        } else {
            PathBuf::from(&self.database_path)
        }
    }

    /// Startup validation for the serving path. Fatal before any transport
    /// starts: missing credentials or a gapped tier table never reach users.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_token.is_empty() {
            return Err(ConfigError::Validation("bot_token is not set".into()));
        }
        if self.admin_bot_token.is_empty() {
            return Err(ConfigError::Validation("admin_bot_token is not set".into()));
        }
        if self.openai_api_key.is_empty() {
            return Err(ConfigError::Validation("openai_api_key is not set".into()));
        }
        if self.admin_password.is_empty() {
            return Err(ConfigError::Validation("admin_password is not set".into()));
        }

        crate::tiers::validate_plan_table()
    }

    pub fn save(&self) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("serialize config")?;
        fs::write(&self.config_path, contents)
            .with_context(|| format!("write config to {}", self.config_path.display()))?;
        Ok(())
    }
}
