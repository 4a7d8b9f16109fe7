use crate::error::{ConfigError, Result as AppResult};
use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(deserialize_with = "deserialize_string_or_list")]
    pub cors_origins: Vec<String>,
}

#[derive(Clone, Deserialize)]
pub struct GeneratorConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

// Hand-written so the API key never reaches the logs.
impl std::fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
    pub max_chars: usize,
    pub user_agent: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    pub idle_timeout_secs: u64,
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    pub server: ServerConfig,
    pub generator: GeneratorConfig,
    pub content: ContentConfig,
    pub sessions: SessionsConfig,
}

impl AppSettings {
    fn validate(self) -> AppResult<Self> {
        if self.generator.api_key.trim().is_empty() {
            return Err(ConfigError::Missing(
                "generator.api_key (set QUIZR__GENERATOR__API_KEY)".to_string(),
            )
            .into());
        }
        if self.content.max_chars == 0 {
            return Err(
                ConfigError::InvalidValue("content.max_chars must be positive".to_string()).into(),
            );
        }
        if self.generator.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "generator.timeout_secs must be positive".to_string(),
            )
            .into());
        }
        if self.sessions.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "sessions.channel_capacity must be positive".to_string(),
            )
            .into());
        }
        Ok(self)
    }
}

pub fn load_settings() -> AppResult<AppSettings> {
    let builder = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix("QUIZR")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("server.cors_origins")
                .try_parsing(true),
        );

    let settings = with_defaults(builder)?
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    settings
        .try_deserialize::<AppSettings>()
        .map_err(|e| ConfigError::Load(e.to_string()))?
        .validate()
}

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> AppResult<config::ConfigBuilder<config::builder::DefaultState>> {
    let defaults: [(&str, config::Value); 12] = [
        ("server.port", 3000_i64.into()),
        ("server.cors_origins", Vec::<String>::new().into()),
        ("generator.api_key", "".into()),
        ("generator.model", "gemini-1.5-flash-latest".into()),
        (
            "generator.base_url",
            "https://generativelanguage.googleapis.com/v1beta".into(),
        ),
        ("generator.temperature", 0.2_f64.into()),
        ("generator.timeout_secs", 30_i64.into()),
        ("content.max_chars", 100_000_i64.into()),
        ("content.user_agent", "QuizrApp/1.0".into()),
        ("content.timeout_secs", 20_i64.into()),
        ("sessions.idle_timeout_secs", 3600_i64.into()),
        ("sessions.channel_capacity", 32_i64.into()),
    ];

    let mut builder = builder;
    for (key, value) in defaults {
        builder = builder
            .set_default(key, value)
            .map_err(|e| ConfigError::Load(e.to_string()))?;
    }
    Ok(builder)
}

fn deserialize_string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    use serde_json::Value;

    let value = Value::deserialize(deserializer)?;

    match value {
        Value::String(s) => Ok(s
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()),
        Value::Array(arr) => arr
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.trim().to_string()),
                _ => Err(D::Error::custom("Array must contain only strings")),
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        _ => Err(D::Error::custom("Expected string or array of strings")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_from_json(json: &str) -> AppResult<AppSettings> {
        let builder = Config::builder().add_source(File::from_str(json, config::FileFormat::Json));
        let settings = with_defaults(builder)?
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        settings
            .try_deserialize::<AppSettings>()
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .validate()
    }

    #[test]
    fn test_defaults_fill_everything_but_the_key() {
        let settings = build_from_json(r#"{"generator": {"api_key": "abc"}}"#).unwrap();
        assert_eq!(settings.server.port, 3000);
        assert!(settings.server.cors_origins.is_empty());
        assert_eq!(settings.generator.model, "gemini-1.5-flash-latest");
        assert_eq!(settings.generator.timeout_secs, 30);
        assert_eq!(settings.content.max_chars, 100_000);
        assert_eq!(settings.sessions.channel_capacity, 32);
    }

    #[test]
    fn test_missing_api_key_is_reported() {
        let err = build_from_json("{}").unwrap_err();
        assert!(matches!(
            err,
            crate::error::AppError::Config(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn test_cors_origins_accept_comma_separated_string() {
        let settings = build_from_json(
            r#"{"generator": {"api_key": "abc"}, "server": {"cors_origins": "http://a.test, http://b.test"}}"#,
        )
        .unwrap();
        assert_eq!(
            settings.server.cors_origins,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn test_debug_output_redacts_api_key() {
        let settings = build_from_json(r#"{"generator": {"api_key": "super-secret"}}"#).unwrap();
        let printed = format!("{:?}", settings);
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("<redacted>"));
    }
}
