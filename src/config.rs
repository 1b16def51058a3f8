use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use serde_yaml;
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "marginalia")]
#[command(about = "Runs the marginalia highlight service", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".marginalia")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct App {
    database: String,
    bucket: String,
    port: i32,
    #[serde(default)]
    pub turso_url: Option<String>,
    #[serde(default)]
    pub turso_auth_token: Option<String>,
    #[serde(default = "default_sync_interval")]
    pub sync_interval_seconds: u64,
}

fn default_sync_interval() -> u64 {
    60
}

#[derive(Debug, Deserialize, Default)]
pub struct Storage {
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    #[serde(default)]
    pub aws_endpoint_url_s3: Option<String>,
    pub aws_region: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Synthesis {
    pub endpoint: String,
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_size")]
    pub size: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
}

fn default_model() -> String {
    "gpt-image-1".to_string()
}

fn default_size() -> String {
    "1024x1024".to_string()
}

fn default_timeout() -> u64 {
    120
}

fn default_daily_limit() -> u32 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct Identity {
    pub url: String,
    pub api_key: String,
}

impl App {
    pub fn get_db(&self) -> &str {
        return &self.database;
    }

    pub fn get_port(&self) -> i32 {
        return self.port;
    }

    pub fn get_bucket(&self) -> &str {
        return &self.bucket;
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub app: App,
    pub storage: Storage,
    pub synthesis: Synthesis,
    pub identity: Identity,
}

impl Config {
    pub fn new(path: &str) -> Result<Self> {
        let cfg = Config::load_config(path)?;
        Ok(cfg)
    }

    fn load_config(path: &str) -> Result<Config> {
        let yaml_str = fs::read_to_string(path)?;
        Config::from_yaml(&yaml_str)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Config> {
        let yaml_with_env = Config::substitute_env_vars(yaml_str)?;
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        Ok(config)
    }

    fn substitute_env_vars(yaml_str: &str) -> Result<String> {
        let mut result = yaml_str.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            if let Some(end) = result[actual_start..].find("}") {
                let var_name = &result[actual_start + 2..actual_start + end];

                // ${VAR:-default}
                let env_value = if let Some(default_start) = var_name.find(":-") {
                    let actual_var = &var_name[..default_start];
                    let default_val = &var_name[default_start + 2..];
                    env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
                } else {
                    env::var(var_name).unwrap_or_else(|_| {
                        tracing::warn!(var = var_name, "environment variable not found");
                        String::new()
                    })
                };

                result.replace_range(actual_start..actual_start + end + 1, &env_value);
                offset = actual_start + env_value.len();
            } else {
                break;
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
app:
  database: marginalia.db
  bucket: ${MARGINALIA_TEST_UNSET_BUCKET:-reader-images}
  port: 8000
storage:
  aws_access_key_id: key
  aws_secret_access_key: secret
  aws_region: us-east-1
synthesis:
  endpoint: https://api.openai.com/v1/images/generations
  api_key: "${MARGINALIA_TEST_UNSET_KEY}"
identity:
  url: https://auth.example.com
  api_key: anon
"#;

    #[test]
    fn test_load_with_defaults() {
        let cfg = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(cfg.app.get_bucket(), "reader-images");
        assert_eq!(cfg.app.get_port(), 8000);
        assert_eq!(cfg.app.sync_interval_seconds, 60);
        assert!(cfg.app.turso_url.is_none());
        assert!(cfg.storage.aws_endpoint_url_s3.is_none());
        assert_eq!(cfg.synthesis.api_key, "");
        assert_eq!(cfg.synthesis.model, "gpt-image-1");
        assert_eq!(cfg.synthesis.daily_limit, 10);
    }

    #[test]
    fn test_substitution_keeps_surrounding_text() {
        let out = Config::substitute_env_vars("a-${MARGINALIA_TEST_UNSET_X:-b}-c ${MARGINALIA_TEST_UNSET_Y:-}d").unwrap();
        assert_eq!(out, "a-b-c d");
    }

    #[test]
    fn test_unterminated_placeholder_left_alone() {
        let out = Config::substitute_env_vars("port: ${PORT").unwrap();
        assert_eq!(out, "port: ${PORT");
    }
}
