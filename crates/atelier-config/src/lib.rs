use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub providers: ProvidersConfig,
    pub chat: ChatConfig,
    pub project: ProjectConfig,
}

/// Provider configuration with named configs per provider type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Default provider in format "<provider_type>.<config_name>"
    pub default_provider: String,

    /// Named OpenAI-compatible provider configs (OpenAI, OpenRouter, Groq, ...)
    #[serde(default)]
    pub openai: HashMap<String, OpenAiConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Settings for a chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Hard cap on generation segments per turn (initial + continuations)
    pub max_response_segments: u32,
    /// Maximum number of files held in the context buffer
    pub max_context_files: usize,
    /// Whether to run the summary pass when file context exists
    pub enable_summary: bool,
}

/// Settings describing the sandboxed project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project root directory
    pub root: String,
    /// Directory for supabase migration files, relative to the root
    pub migrations_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: ProvidersConfig {
                default_provider: "openai.default".to_string(),
                openai: HashMap::from([(
                    "default".to_string(),
                    OpenAiConfig {
                        api_key: String::new(),
                        model: "gpt-4o".to_string(),
                        base_url: None,
                        max_tokens: Some(8000),
                        temperature: Some(0.1),
                    },
                )]),
            },
            chat: ChatConfig {
                max_response_segments: 2,
                max_context_files: 5,
                enable_summary: true,
            },
            project: ProjectConfig {
                root: ".".to_string(),
                migrations_dir: "supabase/migrations".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let default_paths = [
            "./atelier.toml",
            "~/.config/atelier/config.toml",
            "~/.atelier.toml",
        ];

        // Resolve the first existing config file
        let path_to_load = if let Some(path) = config_path {
            if !Path::new(path).exists() {
                anyhow::bail!("Config file not found: {}", path);
            }
            Some(path.to_string())
        } else {
            default_paths.iter().find_map(|path| {
                let expanded = shellexpand::tilde(path);
                if Path::new(expanded.as_ref()).exists() {
                    Some(expanded.to_string())
                } else {
                    None
                }
            })
        };

        // If no config exists, create and save a default config
        let Some(path) = path_to_load else {
            let default_config = Self::default();

            let config_dir = dirs::home_dir()
                .map(|mut path| {
                    path.push(".config");
                    path.push("atelier");
                    path
                })
                .unwrap_or_else(|| std::path::PathBuf::from("."));

            std::fs::create_dir_all(&config_dir).ok();

            let config_file = config_dir.join("config.toml");
            if let Some(config_file) = config_file.to_str() {
                if let Err(e) = default_config.save(config_file) {
                    eprintln!("Warning: Could not save default config: {}", e);
                }
            }

            return Ok(default_config);
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path))?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, content).with_context(|| format!("failed to write config {}", path))
    }

    /// Parse a provider reference like "openai.default" into (type, name).
    pub fn parse_provider_reference(reference: &str) -> Result<(String, String)> {
        match reference.split_once('.') {
            Some((provider_type, config_name)) if !provider_type.is_empty() && !config_name.is_empty() => {
                Ok((provider_type.to_string(), config_name.to_string()))
            }
            _ => anyhow::bail!(
                "Invalid provider reference '{}': expected format '<provider_type>.<config_name>'",
                reference
            ),
        }
    }

    pub fn get_openai_config(&self, name: &str) -> Option<&OpenAiConfig> {
        self.providers.openai.get(name)
    }

    /// Return a copy of this config with a different default provider.
    pub fn with_provider_override(&self, provider_ref: &str) -> Result<Self> {
        Self::parse_provider_reference(provider_ref)?;
        let mut config = self.clone();
        config.providers.default_provider = provider_ref.to_string();
        Ok(config)
    }
}
