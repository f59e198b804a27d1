use crate::core::error::ShuperError;
use crate::core::types::{Agent, Label};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_EXECUTE_MODEL: &str = "gemini-3-pro-preview";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub gemini: Option<String>,
    pub openrouter: Option<String>,
    pub openrouter_alt: Option<String>,
    pub routeway: Option<String>,
    pub scira: Option<String>,
    pub exa: Option<String>,
    pub tavily: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn from_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

impl ApiKeys {
    /// Fills empty slots from the process environment.
    pub fn with_env_fallback(&self) -> Self {
        Self {
            gemini: non_empty(&self.gemini).or_else(|| from_env(&["GEMINI_API_KEY", "API_KEY"])),
            openrouter: non_empty(&self.openrouter).or_else(|| from_env(&["OPENROUTER_API_KEY"])),
            openrouter_alt: non_empty(&self.openrouter_alt)
                .or_else(|| from_env(&["OPENROUTER_ALT_API_KEY"])),
            routeway: non_empty(&self.routeway).or_else(|| from_env(&["ROUTEWAY_API_KEY"])),
            scira: non_empty(&self.scira).or_else(|| from_env(&["SCIRA_API_KEY"])),
            exa: non_empty(&self.exa).or_else(|| from_env(&["EXA_API_KEY"])),
            tavily: non_empty(&self.tavily).or_else(|| from_env(&["TAVILY_API_KEY"])),
        }
    }

    pub fn any_present(&self) -> bool {
        [
            &self.gemini,
            &self.openrouter,
            &self.openrouter_alt,
            &self.routeway,
            &self.scira,
            &self.exa,
            &self.tavily,
        ]
        .into_iter()
        .any(|k| non_empty(k).is_some())
    }
}

/// Base URLs for every outbound service. Overridable so tests can point at mock servers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub gemini: String,
    pub openrouter: String,
    pub routeway: String,
    pub scira: String,
    pub exa: String,
    pub tavily: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            gemini: "https://generativelanguage.googleapis.com".to_string(),
            openrouter: "https://openrouter.ai/api/v1".to_string(),
            routeway: "https://api.routeway.ai/v1".to_string(),
            scira: "https://api.scira.ai".to_string(),
            exa: "https://api.exa.ai".to_string(),
            tavily: "https://api.tavily.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub default: String,
    /// Gemini-native selections are upgraded to this model in execute mode.
    pub execute: String,
    pub synthesis: String,
    pub title: String,
    pub council: Vec<String>,
    /// Extra ids registered on top of the built-in lists.
    pub extra_gemini: Vec<String>,
    pub extra_openrouter: Vec<String>,
    pub extra_routeway: Vec<String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default: DEFAULT_MODEL.to_string(),
            execute: DEFAULT_EXECUTE_MODEL.to_string(),
            synthesis: DEFAULT_MODEL.to_string(),
            title: DEFAULT_MODEL.to_string(),
            council: vec![
                "gemini-3-flash-preview".to_string(),
                "gemini-3-pro-preview".to_string(),
                "gemini-flash-latest".to_string(),
            ],
            extra_gemini: Vec::new(),
            extra_openrouter: Vec::new(),
            extra_routeway: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub user_name: String,
    pub base_knowledge: String,
    pub labels: Vec<Label>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            user_name: "User".to_string(),
            base_knowledge: String::new(),
            labels: vec![
                Label {
                    id: "1".to_string(),
                    name: "Design".to_string(),
                    color: "#a3a3a3".to_string(),
                },
                Label {
                    id: "2".to_string(),
                    name: "Research".to_string(),
                    color: "#737373".to_string(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 250,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_keys: ApiKeys,
    pub models: ModelsConfig,
    pub endpoints: Endpoints,
    pub workspace: WorkspaceConfig,
    pub agents: Vec<Agent>,
    pub search: SearchConfig,
}

impl Config {
    fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".shuper")
    }

    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.yaml")
    }

    pub fn data_path() -> PathBuf {
        Self::config_dir().join("sessions.json")
    }

    pub fn history_path() -> PathBuf {
        Self::config_dir().join("history.txt")
    }

    /// Loads the config at `path` (or the default location), writing defaults
    /// when the file does not exist yet.
    pub fn load(path: Option<&Path>) -> Result<Config, ShuperError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_path);

        if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                return Ok(Config::default());
            }
            let config = serde_yml::from_str::<Config>(&contents)
                .map_err(|e| ShuperError::Config(format!("Parse {}: {}", path.display(), e)))?;
            tracing::debug!("Loaded config from {}", path.display());
            return Ok(config);
        }

        let config = Config::default();
        if let Err(e) = config.save_to(&path) {
            tracing::warn!("Could not write default config to {}: {}", path.display(), e);
        }
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ShuperError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let yaml_content = serde_yml::to_string(self)?;
        fs::write(path, yaml_content)?;
        Ok(())
    }

    pub fn find_agent(&self, id: &str) -> Option<&Agent> {
        self.agents
            .iter()
            .find(|a| a.id == id || a.name.eq_ignore_ascii_case(id))
    }
}
