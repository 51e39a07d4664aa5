//! Provider configuration from the environment
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `LLM_PROVIDER` | preset: `glm`, `deepseek`, `kimi` | `deepseek` |
//! | `LLM_API_KEY` / `GLM_API_KEY` | API key | required |
//! | `LLM_API_URL` / `GLM_API_URL` | base URL | preset URL |
//! | `LLM_FORMAT` | `openai` or `anthropic` | inferred from the URL |
//! | `LLM_MODEL` / `GLM_MODEL` | comma-separated candidate models | preset models |
//! | `LLM_TIMEOUT_MS` | per-request timeout | `60000` |

use std::str::FromStr;
use std::time::Duration;

use agent_core::error::{AgentError, Result};
use agent_core::provider::{Dialect, ProviderConfig};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Known provider endpoints
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProviderPreset {
    Glm,
    #[default]
    DeepSeek,
    Kimi,
}

impl ProviderPreset {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Glm => "glm",
            Self::DeepSeek => "deepseek",
            Self::Kimi => "kimi",
        }
    }

    pub const fn base_url(self) -> &'static str {
        match self {
            Self::Glm => "https://open.bigmodel.cn/api/anthropic",
            Self::DeepSeek => "https://api.deepseek.com/v1/chat/completions",
            Self::Kimi => "https://api.moonshot.cn/v1/chat/completions",
        }
    }

    pub const fn models(self) -> &'static [&'static str] {
        match self {
            Self::Glm => &["glm-5", "glm-4.7"],
            Self::DeepSeek => &["deepseek-chat"],
            Self::Kimi => &["moonshot-v1-8k"],
        }
    }

    /// Dialect pinned by the preset; `None` lets the URL decide
    pub const fn dialect(self) -> Option<Dialect> {
        match self {
            Self::DeepSeek => Some(Dialect::OpenAi),
            Self::Glm | Self::Kimi => None,
        }
    }
}

impl FromStr for ProviderPreset {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "glm" => Ok(Self::Glm),
            "deepseek" => Ok(Self::DeepSeek),
            "kimi" => Ok(Self::Kimi),
            other => Err(AgentError::Config(format!("unknown LLM provider '{other}'"))),
        }
    }
}

/// Load `.env` (if present) and read the provider configuration
pub fn provider_config_from_env() -> Result<ProviderConfig> {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!(error = %e, "No .env file loaded");
    }
    provider_config_from_lookup(|key| std::env::var(key).ok())
}

/// Build a configuration from any key lookup; blank values count as unset
pub fn provider_config_from_lookup<F>(lookup: F) -> Result<ProviderConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |keys: &[&str]| {
        keys.iter()
            .filter_map(|key| lookup(key))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    };

    let preset = get(&["LLM_PROVIDER"])
        .map(|p| p.parse::<ProviderPreset>())
        .transpose()?
        .unwrap_or_default();

    let api_key = get(&["LLM_API_KEY", "GLM_API_KEY"]).ok_or_else(|| {
        AgentError::Config("LLM_API_KEY is not set".into())
    })?;

    let base_url = get(&["LLM_API_URL", "GLM_API_URL"]).unwrap_or_else(|| preset.base_url().to_string());

    let explicit = match get(&["LLM_FORMAT"]) {
        Some(format) => Some(format.parse::<Dialect>()?),
        None => preset.dialect(),
    };
    let dialect = Dialect::resolve(explicit, &base_url);

    let mut models = get(&["LLM_MODEL", "GLM_MODEL"])
        .map(|list| parse_model_list(&list))
        .unwrap_or_default();
    if models.is_empty() {
        models = preset.models().iter().map(|m| (*m).to_string()).collect();
    }

    let timeout_ms = match get(&["LLM_TIMEOUT_MS"]) {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|e| AgentError::Config(format!("LLM_TIMEOUT_MS '{raw}' is invalid: {e}")))?,
        None => DEFAULT_TIMEOUT_MS,
    };

    ProviderConfig::new(
        preset.name(),
        dialect,
        api_key,
        base_url,
        models,
        Duration::from_millis(timeout_ms),
    )
}

/// Split a comma-separated model list, dropping blanks
pub fn parse_model_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ProviderConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        provider_config_from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_to_deepseek() {
        let config = load(&[("LLM_API_KEY", "sk-test")]).unwrap();
        assert_eq!(config.name, "deepseek");
        assert_eq!(config.dialect, Dialect::OpenAi);
        assert_eq!(config.base_url, "https://api.deepseek.com/v1/chat/completions");
        assert_eq!(config.candidate_models, vec!["deepseek-chat"]);
        assert_eq!(config.timeout, Duration::from_millis(60_000));
    }

    #[test]
    fn test_glm_preset_infers_anthropic_dialect() {
        let config = load(&[("LLM_PROVIDER", "GLM"), ("GLM_API_KEY", "k")]).unwrap();
        assert_eq!(config.dialect, Dialect::Anthropic);
        assert_eq!(config.candidate_models, vec!["glm-5", "glm-4.7"]);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("LLM_PROVIDER", "kimi"),
            ("LLM_API_KEY", "k"),
            ("LLM_API_URL", "https://proxy.local/api/anthropic"),
            ("LLM_FORMAT", "openai"),
            ("LLM_MODEL", " a, ,b ,"),
            ("LLM_TIMEOUT_MS", "1500"),
        ])
        .unwrap();
        assert_eq!(config.dialect, Dialect::OpenAi);
        assert_eq!(config.base_url, "https://proxy.local/api/anthropic");
        assert_eq!(config.candidate_models, vec!["a", "b"]);
        assert_eq!(config.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_blank_model_list_uses_preset() {
        let config = load(&[("LLM_API_KEY", "k"), ("LLM_MODEL", " , ")]).unwrap();
        assert_eq!(config.candidate_models, vec!["deepseek-chat"]);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        assert!(matches!(load(&[]), Err(AgentError::Config(_))));
        assert!(matches!(load(&[("LLM_API_KEY", "  ")]), Err(AgentError::Config(_))));
        assert!(load(&[("LLM_API_KEY", "k"), ("LLM_PROVIDER", "acme")]).is_err());
        assert!(load(&[("LLM_API_KEY", "k"), ("LLM_FORMAT", "grpc")]).is_err());
        assert!(load(&[("LLM_API_KEY", "k"), ("LLM_TIMEOUT_MS", "soon")]).is_err());
    }
}
