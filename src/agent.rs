//! Agent configuration and provider routing.
//!
//! An agent is one prompt template aimed at one model. Agents live in an
//! ordered `Vec`; the order is the execution order.
//!
//! Only [`Provider::Gemini`] has a real execution path. Every other provider
//! goes through [`resolve_provider`], which either substitutes the native
//! provider (when the agent allows fallback) or refuses. Adding a real
//! backend means adding a branch there, not in the invoker.

use crate::error::AgentFlowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Model used for page transcription and for every fallback.
pub const NATIVE_MODEL: &str = "gemini-2.5-flash";

/// The closed set of providers an agent may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    #[serde(rename = "openai")]
    OpenAI,
    Anthropic,
}

impl Provider {
    /// Whether this provider has a real execution path.
    pub fn is_native(self) -> bool {
        matches!(self, Provider::Gemini)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = AgentFlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(Provider::Gemini),
            "openai" => Ok(Provider::OpenAI),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => Err(AgentFlowError::InvalidConfig(format!(
                "unknown provider '{other}' (expected gemini, openai or anthropic)"
            ))),
        }
    }
}

/// One agent in the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique within a pipeline; never changes after creation.
    pub id: String,
    pub name: String,
    pub role: String,
    pub model: String,
    pub provider: Provider,
    pub prompt_template: String,
    /// Sampling temperature. Recommended range 0.0–1.0.
    pub temperature: f32,
    /// Substitute the native provider when `provider` cannot be executed.
    #[serde(default = "default_fallback")]
    pub fallback_enabled: bool,
}

fn default_fallback() -> bool {
    true
}

impl AgentConfig {
    /// The template used when a new agent is added to the pipeline.
    pub fn new_template() -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            name: "New Agent".to_string(),
            role: "Analyst".to_string(),
            model: NATIVE_MODEL.to_string(),
            provider: Provider::Gemini,
            prompt_template: "Analyze the input and provide insights.".to_string(),
            temperature: 0.5,
            fallback_enabled: true,
        }
    }

    /// Apply a partial update. `id` is not updatable.
    pub fn apply(&mut self, update: AgentUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(role) = update.role {
            self.role = role;
        }
        if let Some(model) = update.model {
            self.model = model;
        }
        if let Some(provider) = update.provider {
            self.provider = provider;
        }
        if let Some(prompt) = update.prompt_template {
            self.prompt_template = prompt;
        }
        if let Some(t) = update.temperature {
            self.temperature = t.clamp(0.0, 2.0);
        }
        if let Some(fallback) = update.fallback_enabled {
            self.fallback_enabled = fallback;
        }
    }
}

/// Partial edit of an [`AgentConfig`]; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub role: Option<String>,
    pub model: Option<String>,
    pub provider: Option<Provider>,
    pub prompt_template: Option<String>,
    pub temperature: Option<f32>,
    pub fallback_enabled: Option<bool>,
}

/// The pipeline a fresh session starts with.
pub fn default_agents() -> Vec<AgentConfig> {
    vec![
        AgentConfig {
            id: "1".to_string(),
            name: "Summarizer".to_string(),
            role: "Summarizer".to_string(),
            model: NATIVE_MODEL.to_string(),
            provider: Provider::Gemini,
            prompt_template:
                "Summarize the following text concisely, highlighting key financial figures."
                    .to_string(),
            temperature: 0.3,
            fallback_enabled: true,
        },
        AgentConfig {
            id: "2".to_string(),
            name: "Risk Analyst".to_string(),
            role: "Analyst".to_string(),
            model: NATIVE_MODEL.to_string(),
            provider: Provider::Gemini,
            prompt_template:
                "Identify any potential legal or financial risks in the provided text.".to_string(),
            temperature: 0.5,
            fallback_enabled: true,
        },
    ]
}

/// How one agent will actually be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Provider that serves the call.
    pub provider: Provider,
    /// Model identifier sent to the provider.
    pub model: String,
    /// Set when the agent's own provider was replaced.
    pub fallback_from: Option<Provider>,
}

impl ExecutionPlan {
    pub fn is_fallback(&self) -> bool {
        self.fallback_from.is_some()
    }
}

/// Decide which provider and model serve `agent`.
///
/// * native provider → the agent's own model
/// * other provider, fallback on → `native_model` on the native provider
/// * other provider, fallback off → [`AgentFlowError::ProviderUnavailable`]
pub fn resolve_provider(
    agent: &AgentConfig,
    native_model: &str,
) -> Result<ExecutionPlan, AgentFlowError> {
    if agent.provider.is_native() {
        return Ok(ExecutionPlan {
            provider: agent.provider,
            model: agent.model.clone(),
            fallback_from: None,
        });
    }

    if agent.fallback_enabled {
        warn!(
            "Agent '{}': provider {} unavailable, falling back to {} ({})",
            agent.name,
            agent.provider,
            Provider::Gemini,
            native_model
        );
        return Ok(ExecutionPlan {
            provider: Provider::Gemini,
            model: native_model.to_string(),
            fallback_from: Some(agent.provider),
        });
    }

    Err(AgentFlowError::ProviderUnavailable {
        agent: agent.name.clone(),
        provider: agent.provider.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(provider: Provider, fallback: bool) -> AgentConfig {
        AgentConfig {
            provider,
            fallback_enabled: fallback,
            model: "gpt-4o".to_string(),
            ..AgentConfig::new_template()
        }
    }

    #[test]
    fn native_agent_keeps_its_model() {
        let mut a = agent(Provider::Gemini, false);
        a.model = "gemini-2.5-pro".to_string();
        let plan = resolve_provider(&a, NATIVE_MODEL).unwrap();
        assert_eq!(plan.provider, Provider::Gemini);
        assert_eq!(plan.model, "gemini-2.5-pro");
        assert!(!plan.is_fallback());
    }

    #[test]
    fn fallback_substitutes_native_provider_and_model() {
        let plan = resolve_provider(&agent(Provider::OpenAI, true), NATIVE_MODEL).unwrap();
        assert_eq!(plan.provider, Provider::Gemini);
        assert_eq!(plan.model, NATIVE_MODEL);
        assert_eq!(plan.fallback_from, Some(Provider::OpenAI));
    }

    #[test]
    fn unroutable_without_fallback() {
        let err = resolve_provider(&agent(Provider::Anthropic, false), NATIVE_MODEL).unwrap_err();
        assert!(matches!(err, AgentFlowError::ProviderUnavailable { .. }));
        assert!(err.to_string().contains("anthropic"));
    }

    #[test]
    fn provider_serde_names() {
        let json = serde_json::to_string(&Provider::OpenAI).unwrap();
        assert_eq!(json, "\"openai\"");
        let back: Provider = serde_json::from_str("\"anthropic\"").unwrap();
        assert_eq!(back, Provider::Anthropic);
        assert_eq!("Claude".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert!("mistral".parse::<Provider>().is_err());
    }

    #[test]
    fn apply_update_leaves_id_and_clamps_temperature() {
        let mut a = AgentConfig::new_template();
        let id = a.id.clone();
        a.apply(AgentUpdate {
            name: Some("Auditor".into()),
            temperature: Some(9.0),
            ..Default::default()
        });
        assert_eq!(a.id, id);
        assert_eq!(a.name, "Auditor");
        assert_eq!(a.temperature, 2.0);
        assert_eq!(a.role, "Analyst");
    }

    #[test]
    fn default_pipeline_order() {
        let agents = default_agents();
        let ids: Vec<&str> = agents.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert!(agents.iter().all(|a| a.provider == Provider::Gemini));
    }

    #[test]
    fn fallback_defaults_on_when_missing_from_json() {
        let json = r#"{"id":"x","name":"A","role":"R","model":"gpt-4o","provider":"openai",
                       "prompt_template":"p","temperature":0.2}"#;
        let a: AgentConfig = serde_json::from_str(json).unwrap();
        assert!(a.fallback_enabled);
    }
}
