//! Agent invocation: run one agent over the aggregated context.
//!
//! Routing is decided by [`resolve_provider`]. Only credential failures
//! escape this stage; every other failure becomes a degraded [`Invocation`]
//! whose output is a readable error message, so one broken agent never
//! stops the pipeline.

use crate::agent::{resolve_provider, AgentConfig, Provider};
use crate::config::PipelineConfig;
use crate::credential::Credential;
use crate::document::PageImage;
use crate::error::GenerationError;
use crate::generation::{GenerationRequest, GenerationService, Usage};
use crate::output::ResultStatus;
use crate::prompts::{agent_error_output, agent_prompt, EMPTY_GENERATION};
use tracing::{debug, warn};

/// What one agent step produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub output: String,
    /// Estimated tokens; zero for degraded steps.
    pub tokens: u64,
    pub status: ResultStatus,
    pub provider_used: Provider,
    pub model_used: String,
    /// Token counts reported by the service, when it reports them. Cost
    /// still uses [`estimate_tokens`].
    pub reported_usage: Option<Usage>,
}

impl Invocation {
    pub fn is_degraded(&self) -> bool {
        self.status == ResultStatus::Failed
    }
}

/// 1 token ≈ 4 characters, truncated.
pub fn estimate_tokens(context: &str, response: &str) -> u64 {
    ((context.chars().count() + response.chars().count()) / 4) as u64
}

/// Invoke `agent` with the aggregated `context` and an optional page image.
///
/// The image, when given, is sent before the text prompt.
pub async fn invoke_agent(
    service: &dyn GenerationService,
    agent: &AgentConfig,
    context: &str,
    image: Option<&PageImage>,
    credential: &Credential,
    config: &PipelineConfig,
) -> Result<Invocation, GenerationError> {
    let plan = match resolve_provider(agent, &config.native_model) {
        Ok(plan) => plan,
        Err(e) => {
            warn!("Agent '{}' skipped: {}", agent.name, e);
            return Ok(degraded(agent, agent.provider, &agent.model, &e.to_string()));
        }
    };

    let mut request = GenerationRequest::new(plan.model.as_str());
    if let Some(img) = image {
        request = request.image(img.clone());
    }
    let request = request
        .text(agent_prompt(&agent.prompt_template, context))
        .temperature(agent.temperature)
        .max_output_tokens(config.max_output_tokens);

    debug!(
        "Agent '{}': {} via {} (fallback: {})",
        agent.name,
        plan.model,
        plan.provider,
        plan.is_fallback()
    );

    match service.generate(&request, credential).await {
        Ok(generation) => {
            let output = if generation.text.trim().is_empty() {
                EMPTY_GENERATION.to_string()
            } else {
                generation.text
            };
            let tokens = estimate_tokens(context, &output);
            if let Some(usage) = generation.usage {
                debug!(
                    "Agent '{}': estimated {} tokens, service reported {} in / {} out",
                    agent.name, tokens, usage.input_tokens, usage.output_tokens
                );
            }
            Ok(Invocation {
                output,
                tokens,
                status: if plan.is_fallback() {
                    ResultStatus::FallbackTriggered
                } else {
                    ResultStatus::Success
                },
                provider_used: plan.provider,
                model_used: plan.model,
                reported_usage: generation.usage,
            })
        }
        Err(e) if e.is_credential() => Err(e),
        Err(e) => {
            warn!("Agent '{}' failed: {}", agent.name, e);
            Ok(degraded(agent, plan.provider, &plan.model, &e.to_string()))
        }
    }
}

fn degraded(agent: &AgentConfig, provider: Provider, model: &str, message: &str) -> Invocation {
    Invocation {
        output: agent_error_output(&agent.name, message),
        tokens: 0,
        status: ResultStatus::Failed,
        provider_used: provider,
        model_used: model.to_string(),
        reported_usage: None,
    }
}
