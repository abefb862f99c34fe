//! Post generation through a chat-completion model
//!
//! Builds a prompt from extracted source material and style parameters,
//! asks an OpenAI-compatible endpoint for variants, and cleans the
//! responses into [`GeneratedPost`] values ready to become drafts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::extractor::ExtractedContent;
use crate::models::{PostTone, PostType};

const SYSTEM_PROMPT: &str = "You are an expert LinkedIn content creator specializing in \
engaging, professional posts for B2B audiences. You understand LinkedIn's best practices \
and create content that drives engagement while maintaining professionalism.";

const MAX_POST_CHARS: usize = 3000;
const MAX_VARIANTS: u32 = 5;

// ============================================================
// Types
// ============================================================

/// Generation failure
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("model provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("model provider rate limited the request")]
    RateLimited,

    #[error("invalid style parameters: {0}")]
    InvalidStyleParams(String),
}

pub type GenerateResult<T> = Result<T, GenerateError>;

/// How the post should read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleParams {
    pub tone: PostTone,
    pub post_type: PostType,
    /// Number of alternative drafts to produce (1 to 5)
    pub variant_count: u32,
}

impl StyleParams {
    pub fn new(tone: PostTone, post_type: PostType, variant_count: u32) -> GenerateResult<Self> {
        if variant_count == 0 || variant_count > MAX_VARIANTS {
            return Err(GenerateError::InvalidStyleParams(format!(
                "variant count must be between 1 and {}, got {}",
                MAX_VARIANTS, variant_count
            )));
        }
        Ok(Self {
            tone,
            post_type,
            variant_count,
        })
    }
}

impl Default for StyleParams {
    fn default() -> Self {
        Self {
            tone: PostTone::Professional,
            post_type: PostType::Informative,
            variant_count: 1,
        }
    }
}

/// One candidate post from the model
#[derive(Debug, Clone)]
pub struct GeneratedPost {
    pub content: String,
    pub tone: PostTone,
    pub post_type: PostType,
    pub model_used: String,
    /// 1-based variant index
    pub variant: u32,
    pub generated_at: DateTime<Utc>,
}

impl GeneratedPost {
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

// ============================================================
// Contract
// ============================================================

/// Something that can turn source material into post candidates
#[async_trait]
pub trait PostGenerator: Send + Sync {
    async fn generate(
        &self,
        sources: &[ExtractedContent],
        style: StyleParams,
        context: Option<&str>,
    ) -> GenerateResult<Vec<GeneratedPost>>;
}

// ============================================================
// Chat-completion implementation
// ============================================================

/// Generator configuration
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    /// OpenAI-compatible endpoint base (e.g. https://api.openai.com)
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Post generator backed by an OpenAI-compatible chat endpoint
pub struct ChatCompletionGenerator {
    client: Client,
    settings: GeneratorSettings,
}

impl ChatCompletionGenerator {
    pub fn new(settings: GeneratorSettings) -> GenerateResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| GenerateError::ProviderUnavailable(e.to_string()))?;

        Ok(Self { client, settings })
    }

    async fn complete(&self, prompt: &str, temperature: f32) -> GenerateResult<String> {
        let url = format!(
            "{}/v1/chat/completions",
            self.settings.endpoint.trim_end_matches('/')
        );

        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature,
            max_tokens: self.settings.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerateError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerateError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::ProviderUnavailable(format!(
                "status {}: {}",
                status,
                crate::utils::truncate_text(&body, 200)
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::ProviderUnavailable(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| GenerateError::ProviderUnavailable("empty completion".to_string()))
    }
}

#[async_trait]
impl PostGenerator for ChatCompletionGenerator {
    async fn generate(
        &self,
        sources: &[ExtractedContent],
        style: StyleParams,
        context: Option<&str>,
    ) -> GenerateResult<Vec<GeneratedPost>> {
        if style.variant_count == 0 || style.variant_count > MAX_VARIANTS {
            return Err(GenerateError::InvalidStyleParams(format!(
                "variant count must be between 1 and {}",
                MAX_VARIANTS
            )));
        }

        let prompt = build_prompt(sources, style, context);
        let mut posts = Vec::with_capacity(style.variant_count as usize);

        for variant in 1..=style.variant_count {
            // nudge temperature per variant so drafts diverge
            let temperature = self.settings.temperature + (variant - 1) as f32 * 0.1;

            match self.complete(&prompt, temperature).await {
                Ok(raw) => {
                    let content = clean_generated(&raw);
                    debug!(variant, chars = content.chars().count(), "variant generated");
                    posts.push(GeneratedPost {
                        content,
                        tone: style.tone,
                        post_type: style.post_type,
                        model_used: self.settings.model.clone(),
                        variant,
                        generated_at: Utc::now(),
                    });
                }
                Err(GenerateError::RateLimited) => return Err(GenerateError::RateLimited),
                Err(e) => {
                    warn!(variant, error = %e, "variant generation failed");
                }
            }
        }

        if posts.is_empty() {
            return Err(GenerateError::ProviderUnavailable(
                "all variants failed".to_string(),
            ));
        }

        Ok(posts)
    }
}

// ============================================================
// Prompt assembly and cleanup
// ============================================================

fn build_prompt(sources: &[ExtractedContent], style: StyleParams, context: Option<&str>) -> String {
    let mut sources_summary = String::new();
    for (i, source) in sources.iter().enumerate() {
        let title = source.title.as_deref().unwrap_or("(untitled)");
        sources_summary.push_str(&format!(
            "Source {} ({}): {}\n{}\n\n",
            i + 1,
            source.source,
            title,
            crate::utils::truncate_text(&source.text, 2000),
        ));
    }

    format!(
        "Create a LinkedIn post based on the following information:\n\n\
         CONTENT SOURCES:\n{sources_summary}\n\
         REQUIREMENTS:\n\
         - Tone: {tone}\n\
         - Post Type: {post_type}\n\
         - Maximum Length: {max_length} characters\n\
         - Include relevant hashtags (3-5)\n\
         - Make it engaging and shareable\n\n\
         ADDITIONAL CONTEXT:\n{context}\n\n\
         STRUCTURE GUIDELINES:\n\
         1. Start with a compelling hook\n\
         2. Provide value in the main content\n\
         3. End with a call-to-action or thought-provoking question\n\
         4. Add relevant hashtags at the end\n\n\
         Respond with the post text only.",
        sources_summary = sources_summary,
        tone = style.tone.as_str(),
        post_type = style.post_type.as_str(),
        max_length = MAX_POST_CHARS,
        context = context.unwrap_or("none"),
    )
}

/// Strip wrapping the model tends to add around the post body
fn clean_generated(raw: &str) -> String {
    let mut text = raw.trim();

    // drop surrounding quote or code-fence wrappers
    if text.starts_with("```") {
        text = text.trim_start_matches("```").trim_start_matches("text");
        if let Some(end) = text.rfind("```") {
            text = &text[..end];
        }
    }
    let text = text.trim().trim_matches('"').trim();

    if text.chars().count() > MAX_POST_CHARS {
        crate::utils::truncate_text(text, MAX_POST_CHARS)
    } else {
        text.to_string()
    }
}
