use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::tone::Tone;

pub mod openai;

pub use openai::OpenAiProvider;

/// Number of alternative artifacts carried by one scheduled delivery.
pub const BATCH_SIZE: usize = 3;

const TITLE_MAX_CHARS: usize = 100;
const SNIPPET_MAX_CHARS: usize = 300;
const SNIPPET_ELLIPSIS: &str = "...";

/// Angles used to make batch artifacts differ from each other.
const BATCH_ANGLES: [&str; BATCH_SIZE] = [
    "a timely trend or development worth talking about",
    "a practical, actionable tip the reader can apply today",
    "a thought-provoking question or contrarian take that invites discussion",
];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GenerationError {
    #[error("generation provider returned {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("generation provider returned a malformed payload: {0}")]
    Malformed(String),
    #[error("generation provider returned no content")]
    Empty,
    #[error("generation request failed: {0}")]
    Network(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentArtifact {
    pub title: String,
    pub body: String,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub industry: String,
    pub tone: Tone,
    pub temperature: f64,
    pub instructions: String,
    pub prompt: String,
}

#[async_trait]
pub trait GenerationProvider: Send + Sync + 'static {
    /// Returns the raw natural-language completion for `request`.
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

#[derive(Clone)]
pub struct ContentGenerator {
    provider: Arc<dyn GenerationProvider>,
}

impl ContentGenerator {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self { provider }
    }

    pub async fn generate(
        &self,
        industry: &str,
        tone: &Tone,
        temperature: f64,
    ) -> Result<ContentArtifact, GenerationError> {
        self.generate_with_angle(industry, tone, temperature, BATCH_ANGLES[0])
            .await
    }

    /// Generates [`BATCH_SIZE`] artifacts one after another. The first failure
    /// aborts the batch.
    pub async fn generate_batch(
        &self,
        industry: &str,
        tone: &Tone,
        temperature: f64,
    ) -> Result<Vec<ContentArtifact>, GenerationError> {
        let mut artifacts = Vec::with_capacity(BATCH_SIZE);
        for angle in BATCH_ANGLES {
            let artifact = self
                .generate_with_angle(industry, tone, temperature, angle)
                .await?;
            artifacts.push(artifact);
        }
        Ok(artifacts)
    }

    async fn generate_with_angle(
        &self,
        industry: &str,
        tone: &Tone,
        temperature: f64,
        angle: &str,
    ) -> Result<ContentArtifact, GenerationError> {
        let request = GenerationRequest {
            industry: industry.to_string(),
            tone: tone.clone(),
            temperature: temperature.clamp(0.0, 1.0),
            instructions: system_instruction(industry, tone),
            prompt: format!(
                "Write one social media post for the {industry} industry focused on {angle}. \
                 Start with a short headline on its own line, then the post body."
            ),
        };

        debug!(industry, tone = %tone, temperature, "requesting content");
        let text = self.provider.complete(&request).await?;
        if text.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(extract_artifact(&text, industry))
    }
}

pub fn system_instruction(industry: &str, tone: &Tone) -> String {
    format!(
        "You are a social media content writer for professionals in the {industry} industry. \
         Write in a {voice} tone. Keep posts original, specific and ready to publish.",
        voice = tone.voice()
    )
}

/// Splits a completion into title, body and preview snippet.
///
/// A short first line becomes the title even when nothing follows it, which
/// leaves the body empty. The snippet is cut from the untrimmed response.
pub fn extract_artifact(text: &str, industry: &str) -> ContentArtifact {
    let trimmed = text.trim();
    let snippet = snippet(text);

    let (first_line, rest) = match trimmed.split_once('\n') {
        Some((first, rest)) => (first.trim(), rest.trim()),
        None => (trimmed, ""),
    };

    let candidate = clean_title(first_line);
    if !first_line.is_empty()
        && first_line.chars().count() < TITLE_MAX_CHARS
        && !candidate.is_empty()
    {
        return ContentArtifact {
            title: candidate,
            body: rest.to_string(),
            snippet,
        };
    }

    ContentArtifact {
        title: format!("{industry} Industry Insight"),
        body: trimmed.to_string(),
        snippet,
    }
}

fn clean_title(line: &str) -> String {
    line.trim_start_matches('#')
        .replace("**", "")
        .trim()
        .to_string()
}

fn snippet(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(SNIPPET_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}{SNIPPET_ELLIPSIS}")
    } else {
        head
    }
}
