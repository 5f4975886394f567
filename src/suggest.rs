//! Completion backend for inline suggestions and plan generation.
//!
//! `GroqClient` talks to an OpenAI-compatible chat-completions endpoint. The
//! `CompletionProvider` trait is the seam the daemon depends on, so tests can
//! substitute a deterministic backend.

use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use serde_json::json;
use zeroize::Zeroizing;

pub const GROQ_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

const SUGGEST_MAX_TOKENS: u32 = 120;

const SUGGEST_SYSTEM_PROMPT: &str = r#"You are a shell autocomplete engine embedded in a terminal. You will receive the user's current working directory, their shell, recent command history, and their partially typed command.

Your job is to predict and return the SINGLE most likely full command the user is trying to type. Think about:
- What command they are starting to type (even from just 2-3 characters)
- Their recent history for patterns and context
- Their current directory for relevant files/paths
- Common shell commands, flags, and arguments

Rules:
- Return ONLY the completed command, nothing else
- No explanation, no markdown, no backticks, no quotes around the command
- The completion must start with exactly what the user has typed so far
- Prefer practical, real commands over generic ones
- Include flags and arguments when they are clearly implied
- If unsure, complete just the command name"#;

/// Produces a full-command suggestion for a partially typed buffer. The
/// returned string is either empty (no suggestion) or an extension of the
/// buffer.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, buffer: &str, cwd: &str, shell: &str, history: &str)
        -> Result<String>;
}

pub struct GroqClient {
    api_key: Zeroizing<String>,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GroqClient {
    pub fn new(api_key: Zeroizing<String>, model: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: GROQ_ENDPOINT.to_string(),
            client,
        }
    }

    /// One chat round trip, returning the first choice's message content.
    pub async fn chat(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "max_tokens": max_tokens,
            "temperature": 0,
            "stream": false,
        });

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(self.api_key.as_str())
            .json(&body)
            .send()
            .await
            .context("completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("completion endpoint returned {status}");
        }

        let parsed: serde_json::Value = response
            .json()
            .await
            .context("invalid completion response")?;
        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();
        Ok(content)
    }
}

#[async_trait]
impl CompletionProvider for GroqClient {
    async fn complete(
        &self,
        buffer: &str,
        cwd: &str,
        shell: &str,
        history: &str,
    ) -> Result<String> {
        if buffer.trim().is_empty() {
            return Ok(String::new());
        }
        let user = build_user_prompt(buffer, cwd, shell, history);
        let raw = self.chat(SUGGEST_SYSTEM_PROMPT, &user, SUGGEST_MAX_TOKENS).await?;
        Ok(clean_suggestion(&raw, buffer))
    }
}

fn build_user_prompt(buffer: &str, cwd: &str, shell: &str, history: &str) -> String {
    let mut prompt = format!("shell: {shell}\ncwd: {cwd}");
    if !history.is_empty() && history != crate::history::NO_HISTORY {
        prompt.push_str("\nrecent history:\n");
        for line in history.lines() {
            prompt.push_str("  ");
            prompt.push_str(line);
            prompt.push('\n');
        }
    }
    prompt.push_str("\n> ");
    prompt.push_str(buffer);
    prompt
}

/// Normalize model output into a usable suggestion, or an empty string.
///
/// Strips decoration the model tends to add despite instructions, keeps the
/// first line only, then enforces that the result extends the typed buffer.
/// A case-insensitive match is re-cased onto the buffer so the shell can
/// display it as ghost text after what the user actually typed.
pub fn clean_suggestion(raw: &str, buffer: &str) -> String {
    let mut s = raw.trim();
    s = s.trim_matches(|c: char| c == '`' || c == '"' || c == '\'');
    s = s.strip_prefix("$ ").unwrap_or(s);
    let s = s.trim();
    let s = s.lines().next().unwrap_or("");

    if s.starts_with(buffer) {
        return s.to_string();
    }

    if s.is_char_boundary(buffer.len())
        && s.len() >= buffer.len()
        && s[..buffer.len()].eq_ignore_ascii_case(buffer)
    {
        return format!("{buffer}{}", &s[buffer.len()..]);
    }

    String::new()
}
