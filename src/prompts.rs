//! Prompt templates, compiled into the binary and rendered with minijinja.

use anyhow::Context as _;
use minijinja::Environment;
use serde::Serialize;

const REPLY_TEMPLATE: &str = "reply";

/// Everything the reply prompt needs to know about the incoming message.
#[derive(Debug, Serialize)]
pub struct ReplyPrompt<'a> {
    pub sender: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
    /// Rendered ancestors, oldest first. Omitted from the prompt when empty.
    pub thread_history: &'a str,
    pub agent_name: &'a str,
}

pub struct PromptEngine {
    env: Environment<'static>,
}

impl std::fmt::Debug for PromptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptEngine").finish_non_exhaustive()
    }
}

impl PromptEngine {
    pub fn new() -> crate::Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template(REPLY_TEMPLATE, include_str!("../prompts/reply.md.j2"))
            .context("failed to compile reply prompt template")?;

        Ok(Self { env })
    }

    pub fn render_reply(&self, prompt: &ReplyPrompt<'_>) -> crate::Result<String> {
        let rendered = self
            .env
            .get_template(REPLY_TEMPLATE)
            .and_then(|template| template.render(prompt))
            .context("failed to render reply prompt")?;
        Ok(rendered)
    }
}
