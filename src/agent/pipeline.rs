//! Per-message reply pipeline: triage, compose, dispatch.

use crate::config::{AgentConfig, SmtpConfig};
use crate::llm::ReplyGenerator;
use crate::messaging::outbound::build_reply;
use crate::messaging::{FolderSearchList, IncomingMessage, ReplyTransport, SentArchive};
use crate::prompts::{PromptEngine, ReplyPrompt};

use std::sync::Arc;

/// Where a message is in the pipeline. The last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Triage,
    Compose,
    Dispatch,
    Skipped,
    Dispatched,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Auto-replies, bulk and list mail. Answering them risks mail loops.
    AutoGenerated,
    /// Mail sent from the agent's own address.
    OwnAddress,
}

/// Working state for one incoming message.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub incoming: IncomingMessage,
    /// Rendered ancestors, oldest first. Empty for a fresh conversation.
    pub thread_history: String,
    pub should_reply: bool,
    pub reply_body: String,
    pub error: Option<String>,
    pub stage: Stage,
    pub skip_reason: Option<SkipReason>,
    /// `Message-ID` of the reply once it was sent.
    pub sent_message_id: Option<String>,
}

impl ConversationState {
    pub fn new(incoming: IncomingMessage, thread_history: String) -> Self {
        Self {
            incoming,
            thread_history,
            should_reply: false,
            reply_body: String::new(),
            error: None,
            stage: Stage::Triage,
            skip_reason: None,
            sent_message_id: None,
        }
    }

    fn skip(&mut self, reason: SkipReason) {
        self.should_reply = false;
        self.reply_body.clear();
        self.skip_reason = Some(reason);
        self.stage = Stage::Skipped;
    }

    fn fail(&mut self, error: impl std::fmt::Display) {
        self.error = Some(error.to_string());
        self.stage = Stage::Failed;
    }
}

/// Who the agent is when it writes back.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub address: String,
    pub name: String,
    /// System prompt for the text generator.
    pub persona: String,
    /// Right-hand side of generated `Message-ID`s.
    pub message_id_domain: String,
}

impl AgentIdentity {
    pub fn from_config(agent: &AgentConfig, smtp: &SmtpConfig) -> Self {
        Self {
            address: agent.address.trim().to_string(),
            name: agent.name.trim().to_string(),
            persona: agent.persona.clone(),
            message_id_domain: smtp.host.trim().to_string(),
        }
    }

    /// `From` header value.
    pub fn from_header(&self) -> String {
        if self.name.is_empty() {
            self.address.clone()
        } else {
            format!("\"{}\" <{}>", self.name.replace('"', ""), self.address)
        }
    }

    fn is_own_address(&self, address: &str) -> bool {
        address.trim().eq_ignore_ascii_case(&self.address)
    }
}

pub struct ReplyPipeline {
    identity: AgentIdentity,
    prompts: PromptEngine,
    generator: Arc<dyn ReplyGenerator>,
    transport: Arc<dyn ReplyTransport>,
    archive: Option<Arc<dyn SentArchive>>,
}

impl ReplyPipeline {
    pub fn new(
        identity: AgentIdentity,
        prompts: PromptEngine,
        generator: Arc<dyn ReplyGenerator>,
        transport: Arc<dyn ReplyTransport>,
    ) -> Self {
        Self {
            identity,
            prompts,
            generator,
            transport,
            archive: None,
        }
    }

    /// Keep a copy of every sent reply in the sent folder, when one exists.
    pub fn with_archive(mut self, archive: Arc<dyn SentArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Drive `state` to a terminal stage. Failures are recorded on the
    /// state, never returned.
    pub async fn run(
        &self,
        mut state: ConversationState,
        folders: &FolderSearchList,
    ) -> ConversationState {
        self.triage(&mut state);
        if state.stage == Stage::Compose {
            self.compose(&mut state).await;
        }
        if state.stage == Stage::Dispatch {
            self.dispatch(&mut state, folders).await;
        }

        match state.stage {
            Stage::Skipped => tracing::info!(
                uid = state.incoming.uid,
                sender = %state.incoming.sender,
                reason = ?state.skip_reason,
                "skipping message"
            ),
            Stage::Failed => tracing::warn!(
                uid = state.incoming.uid,
                sender = %state.incoming.sender,
                error = state.error.as_deref().unwrap_or_default(),
                "reply failed"
            ),
            _ => {}
        }

        state
    }

    fn triage(&self, state: &mut ConversationState) {
        if state.incoming.is_auto_generated {
            state.skip(SkipReason::AutoGenerated);
            return;
        }

        if state
            .incoming
            .sender_address()
            .is_some_and(|address| self.identity.is_own_address(&address))
        {
            state.skip(SkipReason::OwnAddress);
            return;
        }

        state.should_reply = true;
        state.stage = Stage::Compose;
    }

    async fn compose(&self, state: &mut ConversationState) {
        let prompt = ReplyPrompt {
            sender: &state.incoming.sender,
            subject: &state.incoming.subject,
            body: &state.incoming.body_text,
            thread_history: &state.thread_history,
            agent_name: &self.identity.name,
        };

        let prompt = match self.prompts.render_reply(&prompt) {
            Ok(prompt) => prompt,
            Err(error) => return state.fail(error),
        };

        tracing::debug!(uid = state.incoming.uid, history_chars = state.thread_history.len(), "composing reply");
        let body = match self.generator.generate(&self.identity.persona, &prompt).await {
            Ok(body) => body,
            Err(error) => return state.fail(error),
        };

        let body = body.trim();
        if body.is_empty() {
            return state.fail("empty reply");
        }

        state.reply_body = body.to_string();
        state.stage = Stage::Dispatch;
    }

    async fn dispatch(&self, state: &mut ConversationState, folders: &FolderSearchList) {
        if !state.should_reply || state.reply_body.is_empty() {
            return state.fail("nothing to dispatch");
        }

        let reply = match build_reply(
            &self.identity.from_header(),
            &state.incoming,
            &state.reply_body,
            &self.identity.message_id_domain,
        ) {
            Ok(reply) => reply,
            Err(error) => return state.fail(error),
        };

        if let Err(error) = self.transport.send(&reply.envelope, &reply.raw).await {
            return state.fail(error);
        }

        tracing::info!(
            uid = state.incoming.uid,
            to = %state.incoming.sender,
            message_id = %reply.message_id,
            "reply sent"
        );

        if let (Some(archive), Some(sent)) = (&self.archive, folders.sent())
            && let Err(error) = archive.archive(sent, &reply.raw).await
        {
            tracing::warn!(folder = sent, message_id = %reply.message_id, %error, "failed to archive sent reply");
        }

        state.sent_message_id = Some(reply.message_id);
        state.stage = Stage::Dispatched;
    }
}
