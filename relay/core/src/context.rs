//! Context Retrieval
//!
//! Optional hook consulted before building upstream input. A provider may
//! return extra context text (for example retrieved documents); when it
//! does, the system turn sent upstream embeds it.

use async_trait::async_trait;

use crate::messages::ChatTurn;

/// Base system prompt when none is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant";

/// What a provider is asked about
#[derive(Clone, Debug)]
pub struct ContextQuery {
    /// Conversation the turn belongs to
    pub conversation_id: String,
    /// Stored history, oldest first
    pub history: Vec<ChatTurn>,
}

impl ContextQuery {
    /// Content of the newest user turn, if any
    #[must_use]
    pub fn latest_user_message(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|t| t.role == crate::messages::MessageRole::User)
            .map(|t| t.content.as_str())
    }
}

/// External context retrieval hook
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Return context text for this turn, or `None` for no augmentation
    async fn retrieve(&self, query: &ContextQuery) -> anyhow::Result<Option<String>>;
}

/// Provider that always returns the same text
#[derive(Clone, Debug)]
pub struct StaticContext {
    text: String,
}

impl StaticContext {
    /// Create a provider returning `text`
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl ContextProvider for StaticContext {
    async fn retrieve(&self, _query: &ContextQuery) -> anyhow::Result<Option<String>> {
        Ok(Some(self.text.clone()))
    }
}

/// System turn content for the given base prompt and optional context
///
/// Returns `None` when there is neither a configured prompt nor context.
#[must_use]
pub fn build_system_prompt(base: Option<&str>, context: Option<&str>) -> Option<String> {
    match context {
        Some(context) => {
            let base = base.unwrap_or(DEFAULT_SYSTEM_PROMPT);
            Some(format!(
                "{base} that answers some questions with the help of some context data.\n\nHere is the context data:\n\n{context}"
            ))
        }
        None => base.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_with_context_uses_default_base() {
        let prompt = build_system_prompt(None, Some("Paris is in France.")).unwrap();
        assert_eq!(
            prompt,
            "You are a helpful assistant that answers some questions with the help of some context data.\n\nHere is the context data:\n\nParis is in France."
        );
    }

    #[test]
    fn test_prompt_without_context() {
        assert_eq!(build_system_prompt(None, None), None);
        assert_eq!(
            build_system_prompt(Some("Be terse"), None).as_deref(),
            Some("Be terse")
        );
    }

    #[tokio::test]
    async fn test_static_context() {
        let provider = StaticContext::new("facts");
        let query = ContextQuery {
            conversation_id: "c1".to_string(),
            history: vec![ChatTurn::user("first"), ChatTurn::assistant("ok"), ChatTurn::user("second")],
        };
        assert_eq!(query.latest_user_message(), Some("second"));
        assert_eq!(provider.retrieve(&query).await.unwrap().as_deref(), Some("facts"));
    }
}
