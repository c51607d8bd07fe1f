//! Answer composition: the second LLM call of `/ask`.

use crate::config::GeneralConfig;
use anyhow::Result;
use rz_llm::{ChatMessage, ChatOptions, ChatService};
use rz_tools::SYSTEM_PERSONA;

/// Context, when present, rides along as a second system message.
pub fn answer_messages(question: &str, context: &str) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(SYSTEM_PERSONA)];
    if !context.is_empty() {
        messages.push(ChatMessage::system(context));
    }
    messages.push(ChatMessage::user(format!(
        "Q: {question}\nFormat your answer in Markdown:\nA:"
    )));
    messages
}

#[tracing::instrument(level = "info", skip_all, fields(model = %general.answer_model))]
pub async fn compose_answer(
    llm: &dyn ChatService,
    general: &GeneralConfig,
    question: &str,
    context: &str,
) -> Result<String> {
    let options = ChatOptions::default()
        .with_model(&general.answer_model)
        .with_temperature(general.answer_temperature);
    let response = llm
        .chat(&answer_messages(question, context), &[], &options)
        .await
        .map_err(|e| anyhow::anyhow!("answer composition failed: {e}"))?;
    tracing::debug!(
        prompt_tokens = response.usage.prompt_tokens,
        completion_tokens = response.usage.completion_tokens,
        finish_reason = %response.finish_reason,
        "answer composed"
    );
    Ok(response.message.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::test_support::{ScriptedChat, text_reply};
    use rz_llm::Role;

    #[test]
    fn empty_context_is_omitted() {
        let messages = answer_messages("who posted?", "");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "You are a friendly AI assistant.");
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(
            messages[1].content,
            "Q: who posted?\nFormat your answer in Markdown:\nA:"
        );
    }

    #[test]
    fn context_becomes_second_system_message() {
        let messages = answer_messages("q", "Here's extra knowledge");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::System);
        assert_eq!(messages[1].content, "Here's extra knowledge");
    }

    #[tokio::test]
    async fn compose_uses_answer_model_and_temperature() {
        let llm = ScriptedChat::new(vec![text_reply("**Alice** posted it.")]);
        let general = GeneralConfig::default();
        let answer = compose_answer(&llm, &general, "who posted?", "")
            .await
            .expect("answer");
        assert_eq!(answer, "**Alice** posted it.");

        let seen = llm.seen.lock().expect("seen lock");
        let (_, tool_count, options) = &seen[0];
        assert_eq!(*tool_count, 0);
        assert_eq!(options.model.as_deref(), Some("gpt-4"));
        assert_eq!(options.temperature, Some(0.7));
    }
}
