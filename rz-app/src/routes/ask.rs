use crate::answer::compose_answer;
use crate::pages;
use crate::routes::{error_redirect, login_redirect};
use crate::server::AppState;
use axum::Extension;
use axum::extract::Form;
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::post;
use rz_tools::HandleOutcome;
use serde::Deserialize;
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new().route("/ask", post(ask))
}

#[derive(Debug, Deserialize)]
struct AskForm {
    question: String,
}

#[tracing::instrument(level = "info", skip_all)]
async fn ask(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<AskForm>,
) -> Response {
    let Some(token) = state.sessions.bearer_for(&headers) else {
        return login_redirect();
    };
    let question = form.question.trim();
    if question.is_empty() {
        return error_redirect("Please enter a question.");
    }

    let outcome = state
        .orchestrator
        .handle(question, &token, state.llm.as_ref())
        .await;
    match &outcome {
        HandleOutcome::Context(_) => tracing::debug!("rememberizer context attached"),
        HandleOutcome::NoContext => tracing::debug!("answering without rememberizer context"),
        HandleOutcome::Unavailable(reason) => {
            tracing::warn!(
                reason = %reason,
                "rememberizer context unavailable; answering without it"
            )
        }
    }

    match compose_answer(
        state.llm.as_ref(),
        &state.config.general,
        question,
        outcome.as_context(),
    )
    .await
    {
        Ok(answer) => Html(pages::answer(question, &answer)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "answer composition failed");
            error_redirect(&e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::routes::test_http::{body_text, location, post_form};
    use crate::server::app;
    use crate::server::test_support::{ScriptedChat, logged_in, test_state, text_reply, tool_reply};
    use axum::http::StatusCode;
    use mockito::Matcher;
    use rz_llm::Role;
    use std::sync::Arc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn anonymous_question_redirects_to_login() {
        let state = test_state("http://127.0.0.1:9/", Arc::new(ScriptedChat::default()));
        let resp = app(state)
            .oneshot(post_form("/ask", None, "question=hi"))
            .await
            .expect("response");
        assert_eq!(location(&resp), "/auth/rememberizer");
    }

    #[tokio::test]
    async fn answers_with_search_context() {
        let mut server = mockito::Server::new_async().await;
        let search = server
            .mock("GET", "/documents/search/")
            .match_header("authorization", "Bearer tok")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "release date".into()),
                Matcher::UrlEncoded("n".into(), "3".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"matched_chunks":[{"text":"We ship Friday"}]}"#)
            .create_async()
            .await;

        let llm = Arc::new(ScriptedChat::new(vec![
            tool_reply("search", r#"{"q":"release date","n":3}"#),
            text_reply("We ship **Friday**."),
        ]));
        let state = test_state(&format!("{}/", server.url()), llm.clone());
        let cookie = logged_in(&state, "tok");

        let resp = app(state)
            .oneshot(post_form(
                "/ask",
                Some(&cookie),
                "question=When+do+we+release%3F",
            ))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_text(resp).await;
        assert!(body.contains("Q: When do we release?"));
        assert!(body.contains("We ship **Friday**."));
        search.assert_async().await;

        let seen = llm.seen.lock().expect("seen lock");
        assert_eq!(seen.len(), 2);
        let (selection_messages, selection_tools, selection_options) = &seen[0];
        assert_eq!(selection_messages[1].content, "When do we release?");
        assert_eq!(*selection_tools, 4);
        assert_eq!(selection_options.model.as_deref(), Some("gpt-4o"));

        let (answer_messages, answer_tools, _) = &seen[1];
        assert_eq!(*answer_tools, 0);
        assert_eq!(answer_messages.len(), 3);
        assert_eq!(answer_messages[1].role, Role::System);
        assert!(answer_messages[1].content.contains("We ship Friday"));
    }

    #[tokio::test]
    async fn tool_selection_failure_still_answers() {
        let llm = Arc::new(ScriptedChat::new(vec![
            Err(rz_llm::LlmError::Http("rate limited".to_string())),
            text_reply("I don't have workspace context for that."),
        ]));
        let state = test_state("http://127.0.0.1:9/", llm.clone());
        let cookie = logged_in(&state, "tok");

        let resp = app(state)
            .oneshot(post_form("/ask", Some(&cookie), "question=anything"))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_text(resp).await.contains("workspace context"));

        let seen = llm.seen.lock().expect("seen lock");
        let (answer_messages, _, _) = &seen[1];
        assert_eq!(answer_messages.len(), 2);
    }

    #[tokio::test]
    async fn answer_failure_goes_to_error_page() {
        let llm = Arc::new(ScriptedChat::new(vec![
            text_reply("no tool needed"),
            Err(rz_llm::LlmError::Timeout("answer".to_string())),
        ]));
        let state = test_state("http://127.0.0.1:9/", llm);
        let cookie = logged_in(&state, "tok");

        let resp = app(state)
            .oneshot(post_form("/ask", Some(&cookie), "question=anything"))
            .await
            .expect("response");
        assert!(location(&resp).starts_with("/error?message=answer+composition+failed"));
    }
}
