use axum::{
    debug_handler,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use tracing::warn;

use crate::{
    auth::AuthContext,
    backend::Backend,
    include_res, res,
    startups::{get_startup, Startup},
    AppResult, AppState,
};

use super::{msg, ConversationKey, MessageError, MessageStore};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ConversationQuery {
    /// The account the startup owner is talking to.
    pub(crate) with: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendMessageForm {
    content: String,
    visible_to_sender: Option<String>,
}

/// A conversation the current user is allowed into, and which side they're on.
#[derive(Debug)]
pub(crate) struct Conversation {
    pub(crate) startup: Startup,
    pub(crate) key: ConversationKey,
    pub(crate) viewer_id: String,
    pub(crate) counterpart_name: String,
}

impl Conversation {
    pub(crate) fn path(&self) -> String {
        if self.viewer_id == self.key.startup_id {
            format!("/startups/{}/conversation?with={}", self.startup.id, self.key.account_id)
        } else {
            format!("/startups/{}/conversation", self.startup.id)
        }
    }

    fn ws_path(&self) -> String {
        self.path().replacen("/conversation", "/conversation/ws", 1)
    }
}

/// Works out the conversation for this request, or the response to send instead.
pub(crate) async fn resolve(
    backend: &Backend,
    auth: &AuthContext,
    startup_id: &str,
    with: Option<String>,
) -> AppResult<Result<Conversation, Response>> {
    let Some(identity) = &auth.identity else {
        let login = format!("/login?return_url=/startups/{startup_id}/conversation");
        return Ok(Err(Redirect::to(&login).into_response()));
    };

    let Some(startup) = get_startup(backend, startup_id).await? else {
        return Ok(Err(res::sorry("startup", auth)?));
    };

    if !startup.is_owned_by(&identity.id) {
        return Ok(Ok(Conversation {
            key: ConversationKey::new(&identity.id, &startup.id),
            viewer_id: identity.id.clone(),
            counterpart_name: startup.name.clone(),
            startup,
        }));
    }

    let Some(account_id) = with else {
        return Ok(Err(Redirect::to(&format!("/startups/{startup_id}/inbox")).into_response()));
    };
    let Some(counterpart) = auth.identities().find(&account_id).await? else {
        return Ok(Err(res::sorry("conversation", auth)?));
    };

    Ok(Ok(Conversation {
        key: ConversationKey::new(&counterpart.id, &startup.id),
        viewer_id: startup.id.clone(),
        counterpart_name: counterpart.name().to_owned(),
        startup,
    }))
}

async fn render(
    messages: &MessageStore,
    auth: &AuthContext,
    conversation: &Conversation,
    content: &str,
    error: Option<&MessageError>,
) -> AppResult<Response> {
    let history = messages.history(&conversation.key, &conversation.viewer_id).await?;
    let error_html = error
        .map(|e| format!(r#"<p class="error">{}</p>"#, res::escape(&e.to_string())))
        .unwrap_or_default();

    let body = res::Template::new(include_res!(str, "/pages/messages/conversation.html"))
        .with("startup_id", &res::escape(&conversation.startup.id))
        .with("startup_name", &res::escape(&conversation.startup.name))
        .with("counterpart", &res::escape(&conversation.counterpart_name))
        .with("messages", &msg::render_messages(&history, &conversation.viewer_id))
        .with("error", &error_html)
        .with("content", &res::escape(content))
        .with("post_url", &res::escape(&conversation.path()))
        .with("ws_url", &res::escape(&conversation.ws_path()))
        .render();

    let status = if error.is_some() { StatusCode::UNPROCESSABLE_ENTITY } else { StatusCode::OK };
    let title = format!("Messages with {}", conversation.counterpart_name);
    Ok((status, res::page(&title, auth, &body)).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn conversation(
    Path(startup_id): Path<String>,
    Query(ConversationQuery { with }): Query<ConversationQuery>,
    State(backend): State<Backend>,
    State(messages): State<MessageStore>,
    auth: AuthContext,
) -> AppResult<Response> {
    match resolve(&backend, &auth, &startup_id, with).await? {
        Ok(conversation) => render(&messages, &auth, &conversation, "", None).await,
        Err(response) => Ok(response),
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn send_message(
    Path(startup_id): Path<String>,
    Query(ConversationQuery { with }): Query<ConversationQuery>,
    State(backend): State<Backend>,
    State(messages): State<MessageStore>,
    auth: AuthContext,
    Form(SendMessageForm { content, visible_to_sender }): Form<SendMessageForm>,
) -> AppResult<Response> {
    let conversation = match resolve(&backend, &auth, &startup_id, with).await? {
        Ok(conversation) => conversation,
        Err(response) => return Ok(response),
    };

    let visible_to_sender = visible_to_sender.is_some();
    match messages.send(&conversation.key, &conversation.viewer_id, &content, visible_to_sender).await {
        Ok(_) => Ok(Redirect::to(&conversation.path()).into_response()),
        Err(e) => {
            if let MessageError::Backend(cause) = &e {
                warn!("send in {} failed: {cause}", conversation.key.id());
            }
            render(&messages, &auth, &conversation, &content, Some(&e)).await
        }
    }
}
