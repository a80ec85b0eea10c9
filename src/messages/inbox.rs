use axum::{debug_handler, extract::{Path, State}, response::{IntoResponse, Redirect, Response}};

use crate::{auth::AuthContext, backend::Backend, include_res, res, startups::get_startup, AppResult, AppState};

use super::MessageStore;

/// Everyone who has written to one of your startups.
#[debug_handler(state = AppState)]
pub(crate) async fn inbox(
    Path(startup_id): Path<String>,
    State(backend): State<Backend>,
    State(messages): State<MessageStore>,
    auth: AuthContext,
) -> AppResult<Response> {
    let Some(identity) = &auth.identity else {
        return Ok(Redirect::to(&format!("/login?return_url=/startups/{startup_id}/inbox")).into_response());
    };

    let Some(startup) = get_startup(&backend, &startup_id).await? else {
        return res::sorry("startup", &auth);
    };
    if !startup.is_owned_by(&identity.id) {
        return res::sorry("inbox", &auth);
    }

    let mut items = String::new();
    for summary in messages.inbox(&startup.id).await? {
        let who = match auth.identities().find(&summary.key.account_id).await? {
            Some(sender) => sender.name().to_owned(),
            None => "Unknown user".to_owned(),
        };
        let preview: String = summary.latest.content.chars().take(80).collect();

        items += &res::Template::new(include_res!(str, "/pages/messages/inbox_item.html"))
            .with("startup_id", &res::escape(&startup.id))
            .with("account_id", &res::escape(&summary.key.account_id))
            .with("who", &res::escape(&who))
            .with("preview", &res::escape(&preview))
            .with("count", &summary.received.to_string())
            .render();
    }
    if items.is_empty() {
        items = r#"<li class="muted">No messages yet.</li>"#.to_owned();
    }

    let body = res::Template::new(include_res!(str, "/pages/messages/inbox.html"))
        .with("startup_id", &res::escape(&startup.id))
        .with("startup_name", &res::escape(&startup.name))
        .with("items", &items)
        .render();

    Ok(res::page(&format!("{} inbox", startup.name), &auth, &body).into_response())
}
