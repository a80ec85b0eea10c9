use axum::{debug_handler, extract::State, response::{IntoResponse, Redirect, Response}};

use crate::{auth::AuthContext, backend::Backend, include_res, res, startups::startups_by_owner, AppResult, AppState};

#[debug_handler(state = AppState)]
pub(crate) async fn profile(
    State(backend): State<Backend>,
    auth: AuthContext,
) -> AppResult<Response> {
    let Some(identity) = &auth.identity else {
        return Ok(Redirect::to("/login?return_url=/profile").into_response());
    };

    let mut startup_items = String::new();
    for startup in startups_by_owner(&backend, &identity.id).await? {
        startup_items += &res::Template::new(include_res!(str, "/pages/profiles/startup_item.html"))
            .with("id", &res::escape(&startup.id))
            .with("name", &res::escape(&startup.name))
            .with("category", startup.category.label())
            .render();
    }
    if startup_items.is_empty() {
        startup_items = r#"<li class="muted">You haven't added any startups yet. <a href="/startups/new">Add one</a>.</li>"#.to_owned();
    }

    Ok(res::page(
        "Profile",
        &auth,
        &res::Template::new(include_res!(str, "/pages/profiles/profile.html"))
            .with("name", &res::escape(identity.name()))
            .with("email", &res::escape(&identity.email))
            .with("startup_items", &startup_items)
            .render(),
    ).into_response())
}
