use axum::{debug_handler, extract::State, response::{IntoResponse, Response}};

use crate::{auth::{AuthContext, ClientProvider, Clients}, include_res, res, AppState, Markdown};

#[debug_handler(state = AppState)]
pub async fn index(
    State(clients): State<Clients>,
    auth: AuthContext,
) -> Response {
    let calls_to_action = if auth.identity.is_some() {
        include_res!(str, "/pages/index_signed_in.html").to_owned()
    } else if clients.enabled(ClientProvider::Google) {
        let google = res::Template::new(include_res!(str, "/pages/google_button.html"))
            .with("return_url", "/")
            .render();
        res::Template::new(include_res!(str, "/pages/index_signed_out.html"))
            .with("google", google)
            .render()
    } else {
        res::Template::new(include_res!(str, "/pages/index_signed_out.html")).with("google", "").render()
    };

    let body = res::Template::new(include_res!(str, "/pages/index.html"))
        .with("calls_to_action", calls_to_action)
        .render();

    res::page("Linkal", &auth, &body).into_response()
}

#[debug_handler]
pub async fn about() -> impl IntoResponse {
    Markdown(include_res!(str, "/pages/about.md"))
}
