use axum::{debug_handler, extract::{Path, State}, response::{IntoResponse, Redirect, Response}};
use tracing::info;

use crate::{auth::AuthContext, backend::Backend, include_res, res, AppResult, AppState};

use super::{get_startup, Startup, STARTUPS};

fn socials(startup: &Startup) -> String {
    startup
        .social_links
        .iter()
        .filter(|(_, url)| url.starts_with("http://") || url.starts_with("https://"))
        .map(|(platform, url)| {
            format!(
                r#"<li><a href="{}" rel="noopener nofollow" target="_blank">{}</a></li>"#,
                res::escape(url),
                res::escape(platform),
            )
        })
        .collect()
}

fn actions(startup: &Startup, auth: &AuthContext) -> String {
    match &auth.identity {
        Some(identity) if startup.is_owned_by(&identity.id) => {
            res::Template::new(include_res!(str, "/pages/startups/owner_actions.html"))
                .with("id", res::escape(&startup.id))
                .render()
        }
        Some(_) => format!(r#"<a class="button" href="/startups/{}/conversation">Message</a>"#, res::escape(&startup.id)),
        None => format!(
            r#"<a class="button" href="/login?return_url=/startups/{}/conversation">Message</a>"#,
            res::escape(&startup.id)
        ),
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn startup(
    Path(id): Path<String>,
    State(backend): State<Backend>,
    auth: AuthContext,
) -> AppResult<Response> {
    let Some(startup) = get_startup(&backend, &id).await? else {
        return res::sorry("startup", &auth);
    };

    let cover = startup
        .cover()
        .map(|url| format!(r#"<img class="cover" src="{}" alt="{}">"#, res::escape(url), res::escape(&startup.name)))
        .unwrap_or_default();
    let gallery: String = startup
        .gallery()
        .iter()
        .map(|url| format!(r#"<a href="{0}"><img src="{0}" alt=""></a>"#, res::escape(url)))
        .collect();
    let creator = if startup.creator_display_name.is_empty() {
        String::new()
    } else {
        format!("Listed by {}", res::escape(&startup.creator_display_name))
    };

    let body = res::Template::new(include_res!(str, "/pages/startups/startup.html"))
        .with("cover", &cover)
        .with("name", &res::escape(&startup.name))
        .with("category", startup.category.label())
        .with("creator", &creator)
        .with("description", &res::render_markdown(&startup.description))
        .with("gallery", &gallery)
        .with("socials", &socials(&startup))
        .with("actions", &actions(&startup, &auth))
        .render();

    Ok(res::page(&startup.name, &auth, &body).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_startup(
    Path(id): Path<String>,
    State(backend): State<Backend>,
    auth: AuthContext,
) -> AppResult<Response> {
    let Some(identity) = &auth.identity else {
        return Ok(Redirect::to(&format!("/login?return_url=/startups/{id}")).into_response());
    };

    let Some(startup) = get_startup(&backend, &id).await? else {
        return res::sorry("startup", &auth);
    };

    if !startup.is_owned_by(&identity.id) {
        return res::forbidden("startup", &auth);
    }

    backend.delete_record(STARTUPS, &id).await?;
    info!("startup {id} deleted by u/{}", identity.id);

    Ok(Redirect::to("/profile").into_response())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::{
        backend::{test_backend, Backend, Identity},
        startups::new::{publish, StartupForm},
    };

    use super::*;

    async fn listed_by(backend: &Backend, owner: &Identity, description: &str) -> String {
        let form = StartupForm {
            name: "Acme".into(),
            description: description.into(),
            category: "Technology".into(),
            ..StartupForm::default()
        };
        publish(backend, owner, &form).await.unwrap()
    }

    #[tokio::test]
    async fn placeholders_in_descriptions_are_shown_as_written() {
        let (backend, identities) = test_backend().await;
        let owner = AuthContext::signed_in_for_tests(&identities, "owner@example.com").await;
        let id = listed_by(&backend, owner.identity.as_ref().unwrap(), "Use {socials} and {actions} in text").await;

        let visitor = AuthContext::signed_out_for_tests(&identities);
        let response = startup(Path(id), State(backend), visitor).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let html = res::text_of(response).await;
        assert!(html.contains("Use {socials} and {actions} in text"));
        assert_eq!(html.matches(">Message</a>").count(), 1);
        assert!(!html.contains("/delete"));
    }

    #[tokio::test]
    async fn owner_sees_their_actions() {
        let (backend, identities) = test_backend().await;
        let owner = AuthContext::signed_in_for_tests(&identities, "owner@example.com").await;
        let id = listed_by(&backend, owner.identity.as_ref().unwrap(), "anvils").await;

        let html = res::text_of(startup(Path(id.clone()), State(backend), owner).await.unwrap()).await;
        assert!(html.contains(&format!("/startups/{id}/delete")));
        assert!(html.contains(&format!("/startups/{id}/inbox")));
    }

    #[tokio::test]
    async fn only_the_owner_can_delete() {
        let (backend, identities) = test_backend().await;
        let owner = AuthContext::signed_in_for_tests(&identities, "owner@example.com").await;
        let id = listed_by(&backend, owner.identity.as_ref().unwrap(), "anvils").await;

        let stranger = AuthContext::signed_in_for_tests(&identities, "stranger@example.com").await;
        let response = delete_startup(Path(id.clone()), State(backend.clone()), stranger).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(res::text_of(response).await.contains("Only the owner of this startup can do that."));
        assert!(get_startup(&backend, &id).await.unwrap().is_some());

        let response = delete_startup(Path(id.clone()), State(backend.clone()), owner).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()["location"], "/profile");
        assert!(get_startup(&backend, &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_startup_is_not_found() {
        let (backend, identities) = test_backend().await;
        let visitor = AuthContext::signed_out_for_tests(&identities);
        let response = startup(Path("nope".into()), State(backend), visitor).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
