use axum::{debug_handler, extract::{Query, State}, response::{IntoResponse, Response}};
use oauth2::url::form_urlencoded;
use serde::Deserialize;

use crate::{auth::AuthContext, backend::Backend, include_res, res, AppResult, AppState};

use super::{list_startups, Category, Startup};

/// The listings whose name contains `search_term` (ignoring case) and whose
/// category is `category`, if one is given. Order is kept.
pub fn filter(listings: Vec<Startup>, search_term: &str, category: Option<Category>) -> Vec<Startup> {
    let needle = search_term.to_lowercase();
    listings
        .into_iter()
        .filter(|startup| startup.name.to_lowercase().contains(&needle))
        .filter(|startup| category.is_none_or(|c| startup.category == c))
        .collect()
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DirectoryQuery {
    q: Option<String>,
    category: Option<String>,
}

fn directory_link(search_term: &str, category: Option<Category>) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    if !search_term.is_empty() {
        query.append_pair("q", search_term);
    }
    if let Some(category) = category {
        query.append_pair("category", category.label());
    }

    match query.finish() {
        query if query.is_empty() => "/startups".to_owned(),
        query => format!("/startups?{query}"),
    }
}

fn card(startup: &Startup) -> String {
    let cover = startup
        .cover()
        .map(|url| format!(r#"<img class="cover" src="{}" alt="{}">"#, res::escape(url), res::escape(&startup.name)))
        .unwrap_or_default();
    let blurb: String = startup.description.chars().take(100).collect();

    res::Template::new(include_res!(str, "/pages/startups/card.html"))
        .with("id", &res::escape(&startup.id))
        .with("cover", &cover)
        .with("name", &res::escape(&startup.name))
        .with("category", startup.category.label())
        .with("blurb", &res::escape(&blurb))
        .render()
}

#[debug_handler(state = AppState)]
pub(crate) async fn directory(
    Query(DirectoryQuery { q, category }): Query<DirectoryQuery>,
    State(backend): State<Backend>,
    auth: AuthContext,
) -> AppResult<Response> {
    let search_term = q.unwrap_or_default();
    let category = category.and_then(|c| c.parse::<Category>().ok());

    let listings = filter(list_startups(&backend).await?, search_term.trim(), category);

    let mut chips = String::new();
    for c in Category::ALL {
        let class = if Some(c) == category { "chip selected" } else { "chip" };
        chips += &format!(
            r#"<li><a class="{class}" href="{}">{}</a></li>"#,
            res::escape(&directory_link(&search_term, Some(c))),
            c.label(),
        );
    }
    if category.is_some() {
        chips += &format!(
            r#"<li><a class="chip clear" href="{}">Clear Filter</a></li>"#,
            res::escape(&directory_link(&search_term, None)),
        );
    }

    let cards = if listings.is_empty() {
        r#"<p class="muted">No startups found.</p>"#.to_owned()
    } else {
        listings.iter().map(card).collect()
    };

    let body = res::Template::new(include_res!(str, "/pages/startups/directory.html"))
        .with("q", &res::escape(&search_term))
        .with("category", category.map(|c| c.label()).unwrap_or_default())
        .with("chips", &chips)
        .with("cards", &cards)
        .render();

    Ok(res::page("Startups", &auth, &body).into_response())
}
