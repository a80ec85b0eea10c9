use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    debug_handler,
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    auth::AuthContext,
    backend::{now_millis, sanitize_segment, Backend, BackendError, Identity},
    include_res, res, AppResult, AppState,
};

use super::{Category, Startup, SOCIAL_PLATFORMS, STARTUPS};

pub const MAX_ADDITIONAL_IMAGES: usize = 3;

#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct StartupForm {
    pub name: String,
    pub description: String,
    pub category: String,
    pub profile_picture: Option<Upload>,
    pub images: Vec<Upload>,
    pub social_links: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum StartupFormError {
    #[error("You must be logged in to add a startup.")]
    NotLoggedIn,

    #[error("You can only upload up to 3 images.")]
    TooManyImages,

    #[error("Please give your startup a name and a description.")]
    MissingField,

    #[error("Please select a category.")]
    NoCategory,

    #[error("Failed to add startup. Please try again.")]
    Failed(#[from] BackendError),
}

/// Everything that can be rejected without touching the backend.
pub fn validate(form: &StartupForm) -> Result<Category, StartupFormError> {
    if form.images.len() > MAX_ADDITIONAL_IMAGES {
        return Err(StartupFormError::TooManyImages);
    }
    if form.name.trim().is_empty() || form.description.trim().is_empty() {
        return Err(StartupFormError::MissingField);
    }
    form.category.parse().map_err(|_| StartupFormError::NoCategory)
}

/// Uploads the images, then writes the listing that points at them.
/// Returns the new listing's id.
pub async fn publish(backend: &Backend, owner: &Identity, form: &StartupForm) -> Result<String, StartupFormError> {
    let category = validate(form)?;
    let owner_dir = sanitize_segment(&owner.id);

    let mut images = Vec::with_capacity(form.images.len() + 1);
    for image in &form.images {
        let path = format!("startups/{owner_dir}/{}", sanitize_segment(&image.file_name));
        let handle = backend.upload_blob(&path, &image.bytes).await?;
        images.push(backend.blob_url(&handle));
    }

    if let Some(picture) = &form.profile_picture {
        let handle = backend.upload_blob(&format!("startups/{owner_dir}/profile_picture"), &picture.bytes).await?;
        images.insert(0, backend.blob_url(&handle));
    }

    let startup = Startup {
        id: String::new(),
        name: form.name.trim().to_owned(),
        description: form.description.trim().to_owned(),
        category,
        images,
        social_links: form.social_links.clone(),
        created_by: owner.id.clone(),
        creator_display_name: owner.display_name.clone().unwrap_or_default(),
        created_at: now_millis(),
    };

    let id = backend.create_record(STARTUPS, &startup).await?;
    info!("startup {id} ({}) listed by u/{}", startup.name, owner.id);
    Ok(id)
}

async fn read_form(mut multipart: Multipart) -> AppResult<StartupForm> {
    let mut form = StartupForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "name" => form.name = field.text().await?,
            "description" => form.description = field.text().await?,
            "category" => form.category = field.text().await?,
            "profile_picture" | "images" => {
                let file_name = field.file_name().unwrap_or("image").to_owned();
                let bytes = field.bytes().await?;
                // browsers send an empty part for an untouched file input
                if bytes.is_empty() {
                    continue;
                }
                let upload = Upload { file_name, bytes };
                if name == "images" {
                    form.images.push(upload);
                } else {
                    form.profile_picture = Some(upload);
                }
            }
            other => {
                let Some(platform) = other.strip_prefix("social_") else {
                    continue;
                };
                if !SOCIAL_PLATFORMS.contains(&platform) {
                    continue;
                }
                let platform = platform.to_owned();
                let url = field.text().await?;
                if !url.trim().is_empty() {
                    form.social_links.insert(platform, url.trim().to_owned());
                }
            }
        }
    }

    Ok(form)
}

fn render_form(auth: &AuthContext, form: &StartupForm, error: Option<&StartupFormError>) -> Response {
    let error_html = error
        .map(|e| format!(r#"<p class="error">{}</p>"#, res::escape(&e.to_string())))
        .unwrap_or_default();

    let mut options = String::new();
    for c in Category::ALL {
        let selected = if form.category == c.label() { " selected" } else { "" };
        options += &format!(r#"<option value="{0}"{selected}>{0}</option>"#, c.label());
    }

    let mut socials = String::new();
    for platform in SOCIAL_PLATFORMS {
        let value = form.social_links.get(platform).map(String::as_str).unwrap_or_default();
        socials += &res::Template::new(include_res!(str, "/pages/startups/social_input.html"))
            .with("platform", platform)
            .with("value", &res::escape(value))
            .render();
    }

    let body = res::Template::new(include_res!(str, "/pages/startups/new.html"))
        .with("error", &error_html)
        .with("name", &res::escape(&form.name))
        .with("description", &res::escape(&form.description))
        .with("options", &options)
        .with("socials", &socials)
        .render();

    let status = if error.is_some() { StatusCode::UNPROCESSABLE_ENTITY } else { StatusCode::OK };
    (status, res::page("Add Your Startup", auth, &body)).into_response()
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_startup_page(auth: AuthContext) -> Response {
    if auth.identity.is_none() {
        return Redirect::to("/login?return_url=/startups/new").into_response();
    }

    render_form(&auth, &StartupForm::default(), None)
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_startup(
    State(backend): State<Backend>,
    auth: AuthContext,
    multipart: Multipart,
) -> AppResult<Response> {
    let form = read_form(multipart).await?;

    let Some(owner) = &auth.identity else {
        return Ok(render_form(&auth, &form, Some(&StartupFormError::NotLoggedIn)));
    };

    match publish(&backend, owner, &form).await {
        Ok(_) => Ok(Redirect::to("/startups").into_response()),
        Err(e) => {
            if let StartupFormError::Failed(cause) = &e {
                warn!("listing {} failed: {cause}", form.name);
            }
            Ok(render_form(&auth, &form, Some(&e)))
        }
    }
}
