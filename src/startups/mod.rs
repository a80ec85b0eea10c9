pub mod directory;
pub mod new;
mod page;

use std::{collections::BTreeMap, fmt, str::FromStr};

use axum::{routing::{get, post}, Router};
use serde::{Deserialize, Serialize};

use tracing::warn;

use crate::{backend::{Backend, BackendError, OrderBy, Predicate, Record}, AppState};

pub const STARTUPS: &str = "startups";

pub const SOCIAL_PLATFORMS: [&str; 9] = [
    "facebook", "twitter", "linkedin", "instagram", "github",
    "youtube", "tiktok", "website", "googleMaps",
];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(directory::directory))
        .route("/new", get(new::new_startup_page).post(new::new_startup))
        .route("/{id}", get(page::startup))
        .route("/{id}/delete", post(page::delete_startup))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Technology,
    Health,
    Finance,
    Education,
    Social,
    Travel,
    #[serde(rename = "E-commerce")]
    ECommerce,
    #[serde(rename = "Real Estate")]
    RealEstate,
    Entertainment,
    SaaS,
    Website,
    AI,
    Others,
}

impl Category {
    pub const ALL: [Category; 13] = [
        Category::Technology, Category::Health, Category::Finance, Category::Education,
        Category::Social, Category::Travel, Category::ECommerce, Category::RealEstate,
        Category::Entertainment, Category::SaaS, Category::Website, Category::AI,
        Category::Others,
    ];

    pub fn label(&self) -> &'static str {
        use Category::*;
        match self {
            Technology => "Technology",
            Health => "Health",
            Finance => "Finance",
            Education => "Education",
            Social => "Social",
            Travel => "Travel",
            ECommerce => "E-commerce",
            RealEstate => "Real Estate",
            Entertainment => "Entertainment",
            SaaS => "SaaS",
            Website => "Website",
            AI => "AI",
            Others => "Others",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.label() == s)
            .ok_or(format!("unknown category {s:?}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Startup {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: Category,
    /// Cover first.
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub social_links: BTreeMap<String, String>,
    pub created_by: String,
    #[serde(default)]
    pub creator_display_name: String,
    pub created_at: i64,
}

impl Startup {
    pub fn cover(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    pub fn gallery(&self) -> &[String] {
        self.images.get(1..).unwrap_or_default()
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.created_by == user_id
    }
}

pub async fn get_startup(backend: &Backend, id: &str) -> Result<Option<Startup>, BackendError> {
    backend.get_record(STARTUPS, id).await?.map(|r| r.decode()).transpose()
}

/// Every listing, newest first.
pub async fn list_startups(backend: &Backend) -> Result<Vec<Startup>, BackendError> {
    let records = backend.query_records(STARTUPS, &[], Some(&OrderBy::desc("createdAt"))).await?;
    Ok(decode_all(records))
}

pub async fn startups_by_owner(backend: &Backend, user_id: &str) -> Result<Vec<Startup>, BackendError> {
    let records = backend
        .query_records(STARTUPS, &[Predicate::eq("createdBy", user_id)], Some(&OrderBy::desc("createdAt")))
        .await?;
    Ok(decode_all(records))
}

/// Listings that fail to decode are logged and skipped.
fn decode_all(records: Vec<Record>) -> Vec<Startup> {
    records
        .iter()
        .filter_map(|record| match record.decode::<Startup>() {
            Ok(startup) => Some(startup),
            Err(e) => {
                warn!("skipping startup {}: {e}", record.id);
                None
            }
        })
        .collect()
}
