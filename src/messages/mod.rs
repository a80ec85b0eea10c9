//! Messages between users and startups.
//!
//! There is no stored conversation entity: a conversation is the pair
//! (account, startup) and every message carries that pair's id, which is
//! what live views subscribe on.

mod conversation;
mod inbox;
mod msg;
mod store;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use store::{ConversationKey, ConversationSummary, Message, MessageError, MessageStore, MESSAGES};

/// Mounted under `/startups`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/conversation", get(conversation::conversation).post(conversation::send_message))
        .route("/{id}/conversation/ws", get(ws::conversation_ws))
        .route("/{id}/inbox", get(inbox::inbox))
}
