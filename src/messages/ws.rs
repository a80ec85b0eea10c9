use axum::{
    debug_handler,
    extract::{ws::Message as WsMessage, Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{auth::AuthContext, backend::Backend, AppResult, AppState};

use super::{conversation::{resolve, ConversationQuery}, msg::Frame, MessageError, MessageStore};

#[derive(Deserialize)]
pub(crate) struct SendMessageQuery {
    content: String,
    #[serde(default = "visible_by_default")]
    visible_to_sender: bool,
}

fn visible_by_default() -> bool {
    true
}

/// Live conversation: pushes the full visible conversation on every change
/// and accepts new messages as JSON frames. Closes when the viewer signs out.
#[debug_handler(state = AppState)]
pub(crate) async fn conversation_ws(
    Path(startup_id): Path<String>,
    Query(ConversationQuery { with }): Query<ConversationQuery>,
    State(backend): State<Backend>,
    State(messages): State<MessageStore>,
    auth: AuthContext,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let conversation = match resolve(&backend, &auth, &startup_id, with).await? {
        Ok(conversation) => conversation,
        Err(response) => return Ok(response),
    };
    let mut signed_in = auth.identities().subscribe_identity(auth.session()).await?;
    let Some(user_id) = auth.identity.map(|identity| identity.id) else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };

    let key = conversation.key;
    let viewer_id = conversation.viewer_id;

    Ok(ws.on_upgrade(async move |stream| {
        let mut feed = messages.subscribe(&key, &viewer_id);
        let (mut sender, mut receiver) = stream.split();
        let (errors_tx, mut errors_rx) = mpsc::channel::<MessageError>(8);

        let push_viewer = viewer_id.clone();
        let mut push_task = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    snapshot = feed.next() => match snapshot {
                        Some(snapshot) => Frame::snapshot(&snapshot, &push_viewer),
                        None => break,
                    },
                    error = errors_rx.recv() => match error {
                        Some(error) => Frame::Error { message: error.to_string() },
                        None => break,
                    },
                    identity = signed_in.next() => match identity {
                        Some(Some(identity)) if identity.id == user_id => continue,
                        _ => {
                            debug!("u/{user_id} left this session, closing conversation");
                            break;
                        }
                    },
                };

                if sender.send(WsMessage::Text(frame.to_json().into())).await.is_err() {
                    break;
                }
            }
            let _ = sender.close().await;
        });

        let mut recv_task = tokio::spawn(async move {
            while let Some(Ok(msg)) = receiver.next().await {
                let text = match msg {
                    WsMessage::Text(text) => text,
                    WsMessage::Close(_) => break,
                    _ => continue,
                };
                let Ok(SendMessageQuery { content, visible_to_sender }) = serde_json::from_str(text.as_str()) else {
                    continue;
                };

                if let Err(e) = messages.send(&key, &viewer_id, &content, visible_to_sender).await {
                    if let MessageError::Backend(cause) = &e {
                        warn!("send in {} failed: {cause}", key.id());
                    }
                    if errors_tx.send(e).await.is_err() {
                        break;
                    }
                }
            }
        });

        tokio::select! {
            _ = &mut push_task => recv_task.abort(),
            _ = &mut recv_task => push_task.abort(),
        };
    }))
}
