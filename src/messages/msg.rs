use serde::Serialize;
use time::{format_description::BorrowedFormatItem, macros::format_description, OffsetDateTime};

use crate::{include_res, res};

use super::store::Message;

/// What the conversation socket pushes to the browser.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum Frame {
    Snapshot { html: String },
    Error { message: String },
}

impl Frame {
    pub(crate) fn snapshot(messages: &[Message], viewer_id: &str) -> Self {
        Frame::Snapshot { html: render_messages(messages, viewer_id) }
    }

    pub(crate) fn to_json(&self) -> String {
        // a struct of strings always serializes
        serde_json::to_string(self).unwrap_or_default()
    }
}

const TIMESTAMP: &[BorrowedFormatItem] = format_description!("[year]-[month]-[day] [hour]:[minute] UTC");

fn timestamp(millis: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
        .ok()
        .and_then(|at| at.format(TIMESTAMP).ok())
        .unwrap_or_default()
}

pub(crate) fn msg_to_html(message: &Message, viewer_id: &str) -> String {
    let side = if message.sender_id == viewer_id { "mine" } else { "theirs" };

    res::Template::new(include_res!(str, "/pages/messages/message.html"))
        .with("side", side)
        .with("id", &res::escape(&message.id))
        .with("time", &timestamp(message.created_at))
        .with("content", &res::render_markdown(&message.content))
        .render()
}

pub(crate) fn render_messages(messages: &[Message], viewer_id: &str) -> String {
    if messages.is_empty() {
        return r#"<p class="muted">No messages yet.</p>"#.to_owned();
    }
    messages.iter().map(|m| msg_to_html(m, viewer_id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(sender: &str, content: &str) -> Message {
        Message {
            id: "m1".into(),
            sender_id: sender.into(),
            receiver_id: "other".into(),
            conversation_id: "a:s".into(),
            content: content.into(),
            created_at: 0,
            is_visible_to_sender: true,
        }
    }

    #[test]
    fn sides_and_escaping() {
        let html = msg_to_html(&message("a", "<b>hi</b>"), "a");
        assert!(html.contains("mine"));
        assert!(html.contains("&lt;b&gt;"));
        assert!(html.contains("1970-01-01 00:00 UTC"));

        let html = msg_to_html(&message("s", "hi"), "a");
        assert!(html.contains("theirs"));
    }

    #[test]
    fn timestamps_are_minutes_in_utc() {
        assert_eq!(timestamp(0), "1970-01-01 00:00 UTC");
        assert_eq!(timestamp(1_700_000_000_000), "2023-11-14 22:13 UTC");
    }

    #[test]
    fn placeholders_in_messages_stay_literal() {
        let html = msg_to_html(&message("a", "my draft is {content} and {side}"), "a");
        assert!(html.contains("my draft is {content} and {side}"));
    }

    #[test]
    fn frames_are_tagged() {
        let json = Frame::Error { message: "nope".into() }.to_json();
        assert_eq!(json, r#"{"kind":"error","message":"nope"}"#);
        assert!(Frame::snapshot(&[], "a").to_json().contains("No messages yet."));
    }
}
