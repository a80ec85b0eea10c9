use axum::{debug_handler, http::{header, StatusCode}, response::{Html, IntoResponse, Response}};
use pulldown_cmark::{Event, Options, Parser};

use crate::{auth::AuthContext, AppResult};

#[macro_export]
macro_rules! include_res {
    (bytes, $p:expr) => {
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
    (str, $p:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
}

#[debug_handler]
pub async fn stylesheet() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css")], include_res!(str, "/style.css"))
}

pub fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Markdown to HTML. Inline HTML in the source comes out as literal text.
pub fn render_markdown(source: &str) -> String {
    let parser = Parser::new_ext(source, Options::ENABLE_STRIKETHROUGH)
        .map(|event| match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            _ => event,
        });

    let mut html_output = String::new();
    pulldown_cmark::html::push_html(&mut html_output, parser);
    html_output
}

/// A page template with `{name}` placeholders.
///
/// Filled in a single pass: text inserted for one placeholder is never
/// scanned for others, and unknown `{...}` runs are kept as written.
pub struct Template<'a> {
    source: &'a str,
    values: Vec<(&'a str, String)>,
}

impl<'a> Template<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source, values: Vec::new() }
    }

    pub fn with(mut self, name: &'a str, value: impl Into<String>) -> Self {
        self.values.push((name, value.into()));
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.source.len());
        let mut rest = self.source;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            let filled = after.find('}').and_then(|close| {
                let name = &after[..close];
                self.values
                    .iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, value)| (value, close))
            });

            match filled {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }

        out.push_str(rest);
        out
    }
}

fn nav(auth: &AuthContext) -> &'static str {
    if auth.identity.is_some() {
        include_res!(str, "/pages/nav_signed_in.html")
    } else {
        include_res!(str, "/pages/nav_signed_out.html")
    }
}

/// Wraps a page body in the site layout.
pub fn page(title: &str, auth: &AuthContext, body: &str) -> Html<String> {
    Html(
        Template::new(include_res!(str, "/pages/layout.html"))
            .with("title", &escape(title))
            .with("nav", nav(auth))
            .with("body", body)
            .render()
    )
}

/// A bare page for when there is no request context to render a full layout with.
pub fn fragment(message: &str) -> String {
    Template::new(include_res!(str, "/pages/fragment.html")).with("message", &escape(message)).render()
}

/// The "not found" state: `what` doesn't exist or isn't yours to see.
pub fn sorry(what: &str, auth: &AuthContext) -> AppResult<Response> {
    let body = Template::new(include_res!(str, "/pages/not_found.html")).with("what", &escape(what)).render();
    Ok((StatusCode::NOT_FOUND, page("Not found", auth, &body)).into_response())
}

/// Someone other than the owner tried to change `what`.
pub fn forbidden(what: &str, auth: &AuthContext) -> AppResult<Response> {
    let body = Template::new(include_res!(str, "/pages/forbidden.html"))
        .with("what", escape(what))
        .render();
    Ok((StatusCode::FORBIDDEN, page("Not allowed", auth, &body)).into_response())
}

#[debug_handler(state = crate::AppState)]
pub async fn not_found(auth: AuthContext) -> AppResult<Response> {
    sorry("page", &auth)
}

#[cfg(test)]
pub(crate) async fn text_of(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape(r#"<a href="x">Tom & 'Jerry'</a>"#), "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;");
    }

    #[test]
    fn inserted_text_is_not_filled_again() {
        let html = Template::new("<h1>{name}</h1><p>{description}</p><div>{actions}</div>")
            .with("name", "Acme {actions}")
            .with("description", "Use {socials} and {description}")
            .with("actions", "<button>Delete</button>")
            .render();
        assert_eq!(
            html,
            "<h1>Acme {actions}</h1><p>Use {socials} and {description}</p><div><button>Delete</button></div>"
        );
    }

    #[test]
    fn unknown_braces_are_kept() {
        let html = Template::new("() => { run(); } {name} {missing}").with("name", "x").render();
        assert_eq!(html, "() => { run(); } x {missing}");
    }

    #[test]
    fn markdown_keeps_formatting_but_not_html() {
        let html = render_markdown("**bold** <script>alert(1)</script>");
        assert!(html.contains("<strong>bold</strong>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
