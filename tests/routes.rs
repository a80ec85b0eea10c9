use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use linkal::{app, config::Config, AppState};
use tower::ServiceExt;

async fn test_app() -> Router {
    let config = Config {
        port: 0,
        database_url: "sqlite::memory:".to_owned(),
        blob_dir: std::env::temp_dir().join(format!("linkal-routes-{}", uuid::Uuid::now_v7().simple())),
        public_url: "http://localhost".to_owned(),
        google: None,
        session_minutes: 60,
        upload_limit_bytes: 1024 * 1024,
    };

    app(AppState::new(config).await.unwrap())
}

async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn location(response: &Response) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

fn session_cookie(response: &Response) -> String {
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_owned()
}

#[tokio::test]
async fn empty_directory_renders() {
    let response = test_app().await.oneshot(get("/startups")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let html = body_text(response).await;
    assert!(html.contains("No startups found."));
    assert!(html.contains("Real Estate"));
}

#[tokio::test]
async fn unknown_pages_are_not_found() {
    let app = test_app().await;

    let response = app.clone().oneshot(get("/startups/does-not-exist")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("that startup doesn"));

    let response = app.oneshot(get("/nowhere")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn signed_out_visitors_are_sent_to_login() {
    let app = test_app().await;

    let response = app.clone().oneshot(get("/profile")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?return_url=/profile");

    let response = app.oneshot(get("/startups/new")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?return_url=/startups/new");
}

#[tokio::test]
async fn stylesheet_is_served_as_css() {
    let response = test_app().await.oneshot(get("/style.css")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
}

#[tokio::test]
async fn login_page_hides_google_without_keys() {
    let response = test_app().await.oneshot(get("/login")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!body_text(response).await.contains("Sign in with Google"));
}

#[tokio::test]
async fn bad_credentials_show_the_form_again() {
    let request = Request::post("/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("email=nobody%40example.com&password=nope"))
        .unwrap();

    let response = test_app().await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_text(response).await.contains("Failed to log in. Please check your credentials."));
}

#[tokio::test]
async fn signup_signs_in_and_opens_the_profile() {
    let app = test_app().await;

    let request = Request::post("/signup")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("username=alice1&email=alice%40example.com&password=hunter22"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let cookie = session_cookie(&response);

    let request = Request::get("/profile").header(header::COOKIE, &cookie).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("alice@example.com"));
    assert!(html.contains("You haven't added any startups yet."));

    let request = Request::post("/signup")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("username=alice1&email=other%40example.com&password=pw"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_text(response).await.contains("Username already exists. Please choose another one."));
}

fn multipart(boundary: &str, fields: &[(&str, Option<&str>, &str)]) -> Body {
    let mut body = String::new();
    for (name, file_name, value) in fields {
        body += &format!("--{boundary}\r\n");
        match file_name {
            Some(file_name) => {
                body += &format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n");
                body += "Content-Type: image/png\r\n\r\n";
            }
            None => body += &format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"),
        }
        body.push_str(value);
        body.push_str("\r\n");
    }
    body += &format!("--{boundary}--\r\n");
    Body::from(body)
}

#[tokio::test]
async fn cover_only_listing_shows_just_the_cover() {
    let app = test_app().await;

    let request = Request::post("/signup")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("username=olga&email=olga%40example.com&password=pw"))
        .unwrap();
    let cookie = session_cookie(&app.clone().oneshot(request).await.unwrap());

    let boundary = "linkal-boundary";
    let request = Request::post("/startups/new")
        .header(header::COOKIE, &cookie)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(multipart(boundary, &[
            ("profile_picture", Some("me.png"), "png bytes"),
            ("images", Some(""), ""),
            ("name", None, "Anvil Works"),
            ("description", None, "We make anvils"),
            ("category", None, "Technology"),
            ("social_github", None, "https://github.com/anvil"),
        ]))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/startups");

    let html = body_text(app.clone().oneshot(get("/startups")).await.unwrap()).await;
    assert_eq!(html.matches(r#"<img class="cover""#).count(), 1);
    let (_, rest) = html.split_once(r#"class="card" href="/startups/"#).unwrap();
    let id = &rest[..rest.find('"').unwrap()];

    let response = app.clone().oneshot(get(&format!("/startups/{id}"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains(r#"src="/blobs/startups/"#));
    assert_eq!(html.matches(r#"<img class="cover""#).count(), 1);
    assert!(html.contains(r#"<div class="gallery"></div>"#));

    let blob_path = html.split_once(r#"<img class="cover" src=""#).unwrap().1;
    let blob_path = &blob_path[..blob_path.find('"').unwrap()];
    let response = app.oneshot(get(blob_path)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "png bytes");
}
