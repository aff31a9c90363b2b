#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use notewall::accounts::users;
use notewall::config::Config;
use notewall::db;
use notewall::db::models::User;
use notewall::routes;
use notewall::state::{AppState, DbPool};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "----notewall-test-boundary";

/// A full application over a throwaway data directory.
pub struct TestApp {
    pub router: Router,
    pub pool: DbPool,
    pub config: Config,
    pub dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let mut config = Config::default();
        config.database.path = Some(dir.path().join("notewall.db"));
        config.storage.path = Some(dir.path().join("uploads"));
        config.auth.bcrypt_cost = 4;
        adjust(&mut config);

        let pool = db::create_pool(&config.db_path()).expect("create pool");
        db::run_migrations(&pool).expect("migrations");
        let router = routes::app(AppState::new(pool.clone(), config.clone()));

        Self {
            router,
            pool,
            config,
            dir,
        }
    }

    pub fn browser(&self) -> Browser {
        Browser {
            router: self.router.clone(),
            cookie_name: self.config.auth.cookie_name.clone(),
            token: None,
        }
    }

    pub fn register(&self, username: &str, password: &str, is_superuser: bool) -> User {
        users::create_registered(&self.pool, username, password, is_superuser, 4)
            .expect("create user")
    }

    /// A browser already logged in as a fresh registered account.
    pub async fn logged_in(&self, username: &str, is_superuser: bool) -> (User, Browser) {
        let user = self.register(username, "password123", is_superuser);
        let mut browser = self.browser();
        let response = browser
            .post_form(
                "/accounts/login/",
                &[("username", username), ("password", "password123")],
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "login failed");
        (user, browser)
    }

    pub fn count(&self, sql: &str) -> i64 {
        let conn = self.pool.get().expect("conn");
        conn.query_row(sql, [], |row| row.get(0)).expect("count query")
    }

    pub fn guest_count(&self) -> i64 {
        self.count("SELECT COUNT(*) FROM users WHERE kind = 'guest'")
    }

    /// Create a board through the UI and return its id.
    pub async fn create_board(&self, browser: &mut Browser, title: &str, public: bool) -> i64 {
        let mut fields = vec![("title", title)];
        if public {
            fields.push(("is_public", "on"));
        }
        let response = browser.post_form("/collaboration/board/create/", &fields).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let conn = self.pool.get().expect("conn");
        conn.query_row(
            "SELECT id FROM boards WHERE title = ?1 ORDER BY id DESC LIMIT 1",
            [title],
            |row| row.get(0),
        )
        .expect("board id")
    }
}

pub struct FilePart<'a> {
    pub field: &'a str,
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub data: &'a [u8],
}

/// Sends requests through the router and keeps the session cookie between
/// them, like a browser would.
pub struct Browser {
    router: Router,
    cookie_name: String,
    pub token: Option<String>,
}

impl Browser {
    pub async fn get(&mut self, path: &str) -> Response<Body> {
        let request = self.request("GET", path, false).body(Body::empty()).unwrap();
        self.send(request).await
    }

    pub async fn ajax_get(&mut self, path: &str) -> Response<Body> {
        let request = self.request("GET", path, true).body(Body::empty()).unwrap();
        self.send(request).await
    }

    pub async fn post_form(&mut self, path: &str, fields: &[(&str, &str)]) -> Response<Body> {
        let request = self
            .request("POST", path, false)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(urlencode(fields)))
            .unwrap();
        self.send(request).await
    }

    pub async fn ajax_form(&mut self, path: &str, fields: &[(&str, &str)]) -> Response<Body> {
        let request = self
            .request("POST", path, true)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(urlencode(fields)))
            .unwrap();
        self.send(request).await
    }

    pub async fn ajax_multipart(
        &mut self,
        path: &str,
        fields: &[(&str, &str)],
        file: Option<FilePart<'_>>,
    ) -> Response<Body> {
        let request = self
            .request("POST", path, true)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(fields, file)))
            .unwrap();
        self.send(request).await
    }

    fn request(&self, method: &str, path: &str, ajax: bool) -> axum::http::request::Builder {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = &self.token {
            builder = builder.header(header::COOKIE, format!("{}={}", self.cookie_name, token));
        }
        if ajax {
            builder = builder.header("X-Requested-With", "XMLHttpRequest");
        }
        builder
    }

    async fn send(&mut self, request: Request<Body>) -> Response<Body> {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let prefix = format!("{}=", self.cookie_name);
        for value in response.headers().get_all(header::SET_COOKIE) {
            let Ok(value) = value.to_str() else { continue };
            if let Some(rest) = value.strip_prefix(&prefix) {
                let token = rest.split(';').next().unwrap_or_default();
                self.token = Some(token.to_string());
            }
        }
        response
    }
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn urlencode(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn encode_component(raw: &str) -> String {
    raw.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            b' ' => "+".to_string(),
            other => format!("%{other:02X}"),
        })
        .collect()
}

fn multipart_body(fields: &[(&str, &str)], file: Option<FilePart<'_>>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(file) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                file.field, file.file_name, file.content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(file.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
