//! Test client helpers.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use blogcache_core::{CacheKey, ManualClock};
use blogcache_engine::CacheManager;
use blogcache_server::metrics::test_handle;
use blogcache_server::{AppState, StaticContentSource, create_router};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

/// Helper para tests de integracion HTTP.
pub struct TestClient {
    app: Router,
}

impl TestClient {
    pub fn new(app: Router) -> Self {
        Self { app }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send("GET", uri, None, Vec::new()).await
    }

    /// GET con headers personalizados.
    pub async fn get_with_headers(&self, uri: &str, headers: Vec<(&str, &str)>) -> TestResponse {
        self.send("GET", uri, None, headers).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.send("POST", uri, Some(body), Vec::new()).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> TestResponse {
        self.send("PUT", uri, Some(body), Vec::new()).await
    }

    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.send("DELETE", uri, None, Vec::new()).await
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        headers: Vec<(&str, &str)>,
    ) -> TestResponse {
        let mut builder = Request::builder().uri(uri).method(method);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");

        TestResponse::from_response(response).await
    }
}

/// Wrapper sobre Response con helpers para assertions.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    async fn from_response(response: Response<Body>) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes()
            .to_vec();

        Self {
            status,
            headers,
            body,
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.clone()).expect("Body is not valid UTF-8")
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("Failed to parse JSON")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Verifica que el status sea el esperado.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {}. Body: {}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    pub fn assert_header_exists(&self, name: &str) -> &Self {
        assert!(
            self.headers.contains_key(name),
            "Expected header '{}' to exist",
            name
        );
        self
    }

    pub fn assert_header(&self, name: &str, expected: &str) -> &Self {
        let value = self
            .header(name)
            .unwrap_or_else(|| panic!("Header '{}' not found", name));

        assert_eq!(
            value, expected,
            "Expected header '{}' to be '{}' but got '{}'",
            name, expected, value
        );
        self
    }
}

/// Router, cliente y manager compartido.
pub struct TestApp {
    pub client: TestClient,
    pub manager: Arc<CacheManager>,
}

/// App sin fuente de contenido.
pub fn app() -> TestApp {
    build(CacheManager::builder().build().unwrap())
}

/// App sin fuente de contenido con un reloj controlado por el test.
pub fn app_with_clock(clock: Arc<ManualClock>) -> TestApp {
    build(CacheManager::builder().clock(clock).build().unwrap())
}

/// App sobre posts estaticos `intro`, `guide` y `tips`.
pub fn app_with_posts() -> TestApp {
    let source = StaticContentSource::from_documents([
        post("intro", "2024-01-01T00:00:00Z", "Design"),
        post("guide", "2024-02-01T00:00:00Z", "Design"),
        post("tips", "2024-03-01T00:00:00Z", "Marketing"),
    ]);
    build(
        CacheManager::builder()
            .source(Arc::new(source))
            .build()
            .unwrap(),
    )
}

fn build(manager: CacheManager) -> TestApp {
    let manager = Arc::new(manager);
    let state = AppState::new(Arc::clone(&manager)).with_prometheus(test_handle());
    TestApp {
        client: TestClient::new(create_router(state)),
        manager,
    }
}

fn post(slug: &str, published_at: &str, category: &str) -> Value {
    json!({
        "post": {
            "slug": slug,
            "title": format!("Post {slug}"),
            "excerpt": "",
            "content": "",
            "publishedAt": published_at,
            "category": category,
        }
    })
}

/// URI de una entrada con la clave codificada.
pub fn entry_uri(key: &CacheKey) -> String {
    format!("/cache/entries/{}", urlencoding::encode(key.as_str()))
}
