use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{
        header::{HeaderName, CONTENT_TYPE},
        HeaderMap, HeaderValue, Method, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pushnode_shared::Token;
use pushnode_store::{NodeStore, StoreError};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::dispatcher::{Delivery, RelayDispatcher};
use crate::error::RelayError;
use crate::node::Node;
use crate::params::SendParams;
use crate::registrar::{Registrar, DEVICE_SIGN_HEADER, USER_SIGN_HEADER};

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub node: Arc<Node>,
    pub store: Arc<dyn NodeStore>,
    pub registrar: Arc<Registrar>,
    pub dispatcher: Arc<RelayDispatcher>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/rest/v1/info", get(node_info))
        .route("/rest/v1/bind-user", post(bind_user))
        .route("/rest/v1/unbind-user", post(unbind_user))
        .route("/rest/v1/push-token", post(update_push_token))
        .route("/v1/sender", post(sender_post))
        .route("/v1/sender/:token", get(sender_get).post(sender_post_token))
        .route("/v1/sender/:token/:msg", get(sender_get_text))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    health: bool,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        health: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn not_found() -> RelayError {
    RelayError::NotFound
}

async fn node_info(State(state): State<AppState>) -> Result<Response, RelayError> {
    let (body, signature) = state.node.signed_info()?;
    Ok((
        [
            (CONTENT_TYPE, "application/json; charset=utf-8".to_string()),
            (HeaderName::from_static("chsign-node"), signature),
        ],
        body,
    )
        .into_response())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn bind_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RelayError> {
    let response = state.registrar.bind_user(
        &body,
        header_str(&headers, USER_SIGN_HEADER),
        header_str(&headers, DEVICE_SIGN_HEADER),
    )?;
    Ok(Json(response).into_response())
}

async fn unbind_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RelayError> {
    let ack = state
        .registrar
        .unbind_user(&body, header_str(&headers, USER_SIGN_HEADER))?;
    Ok(Json(ack).into_response())
}

async fn update_push_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RelayError> {
    let ack = state.registrar.update_push_token(
        &body,
        header_str(&headers, USER_SIGN_HEADER),
        header_str(&headers, DEVICE_SIGN_HEADER),
    )?;
    Ok(Json(ack).into_response())
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

async fn sender_get(
    State(state): State<AppState>,
    Path(token): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, RelayError> {
    let params = collect_params(&headers, &uri, Some(&token), None, &[])?;
    send(&state, params, uri.path()).await
}

async fn sender_get_text(
    State(state): State<AppState>,
    Path((token, text)): Path<(String, String)>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, RelayError> {
    let params = collect_params(&headers, &uri, Some(&token), Some(&text), &[])?;
    send(&state, params, uri.path()).await
}

async fn sender_post(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RelayError> {
    let params = collect_params(&headers, &uri, None, None, &body)?;
    send(&state, params, uri.path()).await
}

async fn sender_post_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RelayError> {
    let params = collect_params(&headers, &uri, Some(&token), None, &body)?;
    send(&state, params, uri.path()).await
}

/// Token lookup order: `token` header, query, path, body.
fn collect_params(
    headers: &HeaderMap,
    uri: &Uri,
    path_token: Option<&str>,
    path_text: Option<&str>,
    body: &[u8],
) -> Result<SendParams, RelayError> {
    let mut params = SendParams::default();
    if let Some(token) = header_str(headers, "token") {
        params.set_token(token);
    }
    if let Some(text) = path_text {
        params.text = text.to_string();
    }
    if let Some(query) = uri.query() {
        params.merge_query(query);
    }
    if let Some(token) = path_token {
        params.set_token(token);
    }
    params.merge_body(header_str(headers, CONTENT_TYPE.as_str()), body)?;
    Ok(params)
}

async fn send(state: &AppState, params: SendParams, path: &str) -> Result<Response, RelayError> {
    let raw = params.token.as_deref().ok_or(RelayError::InvalidToken)?;
    let mut lookup_err = None;
    let verified = Token::verify(raw, |uid| match state.store.get_user(uid) {
        Ok(user) => Some(user),
        Err(StoreError::NotFound) => None,
        Err(e) => {
            warn!(%uid, error = %e, "user lookup failed");
            lookup_err = Some(e);
            None
        }
    });
    if let Some(e) = lookup_err {
        return Err(RelayError::Store(e));
    }
    let (token, user) = verified?;
    if !token.data_hash().is_empty() && !token.verify_data_hash(path) {
        debug!(uid = %user.uid, "token scoped to another path");
        return Err(RelayError::InvalidToken);
    }

    let message = params.to_message(&token, &state.config.limits)?;
    match state.dispatcher.dispatch(&token, message, &user).await? {
        Delivery::Pushed { request_id, .. } => {
            Ok(Json(json!({ "request-uid": request_id.to_string() })).into_response())
        }
        Delivery::Forwarded(forwarded) => {
            let status = StatusCode::from_u16(forwarded.status).unwrap_or(StatusCode::BAD_GATEWAY);
            let mut response = (status, forwarded.body).into_response();
            match forwarded
                .content_type
                .and_then(|ct| HeaderValue::from_str(&ct).ok())
            {
                Some(content_type) => {
                    response.headers_mut().insert(CONTENT_TYPE, content_type);
                }
                None => {
                    response.headers_mut().remove(CONTENT_TYPE);
                }
            }
            Ok(response)
        }
    }
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::PushClients;
    use crate::node::features;
    use crate::pusher::{Notification, PushError, Pusher};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use pushnode_shared::constants::USER_ID_CODE;
    use pushnode_shared::identity::format_device_id;
    use pushnode_shared::protocol::TokenPayload;
    use pushnode_shared::types::{decode_b64url, encode_b64url};
    use pushnode_shared::{PublicKey, SecretKey, UserSecret};
    use pushnode_store::{Database, Device, User};
    use sha1::{Digest, Sha1};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    #[derive(Default)]
    struct CountingPusher {
        count: AtomicUsize,
    }

    #[async_trait]
    impl Pusher for CountingPusher {
        async fn push(&self, _notification: &Notification) -> Result<(), PushError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Every call fails the way an unreachable database would.
    struct BrokenStore;

    fn broken<T>() -> pushnode_store::Result<T> {
        Err(StoreError::Io(std::io::Error::other("disk unavailable")))
    }

    impl NodeStore for BrokenStore {
        fn get_option(&self, _key: &str) -> pushnode_store::Result<Option<Vec<u8>>> {
            broken()
        }
        fn insert_option_if_absent(&self, _key: &str, _value: &[u8]) -> pushnode_store::Result<Vec<u8>> {
            broken()
        }
        fn get_user(&self, _uid: &str) -> pushnode_store::Result<User> {
            broken()
        }
        fn upsert_user(&self, _user: &User) -> pushnode_store::Result<()> {
            broken()
        }
        fn bind_device(&self, _: &str, _: &str, _: &[u8], _: i32) -> pushnode_store::Result<()> {
            broken()
        }
        fn unbind_device(&self, _uid: &str, _uuid: &str) -> pushnode_store::Result<()> {
            broken()
        }
        fn update_push_token(&self, _: &str, _: &str, _: &[u8], _: bool) -> pushnode_store::Result<()> {
            broken()
        }
        fn get_device_key(&self, _uuid: &str) -> pushnode_store::Result<Vec<u8>> {
            broken()
        }
        fn get_devices(&self, _uid: &str) -> pushnode_store::Result<Vec<Device>> {
            broken()
        }
    }

    struct TestNode {
        _dir: Option<tempfile::TempDir>,
        app: Router,
        node: Arc<Node>,
        pusher: Arc<CountingPusher>,
    }

    fn test_node() -> TestNode {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("api.db")).unwrap();
        node_with_store(Some(dir), Arc::new(db))
    }

    fn node_with_store(dir: Option<tempfile::TempDir>, store: Arc<dyn NodeStore>) -> TestNode {
        let config = ServerConfig::default();

        let node = Arc::new(Node::new(
            SecretKey::generate(),
            &config.name,
            &config.endpoint,
            features(config.registerable, store.stores_devices()),
        ));
        let pusher = Arc::new(CountingPusher::default());
        let clients = PushClients {
            production: pusher.clone(),
            sandbox: pusher.clone(),
            topic: "net.chanify.ios".into(),
        };
        let state = AppState {
            node: node.clone(),
            store: store.clone(),
            registrar: Arc::new(Registrar::new(store.clone(), true, Vec::new())),
            dispatcher: Arc::new(RelayDispatcher::new(
                node.id().to_string(),
                store,
                Some(clients),
                None,
            )),
            config: Arc::new(config),
        };
        TestNode {
            _dir: dir,
            app: build_router(state),
            node,
            pusher,
        }
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, body.to_vec())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    /// Bind a fresh user with one device and return a sender token for it.
    async fn register(node: &TestNode, data_hash: Vec<u8>) -> String {
        let user_key = SecretKey::generate();
        let uid = user_key.public_key().to_id(USER_ID_CODE);
        let device_key = SecretKey::generate();
        let uuid = format_device_id(&device_key.public_key().to_bytes());

        let body = serde_json::to_vec(&json!({
            "nonce": 1,
            "user": { "uid": uid, "key": user_key.public_key().to_base64() },
            "device": {
                "uuid": uuid,
                "key": device_key.public_key().to_base64(),
                "token": "3q2-7w",
            },
        }))
        .unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/rest/v1/bind-user")
            .header("content-type", "application/json")
            .header(USER_SIGN_HEADER, encode_b64url(&user_key.sign(&body)))
            .header(DEVICE_SIGN_HEADER, encode_b64url(&device_key.sign(&body)))
            .body(Body::from(body))
            .unwrap();
        let (status, _, body) = call(&node.app, request).await;
        assert_eq!(status, StatusCode::OK);

        let reply: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply["uid"], uid.as_str());
        assert_eq!(reply["uuid"], uuid.as_str());
        let sealed = decode_b64url(reply["key"].as_str().unwrap()).unwrap();
        let secret = UserSecret::from_slice(&user_key.decrypt(&sealed).unwrap()).unwrap();

        Token::issue(
            &TokenPayload {
                expires: 4_102_444_800,
                user_id: uid,
                node_id: node.node.id().to_string(),
                data_hash,
                ..Default::default()
            },
            &secret,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let node = test_node();
        let (status, _, body) = call(&node.app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        let reply: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply["health"], true);
    }

    #[tokio::test]
    async fn test_info_is_signed() {
        let node = test_node();
        let (status, headers, body) = call(&node.app, get("/rest/v1/info")).await;
        assert_eq!(status, StatusCode::OK);

        let doc: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(doc["nodeid"], node.node.id());
        let pubkey = PublicKey::from_base64(doc["pubkey"].as_str().unwrap()).unwrap();
        let signature = headers.get("CHSign-Node").unwrap().to_str().unwrap();
        assert!(pubkey.verify(&body, &decode_b64url(signature).unwrap()));
    }

    #[tokio::test]
    async fn test_bind_then_send_by_path() {
        let node = test_node();
        let token = register(&node, Vec::new()).await;

        let (status, _, body) =
            call(&node.app, get(&format!("/v1/sender/{token}/hello%20world"))).await;
        assert_eq!(status, StatusCode::OK);
        let reply: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(reply["request-uid"].as_str().is_some());
        assert_eq!(node.pusher.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_json_body_with_header_token() {
        let node = test_node();
        let token = register(&node, Vec::new()).await;

        let request = Request::builder()
            .method("POST")
            .uri("/v1/sender")
            .header("token", token)
            .header("content-type", "application/json")
            .body(Body::from(r#"{"title":"T","text":"from json"}"#))
            .unwrap();
        let (status, _, _) = call(&node.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(node.pusher.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_without_content() {
        let node = test_node();
        let token = register(&node, Vec::new()).await;

        let (status, _, body) = call(&node.app, get(&format!("/v1/sender/{token}"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let reply: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply["res"], 400);
        assert_eq!(node.pusher.count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_token_rejected() {
        let node = test_node();
        let (status, _, body) = call(&node.app, get("/v1/sender/garbage/hello")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let reply: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply["res"], 401);
    }

    #[tokio::test]
    async fn test_scoped_token_only_opens_its_path() {
        let node = test_node();
        let path = "/v1/sender/scoped/hi";
        let token = register(&node, Sha1::digest(path.as_bytes()).to_vec()).await;

        let request = Request::builder()
            .method("POST")
            .uri(format!("/v1/sender/{token}"))
            .header("content-type", "text/plain")
            .body(Body::from("elsewhere"))
            .unwrap();
        let (status, _, _) = call(&node.app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(node.pusher.count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_not_an_auth_failure() {
        let node = node_with_store(None, Arc::new(BrokenStore));
        let token = Token::issue(
            &TokenPayload {
                expires: 4_102_444_800,
                user_id: SecretKey::generate().public_key().to_id(USER_ID_CODE),
                node_id: node.node.id().to_string(),
                ..Default::default()
            },
            &UserSecret::new([3; 64]),
        )
        .unwrap();

        let (status, _, body) = call(&node.app, get(&format!("/v1/sender/{token}/hello"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let reply: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply["res"], 500);
        assert_eq!(node.pusher.count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let node = test_node();
        let (status, _, body) = call(&node.app, get("/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let reply: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply["msg"], "not found");
    }
}
