//! REST endpoints for login, refresh, logout and identity lookup
//!
//! Every response, including rejections, passes through
//! [`add_security_headers`] so credentials are never cached.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::header::{AUTHORIZATION, COOKIE, RETRY_AFTER, SET_COOKIE};
use warp::http::{HeaderMap, HeaderValue, StatusCode};
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::auth::principal::{ClientMetadata, Credential, Identity};
use crate::auth::service::AuthService;
use crate::auth::token::extract_bearer_token;
use crate::config::AuthConfig;
use crate::constants::AUTH_PATH;
use crate::core::ip_extractor::ClientIpResolver;
use crate::error::RustyGuardError;
use crate::security::headers::add_security_headers;

/// Upper bound on request bodies accepted by the JSON endpoints
const MAX_BODY_BYTES: u64 = 16 * 1024;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    /// Username or email
    pub identifier: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
struct MessageBody {
    message: &'static str,
}

/// `Set-Cookie` value carrying a new session token
pub fn session_cookie(config: &AuthConfig, token: &str) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        config.session_cookie_name,
        token,
        config.session_ttl.as_secs()
    );
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the session cookie
pub fn clear_session_cookie(config: &AuthConfig) -> String {
    let mut cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0",
        config.session_cookie_name
    );
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn session_token_from_cookies(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == cookie_name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Credentials presented with a request, bearer token first
pub fn extract_credentials(headers: &HeaderMap, cookie_name: &str) -> Vec<Credential> {
    let mut credentials = Vec::new();
    if let Some(token) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
    {
        credentials.push(Credential::Bearer(token));
    }
    if let Some(token) = session_token_from_cookies(headers, cookie_name) {
        credentials.push(Credential::Session(token));
    }
    credentials
}

fn set_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(e) => log::error!("Failed to encode session cookie: {}", e),
    }
}

/// Render a service error as `{message}` with the matching status
pub fn error_response(err: &RustyGuardError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        log::error!("Request failed: {}", err);
    } else {
        log::debug!("Request rejected: {}", err);
    }

    let retry_after_seconds = match err {
        RustyGuardError::Throttled { retry_after } => Some(retry_after.as_secs().max(1)),
        _ => None,
    };
    let body = ErrorBody {
        message: err.public_message(),
        retry_after_seconds,
    };
    let mut response = warp::reply::with_status(warp::reply::json(&body), status).into_response();
    if let Some(seconds) = retry_after_seconds {
        response.headers_mut().insert(RETRY_AFTER, HeaderValue::from(seconds));
    }
    response
}

fn with_service(service: Arc<AuthService>) -> impl Filter<Extract = (Arc<AuthService>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&service))
}

fn with_client_metadata(
    resolver: Arc<ClientIpResolver>,
) -> impl Filter<Extract = (ClientMetadata,), Error = Infallible> + Clone {
    warp::header::headers_cloned()
        .and(warp::addr::remote())
        .map(move |headers: HeaderMap, remote: Option<SocketAddr>| resolver.client_metadata(&headers, remote))
}

fn with_credentials(cookie_name: Arc<str>) -> impl Filter<Extract = (Vec<Credential>,), Error = Infallible> + Clone {
    warp::header::headers_cloned().map(move |headers: HeaderMap| extract_credentials(&headers, &cookie_name))
}

fn json_body<T: serde::de::DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn auth_route(segment: &'static str) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::path(AUTH_PATH).and(warp::path(segment)).and(warp::path::end())
}

async fn register_handler(request: RegisterRequest, service: Arc<AuthService>) -> Result<Response, Infallible> {
    let response = match service
        .register(&request.username, &request.email, &request.password, BTreeSet::new())
        .await
    {
        Ok(user) => {
            log::info!("Registered user {} ({})", user.username, user.id);
            let identity = Identity {
                id: user.id,
                username: user.username,
                roles: user.roles,
            };
            warp::reply::with_status(warp::reply::json(&identity), StatusCode::CREATED).into_response()
        }
        Err(e) => error_response(&e),
    };
    Ok(response)
}

async fn login_handler(
    request: LoginRequest,
    metadata: ClientMetadata,
    service: Arc<AuthService>,
) -> Result<Response, Infallible> {
    let response = match service.login(&request.identifier, &request.password, metadata).await {
        Ok(result) => {
            let mut response = warp::reply::json(&result.tokens).into_response();
            set_cookie(&mut response, &session_cookie(service.config(), result.session.token.as_str()));
            response
        }
        Err(e) => error_response(&e),
    };
    Ok(response)
}

async fn refresh_handler(
    request: RefreshRequest,
    metadata: ClientMetadata,
    service: Arc<AuthService>,
) -> Result<Response, Infallible> {
    let response = match service.refresh(&request.refresh_token, &metadata).await {
        Ok(tokens) => warp::reply::json(&tokens).into_response(),
        Err(e) => error_response(&e),
    };
    Ok(response)
}

async fn logout_handler(
    credentials: Vec<Credential>,
    metadata: ClientMetadata,
    service: Arc<AuthService>,
) -> Result<Response, Infallible> {
    for credential in &credentials {
        if let Err(e) = service.logout(credential, &metadata).await {
            return Ok(error_response(&e));
        }
    }

    let mut response = warp::reply::json(&MessageBody { message: "Logged out" }).into_response();
    set_cookie(&mut response, &clear_session_cookie(service.config()));
    Ok(response)
}

async fn me_handler(credentials: Vec<Credential>, service: Arc<AuthService>) -> Result<Response, Infallible> {
    let Some(credential) = credentials.first() else {
        return Ok(error_response(&RustyGuardError::TokenInvalid));
    };
    let response = match service.me(credential).await {
        Ok(identity) => warp::reply::json(&identity).into_response(),
        Err(e) => error_response(&e),
    };
    Ok(response)
}

/// Map warp rejections (unknown route, bad body) to `{message}` responses
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        (StatusCode::BAD_REQUEST, "Malformed request body")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Unsupported media type")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        log::error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    let body = ErrorBody {
        message: message.to_string(),
        retry_after_seconds: None,
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), status).into_response())
}

/// All HTTP routes of the service
pub fn routes(service: Arc<AuthService>) -> impl Filter<Extract = (Response,), Error = Infallible> + Clone {
    let resolver = Arc::new(ClientIpResolver::from_config(service.config()));
    let cookie_name: Arc<str> = Arc::from(service.config().session_cookie_name.as_str());

    let register = auth_route("register")
        .and(warp::post())
        .and(json_body::<RegisterRequest>())
        .and(with_service(service.clone()))
        .and_then(register_handler);

    let login = auth_route("login")
        .and(warp::post())
        .and(json_body::<LoginRequest>())
        .and(with_client_metadata(resolver.clone()))
        .and(with_service(service.clone()))
        .and_then(login_handler);

    let refresh = auth_route("refresh")
        .and(warp::post())
        .and(json_body::<RefreshRequest>())
        .and(with_client_metadata(resolver.clone()))
        .and(with_service(service.clone()))
        .and_then(refresh_handler);

    let logout = auth_route("logout")
        .and(warp::post())
        .and(with_credentials(cookie_name.clone()))
        .and(with_client_metadata(resolver))
        .and(with_service(service.clone()))
        .and_then(logout_handler);

    let me = auth_route("me")
        .and(warp::get())
        .and(with_credentials(cookie_name))
        .and(with_service(service))
        .and_then(me_handler);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| "OK".into_response());

    register
        .or(login)
        .unify()
        .or(refresh)
        .unify()
        .or(logout)
        .unify()
        .or(me)
        .unify()
        .or(health)
        .unify()
        .recover(handle_rejection)
        .unify()
        .map(add_security_headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::system_clock;
    use crate::security_logger::AuditLogger;
    use serde_json::{json, Value};

    fn service() -> Arc<AuthService> {
        Arc::new(
            AuthService::in_memory(AuthConfig::for_testing(), Arc::new(AuditLogger::new(vec![])), system_clock())
                .unwrap(),
        )
    }

    fn body_json(response: &warp::http::Response<warp::hyper::body::Bytes>) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    async fn register_alice(service: &Arc<AuthService>) {
        service
            .register("alice", "alice@example.com", "Secret123!", BTreeSet::new())
            .await
            .unwrap();
    }

    #[test]
    fn test_session_cookie_attributes() {
        let mut config = AuthConfig::for_testing();
        let cookie = session_cookie(&config, "abc");
        assert_eq!(cookie, "rg_session=abc; Path=/; HttpOnly; SameSite=Strict; Max-Age=604800");

        config.cookie_secure = true;
        assert!(session_cookie(&config, "abc").ends_with("; Secure"));
        assert!(clear_session_cookie(&config).contains("Max-Age=0"));
    }

    #[test]
    fn test_extract_credentials_prefers_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; rg_session=tok123"));
        assert_eq!(extract_credentials(&headers, "rg_session"), vec![Credential::Session("tok123".to_string())]);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer jwt.value"));
        let credentials = extract_credentials(&headers, "rg_session");
        assert_eq!(credentials[0], Credential::Bearer("jwt.value".to_string()));
        assert_eq!(credentials.len(), 2);

        let mut empty = HeaderMap::new();
        empty.insert(COOKIE, HeaderValue::from_static("rg_session="));
        assert!(extract_credentials(&empty, "rg_session").is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let filter = routes(service());
        let response = warp::test::request().path("/health").reply(&filter).await;
        assert_eq!(response.status(), 200);
        assert_eq!(response.body().as_ref(), b"OK");
        assert_eq!(response.headers()["cache-control"], "no-store");
    }

    #[tokio::test]
    async fn test_register_then_conflict() {
        let filter = routes(service());
        let body = json!({"username": "alice", "email": "alice@example.com", "password": "Secret123!"});

        let created = warp::test::request()
            .method("POST")
            .path("/auth/register")
            .json(&body)
            .reply(&filter)
            .await;
        assert_eq!(created.status(), 201);
        assert_eq!(body_json(&created)["roles"], json!(["viewer"]));

        let duplicate = warp::test::request()
            .method("POST")
            .path("/auth/register")
            .json(&body)
            .reply(&filter)
            .await;
        assert_eq!(duplicate.status(), 409);
    }

    #[tokio::test]
    async fn test_login_sets_cookie_and_returns_tokens() {
        let service = service();
        register_alice(&service).await;
        let filter = routes(service);

        let response = warp::test::request()
            .method("POST")
            .path("/auth/login")
            .json(&json!({"identifier": "alice", "password": "Secret123!"}))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), 200);

        let body = body_json(&response);
        assert!(body["accessToken"].is_string());
        assert!(body["refreshToken"].is_string());
        assert_eq!(body["expiresIn"], 900);

        let cookie = response.headers()["set-cookie"].to_str().unwrap();
        assert!(cookie.starts_with("rg_session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(!cookie.contains("Secure"));
        assert_eq!(response.headers()["x-frame-options"], "DENY");
    }

    #[tokio::test]
    async fn test_login_failure_is_generic() {
        let service = service();
        register_alice(&service).await;
        let filter = routes(service);

        for identifier in ["alice", "nobody"] {
            let response = warp::test::request()
                .method("POST")
                .path("/auth/login")
                .json(&json!({"identifier": identifier, "password": "wrong-password"}))
                .reply(&filter)
                .await;
            assert_eq!(response.status(), 401);
            assert_eq!(body_json(&response), json!({"message": "Invalid credentials"}));
        }
    }

    #[tokio::test]
    async fn test_throttled_login_reports_retry_after() {
        let service = service();
        register_alice(&service).await;
        let filter = routes(service);

        let mut last = None;
        for _ in 0..6 {
            last = Some(
                warp::test::request()
                    .method("POST")
                    .path("/auth/login")
                    .json(&json!({"identifier": "alice", "password": "wrong-password"}))
                    .reply(&filter)
                    .await,
            );
        }
        let response = last.unwrap();
        assert_eq!(response.status(), 429);
        let retry: u64 = response.headers()["retry-after"].to_str().unwrap().parse().unwrap();
        assert!(retry >= 1);
        assert_eq!(body_json(&response)["retryAfterSeconds"], retry);
    }

    #[tokio::test]
    async fn test_me_logout_flow_with_cookie() {
        let service = service();
        register_alice(&service).await;
        let filter = routes(service);

        let login = warp::test::request()
            .method("POST")
            .path("/auth/login")
            .json(&json!({"identifier": "alice", "password": "Secret123!"}))
            .reply(&filter)
            .await;
        let set_cookie = login.headers()["set-cookie"].to_str().unwrap();
        let cookie = set_cookie.split(';').next().unwrap().to_string();
        let access = body_json(&login)["accessToken"].as_str().unwrap().to_string();

        let me = warp::test::request()
            .path("/auth/me")
            .header("authorization", format!("Bearer {}", access))
            .reply(&filter)
            .await;
        assert_eq!(me.status(), 200);
        assert_eq!(body_json(&me)["username"], "alice");

        let me_cookie = warp::test::request()
            .path("/auth/me")
            .header("cookie", cookie.as_str())
            .reply(&filter)
            .await;
        assert_eq!(me_cookie.status(), 200);

        for _ in 0..2 {
            let logout = warp::test::request()
                .method("POST")
                .path("/auth/logout")
                .header("cookie", cookie.as_str())
                .reply(&filter)
                .await;
            assert_eq!(logout.status(), 200);
            assert_eq!(body_json(&logout), json!({"message": "Logged out"}));
            assert!(logout.headers()["set-cookie"].to_str().unwrap().contains("Max-Age=0"));
        }

        let after = warp::test::request()
            .path("/auth/me")
            .header("cookie", cookie.as_str())
            .reply(&filter)
            .await;
        assert_eq!(after.status(), 401);
        assert_eq!(body_json(&after), json!({"message": "Invalid token"}));
    }

    #[tokio::test]
    async fn test_refresh_rotation_over_http() {
        let service = service();
        register_alice(&service).await;
        let filter = routes(service);

        let login = warp::test::request()
            .method("POST")
            .path("/auth/login")
            .json(&json!({"identifier": "alice@example.com", "password": "Secret123!"}))
            .reply(&filter)
            .await;
        let refresh_token = body_json(&login)["refreshToken"].as_str().unwrap().to_string();

        let rotated = warp::test::request()
            .method("POST")
            .path("/auth/refresh")
            .json(&json!({"refreshToken": refresh_token}))
            .reply(&filter)
            .await;
        assert_eq!(rotated.status(), 200);
        assert_ne!(body_json(&rotated)["refreshToken"], refresh_token.as_str());

        let replay = warp::test::request()
            .method("POST")
            .path("/auth/refresh")
            .json(&json!({"refreshToken": refresh_token}))
            .reply(&filter)
            .await;
        assert_eq!(replay.status(), 401);
    }

    #[tokio::test]
    async fn test_rejections_render_json() {
        let filter = routes(service());

        let missing = warp::test::request().path("/nowhere").reply(&filter).await;
        assert_eq!(missing.status(), 404);
        assert_eq!(body_json(&missing), json!({"message": "Not found"}));

        let malformed = warp::test::request()
            .method("POST")
            .path("/auth/login")
            .header("content-type", "application/json")
            .body("{not json")
            .reply(&filter)
            .await;
        assert_eq!(malformed.status(), 400);
        assert_eq!(malformed.headers()["cache-control"], "no-store");
    }
}
