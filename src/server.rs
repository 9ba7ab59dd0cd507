//! Axum router construction and request dispatch.
//!
//! There are no routes: every request goes through [`handle_request`],
//! which identifies the caller, checks the path against the account's
//! read or write patterns and then hands off to [`crate::handlers::file`].

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, DefaultBodyLimit, State},
    http::{header, HeaderMap, Method, Request},
    response::Response,
    Router,
};
use percent_encoding::percent_decode_str;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::auth::{acl, parse_basic_auth, Account, Auth};
use crate::config::BodyLimitPolicy;
use crate::errors::ServerError;
use crate::handlers::file;
use crate::AppState;

/// Build the axum [`Router`] serving the configured data directory.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let request_timeout = state.config.server.request_timeout;

    let mut router = Router::new()
        .fallback(handle_request)
        .with_state(state)
        // Bodies are streamed to disk and limited there.
        .layer(DefaultBodyLimit::disable());

    if request_timeout > 0 {
        router = router.layer(TimeoutLayer::new(Duration::from_secs(request_timeout)));
    }

    router.layer(TraceLayer::new_for_http())
}

/// Authorize-then-dispatch for a single request.
async fn handle_request(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
) -> Result<Response, ServerError> {
    let method = req.method().clone();
    let declared = content_length(req.headers());
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());

    info!(
        "{} {} length={} from {}",
        method,
        req.uri().path(),
        declared.map_or_else(|| "-".to_string(), |n| n.to_string()),
        remote
    );

    // -- Body-size guard --
    if state.config.storage.body_limit == BodyLimitPolicy::Reject {
        let limit = state.config.storage.max_body_size;
        if let Some(size) = declared.filter(|size| *size > limit) {
            warn!("Rejecting {} byte body from {} (limit {})", size, remote, limit);
            return Err(ServerError::PayloadTooLarge { size, limit });
        }
    }

    // -- Identify --
    let account = identify(&state.auth, req.headers()).await;

    let path = request_path(req.uri().path());
    let disk_path = resolve(&state.config.storage.data_dir, &path);

    // -- Authorize and execute --
    match method {
        Method::GET | Method::HEAD => {
            if !account.can_read(&path) {
                debug!("{} may not read {}", display_name(&account), path);
                return Err(ServerError::Unauthorized);
            }
            file::get_file(state, disk_path, req).await
        }
        Method::PUT => {
            if !account.can_write(&path) {
                debug!("{} may not write {}", display_name(&account), path);
                return Err(ServerError::Unauthorized);
            }
            let (parts, body) = req.into_parts();
            file::put_file(state, disk_path, &parts.headers, body).await
        }
        Method::OPTIONS => Ok(file::options()),
        _ => Err(ServerError::MethodNotAllowed),
    }
}

/// Resolve the caller's account from `Authorization: Basic`.
///
/// Anything short of a verified user (no header, another scheme, bad
/// encoding, unknown user, wrong password) falls back to the default
/// account. Password verification is CPU-bound and runs off the async
/// workers.
async fn identify(auth: &Auth, headers: &HeaderMap) -> Account {
    let credentials = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic_auth);

    let Some((username, password)) = credentials else {
        return auth.get_default();
    };

    let lookup = auth.clone();
    let user = username.clone();
    match tokio::task::spawn_blocking(move || lookup.get_account(&user, &password)).await {
        Ok(Ok(account)) => account,
        Ok(Err(e)) => {
            debug!("{} for user {}", e, username);
            auth.get_default()
        }
        Err(e) => {
            warn!("Credential check for {} failed: {}", username, e);
            auth.get_default()
        }
    }
}

/// Percent-decode and clean the URI path. The result is always rooted and
/// contains no `.` or `..` elements.
fn request_path(raw: &str) -> String {
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    acl::clean_path(&format!("/{decoded}"))
}

/// Join a cleaned request path onto the data directory.
fn resolve(data_dir: &str, path: &str) -> PathBuf {
    Path::new(data_dir).join(path.trim_start_matches('/'))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn display_name(account: &Account) -> &str {
    match account.name() {
        "" => "anonymous",
        name => name,
    }
}
