//! File-level handlers: read, upload and options.
//!
//! These run after the request has been authorized. Paths passed in are
//! already cleaned and joined onto the data directory.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tokio::io::AsyncWriteExt;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{debug, error, warn};

use crate::config::BodyLimitPolicy;
use crate::digest;
use crate::errors::{ServerError, ALLOWED_METHODS};
use crate::AppState;

/// Custom `Digest` response header.
const DIGEST: &str = "digest";

/// Custom `Want-Digest` request header.
const WANT_DIGEST: &str = "want-digest";

// -- GET / HEAD ---------------------------------------------------------------

/// Serve `disk_path`, adding a `Digest` header when one was negotiated.
///
/// Regular files go to [`ServeFile`], which handles ranges, conditional
/// requests and content type. Directories are redirected to their
/// trailing-slash form, then answered with their `index.html` or a listing.
/// Anything else is a 404.
pub async fn get_file(
    state: Arc<AppState>,
    disk_path: PathBuf,
    req: Request<Body>,
) -> Result<Response, ServerError> {
    let meta = match tokio::fs::metadata(&disk_path).await {
        Ok(meta) => meta,
        Err(e) => {
            debug!("Cannot stat {}: {}", disk_path.display(), e);
            return Err(ServerError::NotFound);
        }
    };

    if meta.is_dir() {
        serve_directory(&state, &disk_path, req).await
    } else if meta.is_file() {
        Ok(serve_file(&state, &disk_path, req).await)
    } else {
        Err(ServerError::NotFound)
    }
}

async fn serve_file(state: &AppState, disk_path: &Path, req: Request<Body>) -> Response {
    let digest = file_digest(state, req.headers(), disk_path).await;

    let mut response = ServeFile::new(disk_path)
        .oneshot(req)
        .await
        .unwrap_or_else(|never| match never {})
        .into_response();

    if response.status().is_success() {
        if let Some(value) = digest {
            response.headers_mut().insert(DIGEST, value);
        }
    }
    response
}

async fn serve_directory(
    state: &AppState,
    disk_path: &Path,
    req: Request<Body>,
) -> Result<Response, ServerError> {
    let uri_path = req.uri().path();
    if !uri_path.ends_with('/') {
        let location = match req.uri().query() {
            Some(query) => format!("{uri_path}/?{query}"),
            None => format!("{uri_path}/"),
        };
        return Ok(
            (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response(),
        );
    }

    let index = disk_path.join("index.html");
    if tokio::fs::metadata(&index)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
    {
        return Ok(serve_file(state, &index, req).await);
    }

    let names = list_directory(disk_path).await.map_err(|source| {
        error!("Could not list {}: {}", disk_path.display(), source);
        ServerError::ReadDirectory {
            path: disk_path.to_path_buf(),
            source,
        }
    })?;

    let html = render_listing(&names);
    let length = HeaderValue::from(html.len());
    let body = if req.method() == Method::HEAD {
        Body::empty()
    } else {
        Body::from(html)
    };
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8")),
            (header::CONTENT_LENGTH, length),
        ],
        body,
    )
        .into_response())
}

/// Entry names sorted bytewise, directories suffixed with `/`.
async fn list_directory(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

/// Characters escaped in listing links. `/` is kept for directory entries.
const HREF: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b':')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

fn render_listing(names: &[String]) -> String {
    let mut html = String::from(
        "<!doctype html>\n<meta name=\"viewport\" content=\"width=device-width\">\n<pre>\n",
    );
    for name in names {
        let _ = writeln!(
            html,
            "<a href=\"{}\">{}</a>",
            utf8_percent_encode(name, HREF),
            escape_html(name)
        );
    }
    html.push_str("</pre>\n");
    html
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

// -- PUT ----------------------------------------------------------------------

/// Write the request body to `disk_path`, creating parent directories.
///
/// An existing file is truncated. Bodies are streamed straight to disk and
/// cut off at `storage.max_body_size`; a partial file is left behind when
/// that happens.
pub async fn put_file(
    state: Arc<AppState>,
    disk_path: PathBuf,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, ServerError> {
    if let Some(parent) = disk_path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|source| {
            error!("Could not create {}: {}", parent.display(), source);
            ServerError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            }
        })?;
    }

    let mut file = tokio::fs::File::create(&disk_path).await.map_err(|source| {
        error!("Could not create {}: {}", disk_path.display(), source);
        ServerError::CreateFile {
            path: disk_path.clone(),
            source,
        }
    })?;

    let limit = state.config.storage.max_body_size;
    let mut written: u64 = 0;
    let mut stream = body.into_data_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| write_error(&disk_path, e.into()))?;
        written += chunk.len() as u64;
        if written > limit {
            warn!(
                "Upload to {} exceeded {} bytes, stopping",
                disk_path.display(),
                limit
            );
            return Err(match state.config.storage.body_limit {
                BodyLimitPolicy::Truncate => write_error(
                    &disk_path,
                    anyhow::anyhow!("request body larger than {limit} bytes"),
                ),
                BodyLimitPolicy::Reject => ServerError::PayloadTooLarge {
                    size: written,
                    limit,
                },
            });
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| write_error(&disk_path, e.into()))?;
    }
    file.flush()
        .await
        .map_err(|e| write_error(&disk_path, e.into()))?;
    drop(file);

    debug!("Wrote {} bytes to {}", written, disk_path.display());

    let mut response = StatusCode::OK.into_response();
    if let Some(value) = file_digest(&state, headers, &disk_path).await {
        response.headers_mut().insert(DIGEST, value);
    }
    Ok(response)
}

fn write_error(path: &Path, source: anyhow::Error) -> ServerError {
    error!("Write to {} failed: {}", path.display(), source);
    ServerError::Write {
        path: path.to_path_buf(),
        source,
    }
}

// -- OPTIONS ------------------------------------------------------------------

/// List the supported methods.
pub fn options() -> Response {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ALLOW, ALLOWED_METHODS),
            (header::ACCEPT, ALLOWED_METHODS),
        ],
    )
        .into_response()
}

// -- Digest -------------------------------------------------------------------

/// Negotiate and compute the `Digest` header for `path` off the async
/// workers. Hashing failures are logged and produce no header.
async fn file_digest(state: &AppState, headers: &HeaderMap, path: &Path) -> Option<HeaderValue> {
    let want = headers
        .get(WANT_DIGEST)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let always = state.config.digest.always;
    if want.is_none() && !always {
        return None;
    }

    let target = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || {
        if always {
            digest::negotiate_or_fallback(want.as_deref(), &target).map(Some)
        } else {
            match want {
                Some(want) => digest::negotiate(&want, &target),
                None => Ok(None),
            }
        }
    })
    .await;

    match result {
        Ok(Ok(value)) => value.and_then(|v| HeaderValue::from_str(&v).ok()),
        Ok(Err(e)) => {
            debug!("No digest for {}: {}", path.display(), e);
            None
        }
        Err(e) => {
            warn!("Digest task for {} failed: {}", path.display(), e);
            None
        }
    }
}
