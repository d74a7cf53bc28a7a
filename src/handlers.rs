use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

use crate::error::FileServerError;
use crate::listing::build_listing;
use crate::paths::{join_path, resolve_and_verify_path};
use crate::request::RequestInfo;
use crate::theme::ThemeAsset;
use crate::upload::handle_upload;
use crate::AppState;

/// Name of the file served in place of a directory listing.
const INDEX_FILE: &str = "index.html";

/// Request path suffix redirected to the bare directory URL.
const INDEX_PAGE: &str = "/index.html";

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Entry point for every request: files, listings, theme assets and uploads.
pub async fn serve(State(state): State<AppState>, request: Request) -> Response {
    let info = RequestInfo::new(request.method(), request.uri());

    match dispatch(&state, &info, request).await {
        Ok(response) => response,
        Err(err) => render_error(&state, &info, err).await,
    }
}

async fn dispatch(
    state: &AppState,
    info: &RequestInfo,
    request: Request,
) -> Result<Response, FileServerError> {
    if info.path.ends_with(INDEX_PAGE) {
        // The raw path may spell `index.html` with escapes; keep everything up
        // to its last slash.
        let cut = info.raw_path.rfind('/').unwrap_or(0);
        let target = &info.raw_path[..=cut];
        return Ok(moved_permanently(info.with_query(target.to_string())));
    }

    let resolved = match resolve_and_verify_path(&state.root_dir, &info.cleaned) {
        Ok(path) => fs::metadata(&path)
            .await
            .map(|metadata| (path, metadata))
            .map_err(|err| FileServerError::from_io(err, &info.cleaned)),
        Err(err) => Err(err),
    };

    let (path, metadata) = match resolved {
        Ok(found) => found,
        Err(err) => {
            let theme = state.theme.clone();
            let name = info.cleaned.clone();
            return match blocking(move || theme.open_asset(&name)).await {
                Ok(asset) => Ok(serve_asset(info, request.headers(), asset)),
                Err(asset_err) => {
                    debug!("No theme asset for {}: {}", info.cleaned, asset_err);
                    Err(err)
                }
            };
        }
    };

    if metadata.is_dir() {
        if !info.path.ends_with('/') {
            return Ok(moved_permanently(info.with_query(format!("{}/", info.raw_path))));
        }

        if info.method == Method::POST {
            handle_upload(state, info, request, path).await?;
            return Ok(see_other(&info.raw_path));
        }

        if let Some((index_path, index_metadata)) = index_file(state, info).await {
            return serve_file(info, request.headers(), &index_path, &index_metadata).await;
        }

        return render_directory(state, info, path).await;
    }

    if info.path.ends_with('/') {
        let target = info.raw_path.trim_end_matches('/');
        return Ok(moved_permanently(info.with_query(target.to_string())));
    }

    if info.method == Method::POST {
        return Err(FileServerError::NotADirectory);
    }

    serve_file(info, request.headers(), &path, &metadata).await
}

/// The directory's `index.html`, when it exists and is a regular file.
async fn index_file(state: &AppState, info: &RequestInfo) -> Option<(PathBuf, std::fs::Metadata)> {
    let name = join_path(&info.cleaned, INDEX_FILE);
    let path = resolve_and_verify_path(&state.root_dir, &name).ok()?;
    let metadata = fs::metadata(&path).await.ok()?;
    metadata.is_file().then_some((path, metadata))
}

async fn render_directory(
    state: &AppState,
    info: &RequestInfo,
    dir: PathBuf,
) -> Result<Response, FileServerError> {
    let root = state.root_dir.clone();
    let theme = state.theme.clone();
    let request = info.clone();

    let html = blocking(move || {
        let listing = build_listing(&root, &request, &dir)?;
        theme.render(&listing)
    })
    .await?;

    Ok(html_response(StatusCode::OK, html))
}

async fn render_error(state: &AppState, info: &RequestInfo, err: FileServerError) -> Response {
    debug!("{} {}: {}", info.method, info.path, err);

    let theme = state.theme.clone();
    let request = info.clone();
    let rendered = tokio::task::spawn_blocking(move || {
        let rendered = theme.render_error(&request, &err);
        if rendered.status.is_server_error() {
            error!("{} {}: {}", request.method, request.path, err);
        }
        rendered
    })
    .await;

    match rendered {
        Ok(page) => html_response(page.status, page.html),
        Err(join_err) => {
            error!("Error page rendering panicked: {}", join_err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Stream a file from disk with conditional GET support.
async fn serve_file(
    info: &RequestInfo,
    headers: &HeaderMap,
    path: &Path,
    metadata: &std::fs::Metadata,
) -> Result<Response, FileServerError> {
    let modified = metadata.modified().ok();
    if not_modified(info, headers, modified) {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    debug!("Streaming file: {}", path.display());

    let file = fs::File::open(path)
        .await
        .map_err(|err| FileServerError::from_io(err, &info.cleaned))?;
    let body = Body::from_stream(ReaderStream::new(file));

    Ok(content_response(path, metadata.len(), modified, body))
}

fn serve_asset(info: &RequestInfo, headers: &HeaderMap, asset: ThemeAsset) -> Response {
    if not_modified(info, headers, asset.modified) {
        return StatusCode::NOT_MODIFIED.into_response();
    }

    let len = asset.contents.len() as u64;
    let body = Body::from(asset.contents.into_owned());
    content_response(Path::new(&asset.name), len, asset.modified, body)
}

fn content_response(name: &Path, len: u64, modified: Option<SystemTime>, body: Body) -> Response {
    let mime = mime_guess::from_path(name)
        .first_or_octet_stream()
        .to_string();

    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        body,
    )
        .into_response();

    if let Some(modified) = modified.filter(|m| has_meaningful_time(*m)) {
        if let Ok(value) = httpdate::fmt_http_date(modified).parse() {
            response.headers_mut().insert(header::LAST_MODIFIED, value);
        }
    }

    response
}

/// Whether `If-Modified-Since` lets us answer 304. Times compare at
/// one-second granularity since HTTP dates carry no fractions.
fn not_modified(info: &RequestInfo, headers: &HeaderMap, modified: Option<SystemTime>) -> bool {
    if info.method != Method::GET && info.method != Method::HEAD {
        return false;
    }

    let Some(modified) = modified.filter(|m| has_meaningful_time(*m)) else {
        return false;
    };
    let Some(since) = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| httpdate::parse_http_date(value).ok())
    else {
        return false;
    };

    unix_secs(modified) <= unix_secs(since)
}

fn has_meaningful_time(time: SystemTime) -> bool {
    time > UNIX_EPOCH
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn html_response(status: StatusCode, html: String) -> Response {
    (status, [(header::CONTENT_TYPE, HTML_CONTENT_TYPE)], html).into_response()
}

fn moved_permanently(location: String) -> Response {
    debug!("Redirecting to {}", location);
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
}

fn see_other(location: &str) -> Response {
    (StatusCode::SEE_OTHER, [(header::LOCATION, location.to_string())]).into_response()
}

/// Run filesystem and rendering work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T, FileServerError>
where
    F: FnOnce() -> Result<T, FileServerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| FileServerError::Io(std::io::Error::other(err)))?
}
