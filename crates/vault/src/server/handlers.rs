//! Axum request handlers for all service endpoints.

use std::{fmt::Write as _, time::Instant};

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, Query, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::BytesMut;
use common::{
    protocol::{FileActionResponse, HealthResponse, ImageMeta},
    ServiceError,
};
use rand::seq::SliceRandom;
use serde::Deserialize;
use tracing::{error, info, warn};

use super::{error::ApiError, state::AppState};
use crate::index::Orientation;
use crate::storage::{paths, StoredFile};

/// Body of `GET /`.
pub const BANNER: &str = "WISS";

/// Multipart field that carries the uploaded image.
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub filename: Option<String>,
    #[serde(default)]
    pub path: String,
    pub stream: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RandomQuery {
    #[serde(default)]
    pub path: String,
    pub ratio: Option<String>,
    pub meta: Option<String>,
    pub stream: Option<String>,
}

fn flag(value: &Option<String>) -> bool {
    value.as_deref() == Some("1")
}

/// `GET /`: plain-text banner.
pub async fn banner() -> &'static str {
    BANNER
}

/// `GET /health`: liveness plus index reachability.
///
/// Returns `503` with status `"degraded"` only when an index is configured
/// and does not answer; a missing index is not a fault.
pub async fn health(State(state): State<AppState>) -> Response {
    let index_configured = state.index.is_some();
    let index_reachable = match &state.index {
        Some(index) => match index.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "index ping failed");
                false
            }
        },
        None => false,
    };

    let (status_code, status_str) = if index_configured && !index_reachable {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    } else {
        (StatusCode::OK, "ok")
    };

    let body = HealthResponse {
        status: status_str.into(),
        index_configured,
        index_reachable,
    };
    (status_code, Json(body)).into_response()
}

/// `POST|PUT /images?path=`: encrypt and store the multipart `file` field.
///
/// A part without a filename is stored under the current local time,
/// `YYYY-MM-DD HH:MM:SS.png`. An existing file of the same name is replaced.
pub async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<FileActionResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| ServiceError::BadRequest(e.body_text()))?;
    let dir = paths::relative_dir(&query.path)?;

    let started = Instant::now();
    let (name, data) = loop {
        let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? else {
            return Err(ServiceError::BadRequest("missing file part".into()).into());
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_owned();
        let mut buf = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            buf.extend_from_slice(&chunk);
        }
        break (name, buf.freeze());
    };
    let read_ms = started.elapsed().as_millis() as u64;

    let name = if name.is_empty() {
        default_filename()
    } else {
        name
    };
    let file = StoredFile {
        dir,
        filename: paths::file_name(&name)?.to_owned(),
    };

    let key = state.key.clone();
    let size = data.len();
    let started = Instant::now();
    let envelope = tokio::task::spawn_blocking(move || key.seal(&data))
        .await?
        .map_err(|e| {
            error!(error = %e, "envelope seal failed");
            ServiceError::Internal("encryption failed".into())
        })?;
    let encrypt_ms = started.elapsed().as_millis() as u64;

    state.store.save(&file, &envelope).await?;
    info!(
        path = %file.dir_slash(),
        filename = %file.filename,
        bytes = size,
        read_ms,
        encrypt_ms,
        "image stored"
    );
    Ok(Json(FileActionResponse::saved(file.filename)))
}

/// `GET /images?filename=&path=&stream=`: decrypt and return one file.
pub async fn fetch(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> Result<Response, ApiError> {
    let file = locate(&query.path, query.filename.as_deref())?;
    let plaintext = open_stored(&state, &file).await?;
    Ok(deliver(&file.filename, plaintext, flag(&query.stream)))
}

/// `DELETE /images?filename=&path=`: remove one file.
pub async fn delete(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> Result<Json<FileActionResponse>, ApiError> {
    let file = locate(&query.path, query.filename.as_deref())?;
    state.store.remove(&file).await?;
    info!(path = %file.dir_slash(), filename = %file.filename, "image deleted");
    Ok(Json(FileActionResponse::deleted(file.filename)))
}

/// `GET /images/random`: pick one stored image.
///
/// With a non-empty `ratio` the pick comes from the index, filtered by orientation;
/// otherwise it is uniform over every file under `path`. `meta=1` returns
/// the location instead of the content.
pub async fn random(
    State(state): State<AppState>,
    Query(query): Query<RandomQuery>,
) -> Result<Response, ApiError> {
    let file = match query.ratio.as_deref().filter(|r| !r.is_empty()) {
        Some(ratio) => indexed_pick(&state, Orientation::parse(ratio)).await?,
        None => listed_pick(&state, &query.path).await?,
    };

    if flag(&query.meta) {
        let meta = ImageMeta::new(file.dir_slash(), file.filename);
        return Ok(Json(meta).into_response());
    }
    let plaintext = open_stored(&state, &file).await?;
    Ok(deliver(&file.filename, plaintext, flag(&query.stream)))
}

/// `GET /get_image/*fullpath`: unauthenticated inline link to one image.
///
/// `fullpath` must name at least a directory and a file.
pub async fn public_image(
    State(state): State<AppState>,
    Path(fullpath): Path<String>,
) -> Result<Response, ApiError> {
    let normalized = fullpath.replace('\\', "/");
    let Some((dir, filename)) = normalized.trim_matches('/').rsplit_once('/') else {
        return Err(ServiceError::BadRequest("expected <path>/<filename>".into()).into());
    };
    let file = StoredFile::parse(dir, filename)?;
    let plaintext = open_stored(&state, &file).await?;
    Ok(deliver(&file.filename, plaintext, true))
}

/// Catch-all 404 handler.
pub async fn not_found() -> ApiError {
    ApiError(ServiceError::NotFound(
        "the requested resource does not exist".into(),
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn locate(path: &str, filename: Option<&str>) -> Result<StoredFile, ApiError> {
    let filename = filename
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ServiceError::BadRequest("missing filename parameter".into()))?;
    Ok(StoredFile::parse(path, filename)?)
}

async fn indexed_pick(state: &AppState, orientation: Orientation) -> Result<StoredFile, ApiError> {
    let index = state
        .index
        .as_ref()
        .ok_or_else(|| ServiceError::Unavailable("image index not configured".into()))?;

    let row = index
        .random(orientation)
        .await
        .map_err(|e| {
            error!(error = %e, "index lookup failed");
            ServiceError::Internal("index lookup failed".into())
        })?
        .ok_or_else(|| ServiceError::NotFound("no indexed image matches".into()))?;

    let file = StoredFile::parse(&row.filepath, &row.filename).map_err(|e| {
        warn!(error = %e, "index row does not name a storable file");
        ServiceError::Internal("index returned an unusable path".into())
    })?;
    if !state.store.exists(&file).await? {
        return Err(ServiceError::NotFound(format!(
            "indexed file missing: {}",
            ImageMeta::new(file.dir_slash(), file.filename).fullpath
        ))
        .into());
    }
    Ok(file)
}

async fn listed_pick(state: &AppState, path: &str) -> Result<StoredFile, ApiError> {
    let dir = paths::relative_dir(path)?;
    let files = state.store.list_recursive(&dir).await?;
    files
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| ServiceError::NotFound("no files".into()).into())
}

/// Load and decrypt one stored envelope.
///
/// Any failure to open the envelope is reported as an opaque
/// [`ServiceError::DecryptionFailed`]; the cause is only logged.
async fn open_stored(state: &AppState, file: &StoredFile) -> Result<Vec<u8>, ApiError> {
    let envelope = state.store.load(file).await?;
    let key = state.key.clone();
    tokio::task::spawn_blocking(move || key.open(&envelope))
        .await?
        .map_err(|e| {
            warn!(filename = %file.filename, error = %e, "stored envelope rejected");
            ApiError(ServiceError::DecryptionFailed)
        })
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::PayloadTooLarge(e.body_text()).into()
    } else {
        ServiceError::BadRequest(e.body_text()).into()
    }
}

fn default_filename() -> String {
    chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S.png")
        .to_string()
}

/// Render decrypted bytes either inline as PNG or as a download.
pub fn deliver(filename: &str, body: Vec<u8>, inline: bool) -> Response {
    if inline {
        return ([(header::CONTENT_TYPE, HeaderValue::from_static("image/png"))], body)
            .into_response();
    }
    (
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, content_disposition(filename)),
        ],
        body,
    )
        .into_response()
}

/// `attachment` disposition with an ASCII fallback name and, when the name
/// needs it, an RFC 5987 `filename*` parameter.
fn content_disposition(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut value = format!("attachment; filename=\"{fallback}\"");
    if fallback != filename {
        value.push_str("; filename*=UTF-8''");
        for b in filename.bytes() {
            if b.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&b) {
                value.push(char::from(b));
            } else {
                let _ = write!(value, "%{b:02X}");
            }
        }
    }
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
