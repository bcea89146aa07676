use std::path::PathBuf;

use axum::{
    body::Body,
    extract::{multipart::Field, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use tokio::{fs::File, io::AsyncWriteExt};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::api::middleware::AuthUser;
use crate::api::state::AppState;
use crate::api::validation;
use crate::db::resources::{NewResource, ResourceChanges, ResourceFilter, StoredFile};
use crate::db::{Resource, ResourceRepository, ResourceType};
use crate::error::AppError;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
pub struct ListResourcesQuery {
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: Option<ResourceType>,
    pub search: Option<String>,
    #[serde(default)]
    pub include_unpublished: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateResourceRequest {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub resource_type: ResourceType,
    pub url: Option<String>,
    #[serde(default = "default_published")]
    pub is_published: bool,
}

fn default_published() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct UpdateResourceRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub resource_type: Option<ResourceType>,
    pub url: Option<String>,
    pub is_published: Option<bool>,
}

fn needs_url(resource_type: ResourceType) -> bool {
    matches!(resource_type, ResourceType::Link | ResourceType::Video)
}

fn validate_url(url: Option<&str>) -> Result<Option<String>, AppError> {
    let url = validation::optional_text("url", url, 2048)?;
    match url {
        Some(u) if !(u.starts_with("http://") || u.starts_with("https://")) => Err(
            AppError::Validation("url must start with http:// or https://".to_string()),
        ),
        other => Ok(other),
    }
}

/// Keep only characters that are safe inside a quoted header parameter
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect();

    if cleaned.trim().is_empty() {
        "download".to_string()
    } else {
        cleaned.trim().to_string()
    }
}

fn stored_path(state: &AppState, stored_name: &str) -> PathBuf {
    let mut path = PathBuf::from(&state.config.upload_dir);
    path.push(stored_name);
    path
}

async fn remove_stored_file(state: &AppState, stored_name: &str) {
    let path = stored_path(state, stored_name);
    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::warn!(path = %path.display(), "failed to remove stored file: {}", e);
    }
}

async fn load(state: &AppState, id: i64) -> Result<Resource, AppError> {
    ResourceRepository::get_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Resource not found".to_string()))
}

/// Load a resource the caller may modify (creator or admin)
async fn load_owned(state: &AppState, auth: &AuthUser, id: i64) -> Result<Resource, AppError> {
    let resource = load(state, id).await?;
    if auth.is_admin() || resource.created_by == Some(auth.user_id) {
        Ok(resource)
    } else {
        Err(AppError::Forbidden("Only the creator can modify this resource".to_string()))
    }
}

/// Unpublished resources are hidden from patients
fn check_visible(auth: &AuthUser, resource: &Resource) -> Result<(), AppError> {
    if resource.is_published || !auth.is_patient() {
        Ok(())
    } else {
        Err(AppError::NotFound("Resource not found".to_string()))
    }
}

/// GET /api/resources
pub async fn list_resources(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ListResourcesQuery>,
) -> Result<Json<Vec<Resource>>, AppError> {
    let filter = ResourceFilter {
        category: query
            .category
            .filter(|c| !c.trim().is_empty())
            .map(|c| c.trim().to_lowercase()),
        resource_type: query.resource_type,
        search: query.search.filter(|s| !s.trim().is_empty()),
        include_unpublished: query.include_unpublished && !auth.is_patient(),
    };

    let resources = ResourceRepository::list(&state.db, &filter).await?;
    Ok(Json(resources))
}

/// POST /api/resources (provider or admin)
pub async fn create_resource(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateResourceRequest>,
) -> Result<(StatusCode, Json<Resource>), AppError> {
    if !auth.is_admin() && !auth.is_provider() {
        return Err(AppError::Forbidden("Only providers and admins can add resources".to_string()));
    }

    let url = validate_url(req.url.as_deref())?;
    if needs_url(req.resource_type) && url.is_none() {
        return Err(AppError::Validation("This resource type requires a url".to_string()));
    }

    let resource = ResourceRepository::create(
        &state.db,
        NewResource {
            title: validation::required_text("title", &req.title, 200)?,
            description: validation::optional_text("description", req.description.as_deref(), 5000)?,
            category: validation::required_text("category", &req.category, 50)?.to_lowercase(),
            resource_type: req.resource_type,
            url,
            created_by: auth.user_id,
            is_published: req.is_published,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(resource)))
}

/// GET /api/resources/:id
pub async fn get_resource(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<Resource>, AppError> {
    let resource = load(&state, id).await?;
    check_visible(&auth, &resource)?;
    Ok(Json(resource))
}

/// PUT /api/resources/:id (creator or admin)
pub async fn update_resource(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateResourceRequest>,
) -> Result<Json<Resource>, AppError> {
    let existing = load_owned(&state, &auth, id).await?;

    // A blank description or url clears it
    let url = req.url.as_deref().map(|u| validate_url(Some(u))).transpose()?;
    let resource_type = req.resource_type.unwrap_or(existing.resource_type);
    let url_after = match &url {
        Some(u) => u.is_some(),
        None => existing.url.is_some(),
    };
    if needs_url(resource_type) && !url_after && existing.stored_name.is_none() {
        return Err(AppError::Validation("This resource type requires a url".to_string()));
    }

    let changes = ResourceChanges {
        title: req
            .title
            .as_deref()
            .map(|t| validation::required_text("title", t, 200))
            .transpose()?,
        description: req
            .description
            .as_deref()
            .map(|d| validation::optional_text("description", Some(d), 5000))
            .transpose()?,
        category: req
            .category
            .as_deref()
            .map(|c| validation::required_text("category", c, 50).map(|c| c.to_lowercase()))
            .transpose()?,
        resource_type: req.resource_type,
        url,
        is_published: req.is_published,
    };

    let resource = ResourceRepository::update(&state.db, id, changes)
        .await?
        .ok_or_else(|| AppError::NotFound("Resource not found".to_string()))?;

    Ok(Json(resource))
}

/// DELETE /api/resources/:id (creator or admin)
pub async fn delete_resource(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let resource = load_owned(&state, &auth, id).await?;

    ResourceRepository::delete(&state.db, id).await?;
    if let Some(stored_name) = resource.stored_name.as_deref() {
        remove_stored_file(&state, stored_name).await;
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Stream a multipart field to `path`, failing once it passes `limit` bytes
async fn write_field(
    field: &mut Field<'_>,
    path: &std::path::Path,
    limit: usize,
) -> Result<usize, AppError> {
    let mut file = File::create(path).await?;
    let mut written: usize = 0;

    while let Some(chunk) = field.chunk().await? {
        written += chunk.len();
        if written > limit {
            return Err(AppError::Validation(format!(
                "File exceeds the {} byte limit",
                limit
            )));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    Ok(written)
}

/// POST /api/resources/:id/file (creator or admin), multipart field `file`
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<Resource>, AppError> {
    let existing = load_owned(&state, &auth, id).await?;

    let mut stored: Option<StoredFile> = None;
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = sanitize_file_name(field.file_name().unwrap_or("upload"));
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let stored_name = match file_name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
                format!("{}.{}", Uuid::new_v4(), ext.to_lowercase())
            }
            _ => Uuid::new_v4().to_string(),
        };

        tokio::fs::create_dir_all(&state.config.upload_dir).await?;
        let path = stored_path(&state, &stored_name);
        let written = match write_field(&mut field, &path, state.config.max_upload_bytes).await {
            Ok(written) => written,
            Err(e) => {
                remove_stored_file(&state, &stored_name).await;
                return Err(e);
            }
        };

        stored = Some(StoredFile {
            file_name,
            stored_name,
            content_type,
            file_size: written as i64,
        });
        break;
    }

    let stored = stored.ok_or_else(|| AppError::Validation("Missing multipart field 'file'".to_string()))?;

    let resource = match ResourceRepository::attach_file(&state.db, id, &stored).await {
        Ok(resource) => resource,
        Err(e) => {
            remove_stored_file(&state, &stored.stored_name).await;
            return Err(e);
        }
    };
    if let Some(previous) = existing.stored_name.as_deref() {
        remove_stored_file(&state, previous).await;
    }

    tracing::info!(
        resource_id = id,
        bytes = stored.file_size,
        "resource file uploaded"
    );

    Ok(Json(resource))
}

/// GET /api/resources/:id/download
pub async fn download_file(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let resource = load(&state, id).await?;
    check_visible(&auth, &resource)?;

    let stored_name = resource
        .stored_name
        .as_deref()
        .ok_or_else(|| AppError::NotFound("Resource has no file".to_string()))?;

    let file = match File::open(stored_path(&state, stored_name)).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(resource_id = id, "stored file missing on disk");
            return Err(AppError::NotFound("Resource file not found".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let content_type = resource
        .content_type
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
    let disposition = format!(
        "attachment; filename=\"{}\"",
        sanitize_file_name(resource.file_name.as_deref().unwrap_or("download"))
    );

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    ))
}
