use sqlx::{Pool, Sqlite};

use crate::db::models::{Resource, ResourceType};
use crate::error::AppError;

pub struct NewResource {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub resource_type: ResourceType,
    pub url: Option<String>,
    pub created_by: i64,
    pub is_published: bool,
}

#[derive(Debug, Default)]
/// `None` leaves a field untouched; `Some(None)` clears a nullable one
pub struct ResourceChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub category: Option<String>,
    pub resource_type: Option<ResourceType>,
    pub url: Option<Option<String>>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Default)]
pub struct ResourceFilter {
    pub category: Option<String>,
    pub resource_type: Option<ResourceType>,
    pub search: Option<String>,
    pub include_unpublished: bool,
}

/// Metadata of a file saved to the upload directory
pub struct StoredFile {
    pub file_name: String,
    pub stored_name: String,
    pub content_type: String,
    pub file_size: i64,
}

pub struct ResourceRepository;

impl ResourceRepository {
    pub async fn create(pool: &Pool<Sqlite>, new: NewResource) -> Result<Resource, AppError> {
        let now = chrono::Utc::now().timestamp();

        let resource = sqlx::query_as::<_, Resource>(
            r#"
INSERT INTO resources (title, description, category, resource_type, url, created_by,
                       is_published, created_at, updated_at)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
RETURNING *
            "#,
        )
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.category)
        .bind(new.resource_type)
        .bind(&new.url)
        .bind(new.created_by)
        .bind(new.is_published)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await?;

        Ok(resource)
    }

    pub async fn get_by_id(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Resource>, AppError> {
        let resource = sqlx::query_as::<_, Resource>("SELECT * FROM resources WHERE resource_id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(resource)
    }

    pub async fn list(pool: &Pool<Sqlite>, filter: &ResourceFilter) -> Result<Vec<Resource>, AppError> {
        let pattern = filter.search.as_ref().map(|s| format!("%{}%", s.trim()));

        let resources = sqlx::query_as::<_, Resource>(
            r#"
SELECT * FROM resources
WHERE (is_published = 1 OR ?)
  AND (? IS NULL OR category = ?)
  AND (? IS NULL OR resource_type = ?)
  AND (? IS NULL OR title LIKE ? OR description LIKE ?)
ORDER BY created_at DESC, resource_id DESC
            "#,
        )
        .bind(filter.include_unpublished)
        .bind(&filter.category)
        .bind(&filter.category)
        .bind(filter.resource_type)
        .bind(filter.resource_type)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(pool)
        .await?;

        Ok(resources)
    }

    pub async fn update(
        pool: &Pool<Sqlite>,
        id: i64,
        changes: ResourceChanges,
    ) -> Result<Option<Resource>, AppError> {
        let resource = sqlx::query_as::<_, Resource>(
            r#"
UPDATE resources
SET title = COALESCE(?, title),
    description = CASE WHEN ? THEN ? ELSE description END,
    category = COALESCE(?, category),
    resource_type = COALESCE(?, resource_type),
    url = CASE WHEN ? THEN ? ELSE url END,
    is_published = COALESCE(?, is_published),
    updated_at = ?
WHERE resource_id = ?
RETURNING *
            "#,
        )
        .bind(&changes.title)
        .bind(changes.description.is_some())
        .bind(changes.description.flatten())
        .bind(&changes.category)
        .bind(changes.resource_type)
        .bind(changes.url.is_some())
        .bind(changes.url.flatten())
        .bind(changes.is_published)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(resource)
    }

    /// Point the resource at a newly stored file
    pub async fn attach_file(
        pool: &Pool<Sqlite>,
        id: i64,
        file: &StoredFile,
    ) -> Result<Resource, AppError> {
        let resource = sqlx::query_as::<_, Resource>(
            r#"
UPDATE resources
SET file_name = ?, stored_name = ?, content_type = ?, file_size = ?, updated_at = ?
WHERE resource_id = ?
RETURNING *
            "#,
        )
        .bind(&file.file_name)
        .bind(&file.stored_name)
        .bind(&file.content_type)
        .bind(file.file_size)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Resource not found".to_string()))?;

        Ok(resource)
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM resources WHERE resource_id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
