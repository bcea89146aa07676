use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::AuthUser;
use crate::api::state::AppState;
use crate::api::validation;
use crate::db::posts::NewPost;
use crate::db::{Comment, Post, PostRepository};
use crate::error::AppError;

const DEFAULT_CATEGORY: &str = "general";

#[derive(Debug, Deserialize)]
pub struct ListPostsQuery {
    pub category: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub liked: bool,
    pub likes: i64,
}

fn normalize_category(value: &str) -> Result<String, AppError> {
    Ok(validation::required_text("category", value, 50)?.to_lowercase())
}

/// Author of the post, or 404
async fn post_author(state: &AppState, id: i64) -> Result<i64, AppError> {
    PostRepository::author_of(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))
}

/// GET /api/community/posts
pub async fn list_posts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<Vec<Post>>, AppError> {
    let category = query
        .category
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .map(normalize_category)
        .transpose()?;
    let limit = query.limit.clamp(1, 100);
    let offset = query.offset.max(0);

    let posts = PostRepository::list(&state.db, auth.user_id, category.as_deref(), limit, offset)
        .await?
        .into_iter()
        .map(|post| post.for_viewer(auth.user_id))
        .collect();

    Ok(Json(posts))
}

/// POST /api/community/posts
pub async fn create_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    let title = validation::required_text("title", &req.title, 200)?;
    let content = validation::required_text("content", &req.content, 10_000)?;
    let category = normalize_category(req.category.as_deref().unwrap_or(DEFAULT_CATEGORY))?;

    let post = PostRepository::create(
        &state.db,
        NewPost {
            author_id: auth.user_id,
            title,
            content,
            category,
            is_anonymous: req.is_anonymous,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(post.for_viewer(auth.user_id))))
}

/// GET /api/community/posts/:id
pub async fn get_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<PostDetail>, AppError> {
    let post = PostRepository::get(&state.db, id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    let comments = PostRepository::list_comments(&state.db, id)
        .await?
        .into_iter()
        .map(|comment| comment.for_viewer(auth.user_id))
        .collect();

    Ok(Json(PostDetail {
        post: post.for_viewer(auth.user_id),
        comments,
    }))
}

/// PUT /api/community/posts/:id (author)
pub async fn update_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePostRequest>,
) -> Result<Json<Post>, AppError> {
    let author = post_author(&state, id).await?;
    if author != auth.user_id {
        return Err(AppError::Forbidden("Only the author can edit this post".to_string()));
    }

    let title = req
        .title
        .as_deref()
        .map(|t| validation::required_text("title", t, 200))
        .transpose()?;
    let content = req
        .content
        .as_deref()
        .map(|c| validation::required_text("content", c, 10_000))
        .transpose()?;
    let category = req.category.as_deref().map(normalize_category).transpose()?;

    PostRepository::update(
        &state.db,
        id,
        title.as_deref(),
        content.as_deref(),
        category.as_deref(),
    )
    .await?;

    let post = PostRepository::get(&state.db, id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    Ok(Json(post.for_viewer(auth.user_id)))
}

/// DELETE /api/community/posts/:id (author or admin)
pub async fn delete_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let author = post_author(&state, id).await?;
    if author != auth.user_id && !auth.is_admin() {
        return Err(AppError::Forbidden("Cannot delete another user's post".to_string()));
    }

    PostRepository::delete(&state.db, id).await?;
    if auth.is_admin() && author != auth.user_id {
        tracing::info!(admin_id = auth.user_id, post_id = id, "post removed by admin");
    }

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/community/posts/:id/comments
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let content = validation::required_text("content", &req.content, 5000)?;
    post_author(&state, id).await?;

    let comment =
        PostRepository::add_comment(&state.db, id, auth.user_id, &content, req.is_anonymous).await?;

    Ok((StatusCode::CREATED, Json(comment.for_viewer(auth.user_id))))
}

/// DELETE /api/community/comments/:id (author or admin)
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let author = PostRepository::comment_author(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

    if author != auth.user_id && !auth.is_admin() {
        return Err(AppError::Forbidden("Cannot delete another user's comment".to_string()));
    }

    PostRepository::delete_comment(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/community/posts/:id/like
pub async fn toggle_like(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<LikeResponse>, AppError> {
    post_author(&state, id).await?;

    let (liked, likes) = PostRepository::toggle_like(&state.db, id, auth.user_id).await?;
    Ok(Json(LikeResponse { liked, likes }))
}
