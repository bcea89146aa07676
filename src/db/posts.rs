use sqlx::{Pool, Sqlite};

use crate::db::models::{Comment, Post};
use crate::error::AppError;

const POST_SELECT: &str = r#"
SELECT p.post_id, p.author_id, u.full_name AS author_name, p.title, p.content, p.category,
       p.is_anonymous,
       (SELECT COUNT(*) FROM post_comments c WHERE c.post_id = p.post_id) AS comment_count,
       (SELECT COUNT(*) FROM post_likes l WHERE l.post_id = p.post_id) AS like_count,
       EXISTS(SELECT 1 FROM post_likes l WHERE l.post_id = p.post_id AND l.user_id = ?) AS liked_by_me,
       p.created_at, p.updated_at
FROM community_posts p
JOIN users u ON u.user_id = p.author_id
"#;

const COMMENT_SELECT: &str = r#"
SELECT c.comment_id, c.post_id, c.author_id, u.full_name AS author_name, c.content,
       c.is_anonymous, c.created_at
FROM post_comments c
JOIN users u ON u.user_id = c.author_id
"#;

pub struct NewPost {
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub category: String,
    pub is_anonymous: bool,
}

pub struct PostRepository;

impl PostRepository {
    /// Newest first. Author fields are raw; callers apply `Post::for_viewer`.
    pub async fn list(
        pool: &Pool<Sqlite>,
        viewer_id: i64,
        category: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, AppError> {
        let sql = format!(
            r#"{}
WHERE (? IS NULL OR p.category = ?)
ORDER BY p.created_at DESC, p.post_id DESC
LIMIT ? OFFSET ?
            "#,
            POST_SELECT
        );

        let posts = sqlx::query_as::<_, Post>(&sql)
            .bind(viewer_id)
            .bind(category)
            .bind(category)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;

        Ok(posts)
    }

    pub async fn get(
        pool: &Pool<Sqlite>,
        id: i64,
        viewer_id: i64,
    ) -> Result<Option<Post>, AppError> {
        let sql = format!("{} WHERE p.post_id = ?", POST_SELECT);

        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(viewer_id)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(post)
    }

    pub async fn author_of(pool: &Pool<Sqlite>, id: i64) -> Result<Option<i64>, AppError> {
        let author = sqlx::query_scalar("SELECT author_id FROM community_posts WHERE post_id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(author)
    }

    pub async fn create(pool: &Pool<Sqlite>, new: NewPost) -> Result<Post, AppError> {
        let now = chrono::Utc::now().timestamp();

        let post_id: i64 = sqlx::query_scalar(
            r#"
INSERT INTO community_posts (author_id, title, content, category, is_anonymous, created_at, updated_at)
VALUES (?, ?, ?, ?, ?, ?, ?)
RETURNING post_id
            "#,
        )
        .bind(new.author_id)
        .bind(&new.title)
        .bind(&new.content)
        .bind(&new.category)
        .bind(new.is_anonymous)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await?;

        Self::get(pool, post_id, new.author_id)
            .await?
            .ok_or_else(|| AppError::Internal("Failed to fetch created post".to_string()))
    }

    pub async fn update(
        pool: &Pool<Sqlite>,
        id: i64,
        title: Option<&str>,
        content: Option<&str>,
        category: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
UPDATE community_posts
SET title = COALESCE(?, title),
    content = COALESCE(?, content),
    category = COALESCE(?, category),
    updated_at = ?
WHERE post_id = ?
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(category)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM community_posts WHERE post_id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Oldest first
    pub async fn list_comments(pool: &Pool<Sqlite>, post_id: i64) -> Result<Vec<Comment>, AppError> {
        let sql = format!(
            "{} WHERE c.post_id = ? ORDER BY c.created_at, c.comment_id",
            COMMENT_SELECT
        );

        let comments = sqlx::query_as::<_, Comment>(&sql)
            .bind(post_id)
            .fetch_all(pool)
            .await?;

        Ok(comments)
    }

    pub async fn add_comment(
        pool: &Pool<Sqlite>,
        post_id: i64,
        author_id: i64,
        content: &str,
        is_anonymous: bool,
    ) -> Result<Comment, AppError> {
        let comment_id: i64 = sqlx::query_scalar(
            r#"
INSERT INTO post_comments (post_id, author_id, content, is_anonymous, created_at)
VALUES (?, ?, ?, ?, ?)
RETURNING comment_id
            "#,
        )
        .bind(post_id)
        .bind(author_id)
        .bind(content)
        .bind(is_anonymous)
        .bind(chrono::Utc::now().timestamp())
        .fetch_one(pool)
        .await?;

        let sql = format!("{} WHERE c.comment_id = ?", COMMENT_SELECT);
        let comment = sqlx::query_as::<_, Comment>(&sql)
            .bind(comment_id)
            .fetch_one(pool)
            .await?;

        Ok(comment)
    }

    pub async fn comment_author(pool: &Pool<Sqlite>, id: i64) -> Result<Option<i64>, AppError> {
        let author = sqlx::query_scalar("SELECT author_id FROM post_comments WHERE comment_id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(author)
    }

    pub async fn delete_comment(pool: &Pool<Sqlite>, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM post_comments WHERE comment_id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Like or unlike; returns whether the post is now liked and its like count
    pub async fn toggle_like(
        pool: &Pool<Sqlite>,
        post_id: i64,
        user_id: i64,
    ) -> Result<(bool, i64), AppError> {
        let mut tx = pool.begin().await?;

        let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = ? AND user_id = ?")
            .bind(post_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if removed == 0 {
            sqlx::query("INSERT INTO post_likes (post_id, user_id, created_at) VALUES (?, ?, ?)")
                .bind(post_id)
                .bind(user_id)
                .bind(chrono::Utc::now().timestamp())
                .execute(&mut *tx)
                .await?;
        }

        let likes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_likes WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((removed == 0, likes))
    }
}
