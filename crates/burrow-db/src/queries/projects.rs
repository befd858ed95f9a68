//! Database query functions for the `projects` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Project;

/// Insert a new project row. Returns the inserted project with
/// server-generated defaults (id, created_at).
pub async fn insert_project(pool: &PgPool, name: &str, user_email: &str) -> Result<Project> {
    let project = sqlx::query_as::<_, Project>(
        "INSERT INTO projects (name, user_email) \
         VALUES ($1, $2) \
         RETURNING *",
    )
    .bind(name)
    .bind(user_email)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert project {name:?}"))?;

    Ok(project)
}

/// Fetch a project by its ID.
pub async fn get_project(pool: &PgPool, id: Uuid) -> Result<Option<Project>> {
    let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to fetch project {id}"))?;

    Ok(project)
}

/// Fetch a project by ID only if `user_email` owns it.
pub async fn get_owned_project(
    pool: &PgPool,
    id: Uuid,
    user_email: &str,
) -> Result<Option<Project>> {
    let project =
        sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1 AND user_email = $2")
            .bind(id)
            .bind(user_email)
            .fetch_optional(pool)
            .await
            .with_context(|| format!("failed to fetch project {id} for {user_email}"))?;

    Ok(project)
}

/// List the projects owned by `user_email`, newest first.
pub async fn list_projects_for_owner(pool: &PgPool, user_email: &str) -> Result<Vec<Project>> {
    let projects = sqlx::query_as::<_, Project>(
        "SELECT * FROM projects \
         WHERE user_email = $1 \
         ORDER BY created_at DESC",
    )
    .bind(user_email)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list projects for {user_email}"))?;

    Ok(projects)
}

/// Delete a project and, through the cascading foreign keys, all of its
/// conversations and messages. Returns `true` if a row was removed.
pub async fn delete_project(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .with_context(|| format!("failed to delete project {id}"))?;

    Ok(result.rows_affected() > 0)
}
