use anyhow::{anyhow, Context, Result};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};

use crate::model::{Branch, Commit, Id, Project};
use crate::store::traits::{AppendOutcome, BranchStore, CommitStore, ProjectStore, Store};

const COMMIT_COLUMNS: &str = "id, project_id, branch_id, parent_id, comment, created_at, \
                              data, data_size, elements_count";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Run the embedded migrations under `migrations/`
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }
}

fn project_from_row(row: &PgRow) -> Project {
    Project {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        default_branch_id: row.get("default_branch_id"),
    }
}

fn branch_from_row(row: &PgRow) -> Branch {
    Branch {
        id: row.get("id"),
        project_id: row.get("project_id"),
        name: row.get("name"),
        created_at: row.get("created_at"),
        head: row.get("head"),
    }
}

fn commit_from_row(row: &PgRow) -> Commit {
    Commit {
        id: row.get("id"),
        project_id: row.get("project_id"),
        branch_id: row.get("branch_id"),
        parent_id: row.get("parent_id"),
        comment: row.get("comment"),
        created_at: row.get("created_at"),
        data: row.get("data"),
        data_size: row.get("data_size"),
        elements_count: row.get("elements_count"),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait::async_trait]
impl ProjectStore for PostgresStore {
    async fn get_project(&self, id: &Id) -> Result<Option<Project>> {
        let row = sqlx::query(
            "SELECT id, name, description, created_at, default_branch_id FROM projects WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch project")?;

        Ok(row.as_ref().map(project_from_row))
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let rows = sqlx::query(
            "SELECT id, name, description, created_at, default_branch_id FROM projects ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list projects")?;

        Ok(rows.iter().map(project_from_row).collect())
    }

    async fn create_project(&self, project: Project, default_branch: Branch) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO projects (id, name, description, created_at, default_branch_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(&project.created_at)
        .bind(&project.default_branch_id)
        .execute(&mut *tx)
        .await
        .context("Failed to insert project")?;

        sqlx::query(
            r#"
            INSERT INTO branches (id, project_id, name, created_at, head)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&default_branch.id)
        .bind(&default_branch.project_id)
        .bind(&default_branch.name)
        .bind(&default_branch.created_at)
        .bind(&default_branch.head)
        .execute(&mut *tx)
        .await
        .context("Failed to insert default branch")?;

        tx.commit().await.context("Failed to commit project creation")?;
        Ok(())
    }

    async fn update_project(&self, project: Project) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE projects SET name = $2, description = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.description)
        .execute(&self.pool)
        .await
        .context("Failed to update project")?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl BranchStore for PostgresStore {
    async fn get_branch(&self, project_id: &Id, branch_id: &Id) -> Result<Option<Branch>> {
        let row = sqlx::query(
            r#"
            SELECT id, project_id, name, created_at, head
            FROM branches
            WHERE project_id = $1 AND id = $2
            "#,
        )
        .bind(project_id)
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch branch")?;

        Ok(row.as_ref().map(branch_from_row))
    }

    async fn list_branches_for_project(&self, project_id: &Id) -> Result<Vec<Branch>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, name, created_at, head
            FROM branches
            WHERE project_id = $1
            ORDER BY seq
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list branches")?;

        Ok(rows.iter().map(branch_from_row).collect())
    }

    async fn create_branch(&self, branch: Branch) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO branches (id, project_id, name, created_at, head)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&branch.id)
        .bind(&branch.project_id)
        .bind(&branch.name)
        .bind(&branch.created_at)
        .bind(&branch.head)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) if is_unique_violation(&err) => Ok(false),
            Err(err) => Err(anyhow::Error::new(err).context("Failed to insert branch")),
        }
    }
}

#[async_trait::async_trait]
impl CommitStore for PostgresStore {
    async fn get_commit(&self, project_id: &Id, commit_id: &Id) -> Result<Option<Commit>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM commits WHERE project_id = $1 AND id = $2",
            COMMIT_COLUMNS
        ))
        .bind(project_id)
        .bind(commit_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch commit")?;

        Ok(row.as_ref().map(commit_from_row))
    }

    async fn list_commits_for_project(&self, project_id: &Id) -> Result<Vec<Commit>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM commits WHERE project_id = $1 ORDER BY seq DESC",
            COMMIT_COLUMNS
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list commits")?;

        Ok(rows.iter().map(commit_from_row).collect())
    }

    async fn find_commit_by_idempotency_key(
        &self,
        project_id: &Id,
        key: &str,
    ) -> Result<Option<Commit>> {
        let row = sqlx::query(
            r#"
            SELECT c.id, c.project_id, c.branch_id, c.parent_id, c.comment, c.created_at,
                   c.data, c.data_size, c.elements_count
            FROM idempotency_keys k
            JOIN commits c ON c.id = k.commit_id
            WHERE k.project_id = $1 AND k.key = $2
            "#,
        )
        .bind(project_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up idempotency key")?;

        Ok(row.as_ref().map(commit_from_row))
    }

    async fn append_commit(
        &self,
        commit: Commit,
        idempotency_key: Option<&str>,
    ) -> Result<AppendOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        // Row lock on the branch serializes concurrent appends to it
        let branch_row = sqlx::query(
            r#"
            SELECT id, project_id, name, created_at, head
            FROM branches
            WHERE project_id = $1 AND id = $2
            FOR UPDATE
            "#,
        )
        .bind(&commit.project_id)
        .bind(&commit.branch_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to lock branch")?
        .ok_or_else(|| anyhow!("Branch not found: {}", commit.branch_id))?;
        let mut branch = branch_from_row(&branch_row);

        if let Some(key) = idempotency_key {
            let existing = sqlx::query("SELECT commit_id FROM idempotency_keys WHERE project_id = $1 AND key = $2")
                .bind(&commit.project_id)
                .bind(key)
                .fetch_optional(&mut *tx)
                .await
                .context("Failed to look up idempotency key")?;
            if let Some(row) = existing {
                let commit_id: String = row.get("commit_id");
                tx.rollback().await.ok();
                let replayed = self
                    .get_commit(&commit.project_id, &commit_id)
                    .await?
                    .ok_or_else(|| anyhow!("Commit not found: {}", commit_id))?;
                return Ok(AppendOutcome::Replayed(replayed));
            }
        }

        if branch.head != commit.parent_id {
            tx.rollback().await.ok();
            return Ok(AppendOutcome::HeadMoved {
                actual: branch.head,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO commits (id, project_id, branch_id, parent_id, comment, created_at,
                                 data, data_size, elements_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&commit.id)
        .bind(&commit.project_id)
        .bind(&commit.branch_id)
        .bind(&commit.parent_id)
        .bind(&commit.comment)
        .bind(&commit.created_at)
        .bind(&commit.data)
        .bind(commit.data_size)
        .bind(commit.elements_count)
        .execute(&mut *tx)
        .await
        .context("Failed to insert commit")?;

        sqlx::query("UPDATE branches SET head = $3 WHERE project_id = $1 AND id = $2")
            .bind(&commit.project_id)
            .bind(&commit.branch_id)
            .bind(&commit.id)
            .execute(&mut *tx)
            .await
            .context("Failed to advance branch head")?;

        if let Some(key) = idempotency_key {
            let inserted = sqlx::query(
                "INSERT INTO idempotency_keys (project_id, key, commit_id) VALUES ($1, $2, $3)",
            )
            .bind(&commit.project_id)
            .bind(key)
            .bind(&commit.id)
            .execute(&mut *tx)
            .await;

            // Same key raced in on another branch; its commit wins
            if let Err(err) = inserted {
                tx.rollback().await.ok();
                if is_unique_violation(&err) {
                    let replayed = self
                        .find_commit_by_idempotency_key(&commit.project_id, key)
                        .await?
                        .ok_or_else(|| anyhow!("Idempotency key vanished: {}", key))?;
                    return Ok(AppendOutcome::Replayed(replayed));
                }
                return Err(anyhow::Error::new(err).context("Failed to record idempotency key"));
            }
        }

        tx.commit().await.context("Failed to commit transaction")?;

        branch.head = Some(commit.id);
        Ok(AppendOutcome::Appended(branch))
    }
}

impl Store for PostgresStore {}
