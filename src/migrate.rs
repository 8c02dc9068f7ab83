use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Create documents table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            case_id TEXT NOT NULL,
            file_name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            mime_type TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            page_count INTEGER,
            ocr_status TEXT NOT NULL DEFAULT 'pending',
            ocr_error TEXT,
            processed_at INTEGER,
            created_at INTEGER NOT NULL,
            UNIQUE(case_id, content_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create page_content table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS page_content (
            document_id TEXT NOT NULL,
            case_id TEXT NOT NULL,
            page_number INTEGER NOT NULL,
            raw_text TEXT NOT NULL,
            cleaned_text TEXT NOT NULL,
            word_count INTEGER NOT NULL,
            language TEXT NOT NULL,
            source TEXT NOT NULL,
            ocr_confidence REAL,
            embedding BLOB,
            PRIMARY KEY (document_id, page_number),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Case registry consumed (read-only) for search result enrichment
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cases (
            id TEXT PRIMARY KEY,
            case_number TEXT NOT NULL,
            appellant TEXT NOT NULL,
            respondent TEXT NOT NULL,
            filed_on TEXT,
            decided_on TEXT,
            outcome TEXT,
            chairperson TEXT,
            board_members TEXT NOT NULL DEFAULT '[]',
            tax_amount REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create FTS5 virtual table over page content
    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='page_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE page_fts USING fts5(
                document_id UNINDEXED,
                page_number UNINDEXED,
                content
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(ocr_status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_case_id ON documents(case_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_page_content_case_id ON page_content(case_id)")
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_database(dir.path().join("docket.sqlite"));
        let pool = db::connect(&config).await.unwrap();

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('documents', 'page_content', 'cases', 'page_fts')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 4);
        pool.close().await;
    }
}
