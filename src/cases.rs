//! Boundary to the external case registry.
//!
//! Case metadata (parties, outcome, tribunal composition) is owned by the
//! case-management side of the system; search only joins page hits against
//! it at query time. The trait keeps that boundary explicit and lets tests
//! substitute a canned registry.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::models::CaseMetadata;

#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn case_metadata(&self, case_id: &str) -> Result<Option<CaseMetadata>>;
}

/// Default implementation reading the colocated `cases` table.
pub struct SqliteCaseStore {
    pool: SqlitePool,
}

impl SqliteCaseStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CaseStore for SqliteCaseStore {
    async fn case_metadata(&self, case_id: &str) -> Result<Option<CaseMetadata>> {
        let row = sqlx::query("SELECT * FROM cases WHERE id = ?")
            .bind(case_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let board_members_json: String = row.get("board_members");
        let board_members: Vec<String> =
            serde_json::from_str(&board_members_json).unwrap_or_default();

        Ok(Some(CaseMetadata {
            case_number: row.get("case_number"),
            appellant: row.get("appellant"),
            respondent: row.get("respondent"),
            filed_on: row.get("filed_on"),
            decided_on: row.get("decided_on"),
            outcome: row.get("outcome"),
            chairperson: row.get("chairperson"),
            board_members,
            tax_amount: row.get("tax_amount"),
        }))
    }
}
