//! Exactly-once credential issuance. The UNIQUE(learnerId, credentialId)
//! index is the arbiter: concurrent issuers both upsert, only one row lands,
//! and both read back the same `issuedAt`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::services::{now_iso, EngineError};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub id: String,
    pub credential_id: String,
    pub issued_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueOutcome {
    pub credential_id: String,
    pub issued: bool,
    pub newly_issued: bool,
    pub issued_at: Option<String>,
}

/// Issues the credential when `eligible` holds, without ever duplicating or
/// re-dating an existing grant. Safe to call repeatedly and concurrently.
pub async fn issue_if_eligible(
    pool: &SqlitePool,
    learner_id: &str,
    credential_id: &str,
    eligible: bool,
    now: DateTime<Utc>,
) -> Result<IssueOutcome, EngineError> {
    let mut conn = pool.acquire().await?;
    issue_on_conn(&mut conn, learner_id, credential_id, eligible, now).await
}

/// Connection-level variant so issuance can join a caller's transaction.
pub(crate) async fn issue_on_conn(
    conn: &mut SqliteConnection,
    learner_id: &str,
    credential_id: &str,
    eligible: bool,
    now: DateTime<Utc>,
) -> Result<IssueOutcome, EngineError> {
    if !eligible {
        let existing = fetch_grant(conn, learner_id, credential_id).await?;
        return Ok(IssueOutcome {
            credential_id: credential_id.to_string(),
            issued: existing.is_some(),
            newly_issued: false,
            issued_at: existing.map(|c| c.issued_at),
        });
    }

    let inserted = sqlx::query(
        r#"INSERT INTO "credentials" ("id", "learnerId", "credentialId", "issuedAt")
           VALUES (?, ?, ?, ?)
           ON CONFLICT ("learnerId", "credentialId") DO NOTHING"#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(learner_id)
    .bind(credential_id)
    .bind(now_iso(now))
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let grant = fetch_grant(conn, learner_id, credential_id)
        .await?
        .ok_or_else(|| EngineError::Transient("credential vanished after insert".to_string()))?;

    Ok(IssueOutcome {
        credential_id: credential_id.to_string(),
        issued: true,
        newly_issued: inserted > 0,
        issued_at: Some(grant.issued_at),
    })
}

pub async fn list_credentials(
    pool: &SqlitePool,
    learner_id: &str,
) -> Result<Vec<CredentialRecord>, EngineError> {
    let rows = sqlx::query(
        r#"SELECT "id", "credentialId", "issuedAt" FROM "credentials"
           WHERE "learnerId" = ? ORDER BY "issuedAt" ASC"#,
    )
    .bind(learner_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(record_from_row).collect())
}

async fn fetch_grant(
    conn: &mut SqliteConnection,
    learner_id: &str,
    credential_id: &str,
) -> Result<Option<CredentialRecord>, EngineError> {
    let row = sqlx::query(
        r#"SELECT "id", "credentialId", "issuedAt" FROM "credentials"
           WHERE "learnerId" = ? AND "credentialId" = ?"#,
    )
    .bind(learner_id)
    .bind(credential_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.as_ref().map(record_from_row))
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> CredentialRecord {
    CredentialRecord {
        id: row.try_get("id").unwrap_or_default(),
        credential_id: row.try_get("credentialId").unwrap_or_default(),
        issued_at: row.try_get("issuedAt").unwrap_or_default(),
    }
}
