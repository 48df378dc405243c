// src/models/points.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Represents the 'points_ledger' table. Append-only audit trail of grants.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsLedgerEntry {
    pub id: i64,
    pub user_id: i64,
    pub quiz_attempt_id: Option<i64>,
    pub points: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
