//! Anomaly model

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyType {
    Point,
    Contextual,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::Point => "point",
            AnomalyType::Contextual => "contextual",
        }
    }
}

impl FromStr for AnomalyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "point" => Ok(AnomalyType::Point),
            "contextual" => Ok(AnomalyType::Contextual),
            other => Err(format!("unknown anomaly type '{}'", other)),
        }
    }
}

/// Persisted anomaly interval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: i64,
    pub analysis_id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub validated: bool,
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
}

#[derive(Debug, FromRow)]
struct AnomalyRow {
    id: i64,
    analysis_id: i64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    validated: bool,
    anomaly_type: String,
}

impl TryFrom<AnomalyRow> for Anomaly {
    type Error = sqlx::Error;

    fn try_from(row: AnomalyRow) -> Result<Self, Self::Error> {
        let anomaly_type = row.anomaly_type.parse::<AnomalyType>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;

        Ok(Anomaly {
            id: row.id,
            analysis_id: row.analysis_id,
            start: row.start_time,
            end: row.end_time,
            validated: row.validated,
            anomaly_type,
        })
    }
}

/// Anomaly interval produced by a finished analysis, not yet stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAnomaly {
    pub analysis_id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
}

impl NewAnomaly {
    pub fn point(analysis_id: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            analysis_id,
            start,
            end,
            anomaly_type: AnomalyType::Point,
        }
    }
}

impl Anomaly {
    /// Bulk insert inside an open transaction or connection
    async fn insert_batch(
        conn: &mut sqlx::PgConnection,
        anomalies: &[NewAnomaly]
    ) -> Result<u64, sqlx::Error> {
        if anomalies.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0;
        // 4 binds per row
        for chunk in anomalies.chunks(10_000) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO anomalies (analysis_id, start_time, end_time, anomaly_type) "
            );
            builder.push_values(chunk, |mut row, anomaly| {
                row.push_bind(anomaly.analysis_id)
                    .push_bind(anomaly.start)
                    .push_bind(anomaly.end)
                    .push_bind(anomaly.anomaly_type.as_str());
            });
            inserted += builder.build().execute(&mut *conn).await?.rows_affected();
        }

        Ok(inserted)
    }

    pub async fn create_many(pool: &PgPool, anomalies: &[NewAnomaly]) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let inserted = Self::insert_batch(&mut *tx, anomalies).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    /// Swap the anomalies of an analysis for a new batch atomically
    pub async fn replace_for_analysis(
        pool: &PgPool,
        analysis_id: i64,
        anomalies: &[NewAnomaly]
    ) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM anomalies WHERE analysis_id = $1")
            .bind(analysis_id)
            .execute(&mut *tx)
            .await?;

        let inserted = Self::insert_batch(&mut *tx, anomalies).await?;
        tx.commit().await?;

        Ok(inserted)
    }

    pub async fn list_by_analysis(pool: &PgPool, analysis_id: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AnomalyRow>(
            "SELECT * FROM anomalies WHERE analysis_id = $1 ORDER BY start_time"
        )
        .bind(analysis_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Anomaly::try_from)
        .collect()
    }
}
