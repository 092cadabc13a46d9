//! Analysis model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use chrono::{DateTime, Utc};

/// Detection method tag stored on LSTM autoencoder analyses
pub const LSTMAE_METHOD: &str = "lstmae";

/// Lifecycle of an analysis run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Error => "error",
        }
    }

    /// Completed and error are final
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Error)
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AnalysisStatus::Pending),
            "processing" => Ok(AnalysisStatus::Processing),
            "completed" => Ok(AnalysisStatus::Completed),
            "error" => Ok(AnalysisStatus::Error),
            other => Err(format!("unknown analysis status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub id: i64,
    pub dataset_id: i64,
    pub detection_method: String,
    pub name: String,
    pub description: Option<String>,
    pub status: AnalysisStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw row, status kept as text
#[derive(Debug, FromRow)]
struct AnalysisRow {
    id: i64,
    dataset_id: i64,
    detection_method: String,
    name: String,
    description: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AnalysisRow> for Analysis {
    type Error = sqlx::Error;

    fn try_from(row: AnalysisRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<AnalysisStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;

        Ok(Analysis {
            id: row.id,
            dataset_id: row.dataset_id,
            detection_method: row.detection_method,
            name: row.name,
            description: row.description,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAnalysis {
    pub dataset_id: i64,
    pub detection_method: String,
    pub name: String,
    pub description: Option<String>,
}

/// Fields of an analysis that may change; `None` leaves a field untouched.
///
/// `description: Some(None)` clears the description.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<AnalysisStatus>,
}

impl AnalysisPatch {
    pub fn status(status: AnalysisStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.status.is_none()
    }

    /// Apply the patch to an in-memory analysis
    pub fn apply(&self, analysis: &mut Analysis) {
        if let Some(name) = &self.name {
            analysis.name = name.clone();
        }
        if let Some(description) = &self.description {
            analysis.description = description.clone();
        }
        if let Some(status) = self.status {
            analysis.status = status;
        }
    }
}

impl Analysis {
    pub async fn create(pool: &PgPool, data: CreateAnalysis) -> Result<Self, sqlx::Error> {
        let row = sqlx::query_as::<_, AnalysisRow>(
            r#"
            INSERT INTO analyses (dataset_id, detection_method, name, description, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#
        )
        .bind(data.dataset_id)
        .bind(&data.detection_method)
        .bind(&data.name)
        .bind(&data.description)
        .bind(AnalysisStatus::Pending.as_str())
        .fetch_one(pool)
        .await?;

        row.try_into()
    }

    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AnalysisRow>("SELECT * FROM analyses WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(Analysis::try_from)
            .transpose()
    }

    pub async fn list_by_dataset(pool: &PgPool, dataset_id: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AnalysisRow>(
            "SELECT * FROM analyses WHERE dataset_id = $1 ORDER BY id"
        )
        .bind(dataset_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Analysis::try_from)
        .collect()
    }

    pub async fn update(
        pool: &PgPool,
        id: i64,
        patch: &AnalysisPatch
    ) -> Result<Option<Self>, sqlx::Error> {
        let (set_description, description) = match &patch.description {
            Some(description) => (true, description.clone()),
            None => (false, None),
        };

        sqlx::query_as::<_, AnalysisRow>(
            r#"
            UPDATE analyses
            SET name = COALESCE($2, name),
                description = CASE WHEN $3 THEN $4 ELSE description END,
                status = COALESCE($5, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(id)
        .bind(&patch.name)
        .bind(set_description)
        .bind(description)
        .bind(patch.status.map(|s| s.as_str()))
        .fetch_optional(pool)
        .await?
        .map(Analysis::try_from)
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_analysis() -> Analysis {
        Analysis {
            id: 1,
            dataset_id: 3,
            detection_method: LSTMAE_METHOD.to_string(),
            name: "weekly".to_string(),
            description: Some("first run".to_string()),
            status: AnalysisStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            AnalysisStatus::Pending,
            AnalysisStatus::Processing,
            AnalysisStatus::Completed,
            AnalysisStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<AnalysisStatus>().unwrap(), status);
        }
        assert!("done".parse::<AnalysisStatus>().is_err());
    }

    #[test]
    fn test_patch_leaves_unset_fields() {
        let mut analysis = sample_analysis();
        AnalysisPatch::status(AnalysisStatus::Processing).apply(&mut analysis);

        assert_eq!(analysis.status, AnalysisStatus::Processing);
        assert_eq!(analysis.name, "weekly");
        assert_eq!(analysis.description.as_deref(), Some("first run"));
    }

    #[test]
    fn test_patch_clears_description() {
        let mut analysis = sample_analysis();
        let patch = AnalysisPatch {
            description: Some(None),
            ..Default::default()
        };
        assert!(!patch.is_empty());
        patch.apply(&mut analysis);

        assert!(analysis.description.is_none());
        assert_eq!(analysis.status, AnalysisStatus::Pending);
    }
}
