//! Dataset and datapoint models

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use chrono::{DateTime, Utc};

/// Postgres caps bind parameters per statement at 65535
const INSERT_CHUNK_ROWS: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Dataset {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One scalar observation of a dataset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Sample {
    pub time: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(time: DateTime<Utc>, value: f64) -> Self {
        Self { time, value }
    }

    /// Samples of a dataset ordered by time
    pub async fn list_ordered(pool: &PgPool, dataset_id: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Sample>(
            "SELECT time, value FROM datapoints WHERE dataset_id = $1 ORDER BY time"
        )
        .bind(dataset_id)
        .fetch_all(pool)
        .await
    }

    /// Insert samples, overwriting values of timestamps already present
    pub async fn insert_many(
        pool: &PgPool,
        dataset_id: i64,
        samples: &[Sample]
    ) -> Result<u64, sqlx::Error> {
        let mut inserted = 0;

        for chunk in samples.chunks(INSERT_CHUNK_ROWS) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO datapoints (dataset_id, time, value) ");
            builder.push_values(chunk, |mut row, sample| {
                row.push_bind(dataset_id)
                    .push_bind(sample.time)
                    .push_bind(sample.value);
            });
            builder.push(" ON CONFLICT (dataset_id, time) DO UPDATE SET value = EXCLUDED.value");

            inserted += builder.build().execute(pool).await?.rows_affected();
        }

        Ok(inserted)
    }
}

impl Dataset {
    pub async fn create(
        pool: &PgPool,
        name: &str,
        description: Option<&str>
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Dataset>(
            r#"
            INSERT INTO datasets (name, description)
            VALUES ($1, $2)
            RETURNING *
            "#
        )
        .bind(name)
        .bind(description)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Dataset>("SELECT * FROM datasets WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn exists(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM datasets WHERE id = $1)")
            .bind(id)
            .fetch_one(pool)
            .await
    }
}
