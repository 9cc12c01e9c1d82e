use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::model::{
    CompositeModel, DurationPredictor, RegressionQualityMetrics, TargetDuration,
    TrainingParameters,
};
use crate::trainer::RegressorDecoder;

/// Durable home for trained predictors and the composites that bundle them.
pub trait ModelStore: Send + Sync {
    fn save_predictor(
        &self,
        name: &str,
        predictor: &DurationPredictor,
        metrics: &RegressionQualityMetrics,
    ) -> Result<String>;

    fn load_predictor(&self, id: &str) -> Result<DurationPredictor>;

    fn load_metrics(&self, id: &str) -> Result<RegressionQualityMetrics>;

    /// Persist a composite whose predictors already carry ids.
    fn save_composite(&self, name: &str, composite: &CompositeModel) -> Result<String>;

    fn load_composite(&self, id: &str) -> Result<CompositeModel>;
}

pub struct SqliteModelStore {
    conn: Mutex<Connection>,
    decode: RegressorDecoder,
}

impl SqliteModelStore {
    pub fn open(path: &Path, decode: RegressorDecoder) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open model store {}", path.display()))?;
        Self::with_connection(conn, decode)
    }

    pub fn open_in_memory(decode: RegressorDecoder) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, decode)
    }

    fn with_connection(conn: Connection, decode: RegressorDecoder) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS predictors (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                target_duration_months INTEGER NOT NULL,
                root_mean_squared_error REAL NOT NULL,
                model_kind TEXT NOT NULL,
                model_blob BLOB NOT NULL,
                metrics_json TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS composites (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                parameters_json TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS composite_predictors (
                composite_id TEXT NOT NULL REFERENCES composites(id),
                predictor_id TEXT NOT NULL REFERENCES predictors(id),
                position INTEGER NOT NULL,
                PRIMARY KEY(composite_id, position)
            );
            "#,
        )
        .context("failed to initialize model store schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
            decode,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("model store lock poisoned"))
    }

    fn load_predictor_with(conn: &Connection, id: &str, decode: RegressorDecoder) -> Result<DurationPredictor> {
        let row = conn
            .query_row(
                "SELECT target_duration_months, root_mean_squared_error, model_blob
                 FROM predictors WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((months, rmse, blob)) = row else {
            bail!("predictor {} not found", id);
        };
        let duration = TargetDuration::try_from(months)
            .with_context(|| format!("predictor {} has unsupported duration", id))?;
        let model = decode(&blob).with_context(|| format!("failed to decode predictor {}", id))?;
        Ok(DurationPredictor::new(duration, rmse, model).with_id(id))
    }
}

impl ModelStore for SqliteModelStore {
    fn save_predictor(
        &self,
        name: &str,
        predictor: &DurationPredictor,
        metrics: &RegressionQualityMetrics,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let blob = predictor.model().encode()?;
        let metrics_json =
            serde_json::to_string(metrics).context("failed to serialize predictor metrics")?;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO predictors (
                id, name, target_duration_months, root_mean_squared_error,
                model_kind, model_blob, metrics_json, created_at_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                id,
                name,
                predictor.target_duration.months(),
                predictor.root_mean_squared_error,
                predictor.model().kind(),
                blob,
                metrics_json,
                now_ms,
            ],
        )
        .with_context(|| format!("failed to insert predictor {}", name))?;
        tracing::info!(%id, name, duration = %predictor.target_duration, "predictor saved");
        Ok(id)
    }

    fn load_predictor(&self, id: &str) -> Result<DurationPredictor> {
        let conn = self.lock()?;
        Self::load_predictor_with(&conn, id, self.decode)
    }

    fn load_metrics(&self, id: &str) -> Result<RegressionQualityMetrics> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT metrics_json FROM predictors WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let json = json.ok_or_else(|| anyhow!("predictor {} not found", id))?;
        serde_json::from_str(&json).context("failed to parse predictor metrics json")
    }

    fn save_composite(&self, name: &str, composite: &CompositeModel) -> Result<String> {
        let predictor_ids = composite
            .predictors()
            .iter()
            .map(|p| {
                p.id.clone().ok_or_else(|| {
                    anyhow!(
                        "{} predictor must be saved before its composite",
                        p.target_duration
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let id = uuid::Uuid::new_v4().to_string();
        let parameters_json = serde_json::to_string(&composite.parameters)
            .context("failed to serialize training parameters")?;
        let now_ms = chrono::Utc::now().timestamp_millis();

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO composites (id, name, parameters_json, created_at_ms) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, parameters_json, now_ms],
        )?;
        for (position, predictor_id) in predictor_ids.iter().enumerate() {
            tx.execute(
                "INSERT INTO composite_predictors (composite_id, predictor_id, position) VALUES (?1, ?2, ?3)",
                params![id, predictor_id, position as i64],
            )?;
        }
        tx.commit()
            .with_context(|| format!("failed to commit composite {}", name))?;
        tracing::info!(%id, name, predictors = predictor_ids.len(), "composite saved");
        Ok(id)
    }

    fn load_composite(&self, id: &str) -> Result<CompositeModel> {
        let conn = self.lock()?;
        let parameters_json: Option<String> = conn
            .query_row(
                "SELECT parameters_json FROM composites WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let parameters_json = parameters_json.ok_or_else(|| anyhow!("composite {} not found", id))?;
        let parameters: TrainingParameters = serde_json::from_str(&parameters_json)
            .context("failed to parse training parameters json")?;

        let mut stmt = conn.prepare(
            "SELECT predictor_id FROM composite_predictors WHERE composite_id = ?1 ORDER BY position",
        )?;
        let predictor_ids = stmt
            .query_map(params![id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let predictors = predictor_ids
            .iter()
            .map(|pid| Self::load_predictor_with(&conn, pid, self.decode))
            .collect::<Result<Vec<_>>>()?;

        Ok(CompositeModel::new(parameters, predictors)?.with_id(id))
    }
}
