//! Persistence for progress snapshots.
//!
//! The aggregator itself is pure; this module owns the read-then-write cycle
//! around it. Concurrent completions for the same user are serialized with an
//! optimistic version column: every save is a compare-and-swap on the version
//! the snapshot was loaded at, and a lost race reloads and re-applies instead
//! of overwriting the other writer's gains.

use sqlx::PgPool;
use uuid::Uuid;

use stride_core::progress::{CompletionEvent, UserProgress, apply_completion};

use crate::error::AppError;

/// How many CAS attempts before giving up. Contention on a single user's row
/// is rare (one human), so a lost race more than a few times running means
/// something is wrong.
const MAX_CAS_ATTEMPTS: u32 = 5;

pub struct ProgressStore {
    pool: PgPool,
}

impl ProgressStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load a user's snapshot and its storage version. `None` for users who
    /// have never completed anything.
    pub async fn load(&self, user_id: Uuid) -> Result<Option<(UserProgress, i64)>, AppError> {
        let row = sqlx::query_as::<_, ProgressRow>(
            r#"
            SELECT xp, level, current_streak, longest_streak, last_activity_date,
                   daily_stats, history, version
            FROM user_progress
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => {
                let version = r.version;
                Ok(Some((r.into_progress()?, version)))
            }
            None => Ok(None),
        }
    }

    /// Load-or-default view for read endpoints.
    pub async fn load_or_default(&self, user_id: Uuid) -> Result<UserProgress, AppError> {
        Ok(self
            .load(user_id)
            .await?
            .map(|(progress, _)| progress)
            .unwrap_or_default())
    }

    /// Run one aggregation step for a user: load the current snapshot, apply
    /// the event, and persist the result under compare-and-swap. Retries on
    /// version conflicts so concurrent completions never lose an update.
    pub async fn apply(
        &self,
        user_id: Uuid,
        event: &CompletionEvent,
    ) -> Result<UserProgress, AppError> {
        for attempt in 0..MAX_CAS_ATTEMPTS {
            let loaded = self.load(user_id).await?;
            let (current, version) = match loaded {
                Some((progress, version)) => (progress, Some(version)),
                None => (UserProgress::default(), None),
            };

            let next = apply_completion(&current, event)?;

            if self.save(user_id, &next, version).await? {
                return Ok(next);
            }

            tracing::debug!(
                user_id = %user_id,
                attempt = attempt + 1,
                "progress CAS conflict, retrying"
            );
        }

        Err(AppError::Internal(format!(
            "progress update for user {user_id} lost {MAX_CAS_ATTEMPTS} CAS races"
        )))
    }

    /// Persist a snapshot. `expected_version` is `None` for a first-ever
    /// write (insert) and `Some(v)` for an update of the version the caller
    /// loaded. Returns `false` when another writer got there first.
    pub async fn save(
        &self,
        user_id: Uuid,
        progress: &UserProgress,
        expected_version: Option<i64>,
    ) -> Result<bool, AppError> {
        let daily_stats = to_json(&progress.daily_stats)?;
        let history = to_json(&progress.history)?;

        let result = match expected_version {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO user_progress
                        (user_id, xp, level, current_streak, longest_streak,
                         last_activity_date, daily_stats, history, version)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1)
                    ON CONFLICT (user_id) DO NOTHING
                    "#,
                )
                .bind(user_id)
                .bind(progress.xp)
                .bind(progress.level)
                .bind(progress.current_streak)
                .bind(progress.longest_streak)
                .bind(progress.last_activity_date)
                .bind(&daily_stats)
                .bind(&history)
                .execute(&self.pool)
                .await?
            }
            Some(version) => {
                sqlx::query(
                    r#"
                    UPDATE user_progress
                    SET xp = $3, level = $4, current_streak = $5, longest_streak = $6,
                        last_activity_date = $7, daily_stats = $8, history = $9,
                        version = version + 1, updated_at = NOW()
                    WHERE user_id = $1 AND version = $2
                    "#,
                )
                .bind(user_id)
                .bind(version)
                .bind(progress.xp)
                .bind(progress.level)
                .bind(progress.current_streak)
                .bind(progress.longest_streak)
                .bind(progress.last_activity_date)
                .bind(&daily_stats)
                .bind(&history)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }

    /// Reset a user back to the zero state. The only deletion path the
    /// progress model has.
    pub async fn reset(&self, user_id: Uuid) -> Result<UserProgress, AppError> {
        let zero = UserProgress::default();
        let daily_stats = to_json(&zero.daily_stats)?;
        let history = to_json(&zero.history)?;

        sqlx::query(
            r#"
            INSERT INTO user_progress
                (user_id, xp, level, current_streak, longest_streak,
                 last_activity_date, daily_stats, history, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1)
            ON CONFLICT (user_id) DO UPDATE
            SET xp = EXCLUDED.xp, level = EXCLUDED.level,
                current_streak = EXCLUDED.current_streak,
                longest_streak = EXCLUDED.longest_streak,
                last_activity_date = EXCLUDED.last_activity_date,
                daily_stats = EXCLUDED.daily_stats, history = EXCLUDED.history,
                version = user_progress.version + 1, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(zero.xp)
        .bind(zero.level)
        .bind(zero.current_streak)
        .bind(zero.longest_streak)
        .bind(zero.last_activity_date)
        .bind(&daily_stats)
        .bind(&history)
        .execute(&self.pool)
        .await?;

        Ok(zero)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::Internal(format!("Failed to serialize progress window: {e}")))
}

/// Internal row type for sqlx mapping. The windows live in JSONB columns; the
/// scalar counters get real columns so the dashboard can query them directly.
#[derive(sqlx::FromRow)]
struct ProgressRow {
    xp: i64,
    level: i64,
    current_streak: i64,
    longest_streak: i64,
    last_activity_date: Option<chrono::NaiveDate>,
    daily_stats: serde_json::Value,
    history: serde_json::Value,
    version: i64,
}

impl ProgressRow {
    fn into_progress(self) -> Result<UserProgress, AppError> {
        let daily_stats = serde_json::from_value(self.daily_stats)
            .map_err(|e| AppError::Internal(format!("Corrupt daily_stats column: {e}")))?;
        let history = serde_json::from_value(self.history)
            .map_err(|e| AppError::Internal(format!("Corrupt history column: {e}")))?;

        Ok(UserProgress {
            xp: self.xp,
            level: self.level,
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
            last_activity_date: self.last_activity_date,
            daily_stats,
            history,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use stride_core::progress::{DailyStat, UserProgress};

    use super::ProgressRow;

    #[test]
    fn row_roundtrips_through_jsonb_columns() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let progress = UserProgress {
            xp: 120,
            level: 2,
            current_streak: 3,
            longest_streak: 5,
            last_activity_date: Some(date),
            daily_stats: vec![DailyStat {
                date,
                tasks_completed: 2,
                focus_time_minutes: 45,
            }],
            history: Vec::new(),
        };

        let row = ProgressRow {
            xp: progress.xp,
            level: progress.level,
            current_streak: progress.current_streak,
            longest_streak: progress.longest_streak,
            last_activity_date: progress.last_activity_date,
            daily_stats: serde_json::to_value(&progress.daily_stats).unwrap(),
            history: serde_json::to_value(&progress.history).unwrap(),
            version: 1,
        };

        assert_eq!(row.into_progress().unwrap(), progress);
    }
}
