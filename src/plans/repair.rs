//! One-off batch repair of stored training plans.
//!
//! Scans every `training_plans` row, rewrites the malformed ones to
//! canonical shape, and commits everything in a single transaction — any
//! unexpected error rolls the whole batch back.

use serde_json::Value;
use sqlx::{PgPool, Row};
use tracing::{info, warn};

use super::{canonicalize, Malformation};

/// Counters from a repair run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RepairStats {
    pub total_plans: usize,
    pub null_training_days: usize,
    pub empty_training_days: usize,
    pub nested_structure: usize,
    pub repaired: usize,
}

impl RepairStats {
    fn count(&mut self, malformation: Malformation) {
        match malformation {
            Malformation::NullTrainingDays => self.null_training_days += 1,
            Malformation::EmptyTrainingDays => self.empty_training_days += 1,
            Malformation::NestedPlanData => self.nested_structure += 1,
        }
        self.repaired += 1;
    }
}

/// Check every stored plan and rewrite the malformed ones.
///
/// Idempotent: a second run over repaired data finds nothing to write.
pub async fn repair_all_plans(pool: &PgPool) -> anyhow::Result<RepairStats> {
    let mut stats = RepairStats::default();
    let mut tx = pool.begin().await?;

    let rows = sqlx::query("SELECT id, plan_data FROM training_plans ORDER BY id")
        .fetch_all(&mut *tx)
        .await?;
    stats.total_plans = rows.len();

    for row in rows {
        let id: i32 = row.try_get("id")?;
        let plan_data: Value = row.try_get("plan_data")?;

        let Some((repaired, why)) = canonicalize(&plan_data) else {
            continue;
        };

        sqlx::query("UPDATE training_plans SET plan_data = $1 WHERE id = $2")
            .bind(&repaired)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        stats.count(why);
        info!(plan_id = id, malformation = ?why, "Repaired training plan");
    }

    // errors above abort via `?`, dropping the transaction -> full rollback
    tx.commit().await?;

    if stats.repaired == 0 {
        info!(total = stats.total_plans, "All training plans are canonical");
    } else {
        warn!(
            total = stats.total_plans,
            repaired = stats.repaired,
            null = stats.null_training_days,
            empty = stats.empty_training_days,
            nested = stats.nested_structure,
            "Training plan repair complete"
        );
    }

    Ok(stats)
}
