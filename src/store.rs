//! Postgres access for users, runner profiles, and training plans.

use chrono::NaiveDate;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;

use crate::plans::PlanData;

/// A runner's questionnaire profile, as stored in `runner_profiles`.
/// Every field beyond the user id is optional — profiles fill in gradually
/// as the questionnaire progresses.
#[derive(Debug, Clone)]
pub struct RunnerProfile {
    pub user_id: i32,
    pub distance: Option<f64>,
    pub competition_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub age: Option<i32>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub experience: Option<String>,
    pub goal: Option<String>,
    pub target_time: Option<String>,
    pub fitness_level: Option<String>,
    pub comfortable_pace: Option<String>,
    pub weekly_volume: Option<f64>,
    pub training_start_date: Option<NaiveDate>,
    pub training_days_per_week: Option<i32>,
    pub preferred_training_days: Option<String>,
}

pub struct PlanStore {
    pool: PgPool,
}

impl PlanStore {
    /// Connect and make sure the schema exists. Production databases
    /// already have these tables; fresh installs get them created.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id SERIAL PRIMARY KEY,
                telegram_id BIGINT UNIQUE NOT NULL,
                username VARCHAR(255),
                first_name VARCHAR(255),
                last_name VARCHAR(255),
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runner_profiles (
                id SERIAL PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id),
                distance DOUBLE PRECISION,
                competition_date DATE,
                gender VARCHAR(10),
                age INTEGER,
                height DOUBLE PRECISION,
                weight DOUBLE PRECISION,
                experience VARCHAR(50),
                goal VARCHAR(255),
                target_time VARCHAR(20),
                fitness_level VARCHAR(50),
                comfortable_pace VARCHAR(20),
                weekly_volume DOUBLE PRECISION DEFAULT 0,
                training_start_date DATE,
                training_days_per_week INTEGER,
                preferred_training_days VARCHAR(255),
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS training_plans (
                id SERIAL PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id),
                plan_name VARCHAR(255),
                plan_description TEXT,
                plan_data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Database schema ready");
        Ok(())
    }

    pub async fn find_user_by_telegram_id(&self, telegram_id: i64) -> anyhow::Result<Option<i32>> {
        let row = sqlx::query("SELECT id FROM users WHERE telegram_id = $1")
            .bind(telegram_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("id")))
    }

    /// Most recent profile for a user, if the questionnaire was completed.
    pub async fn profile_for_user(&self, user_id: i32) -> anyhow::Result<Option<RunnerProfile>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, distance, competition_date, gender, age, height, weight,
                   experience, goal, target_time, fitness_level, comfortable_pace,
                   weekly_volume, training_start_date, training_days_per_week,
                   preferred_training_days
            FROM runner_profiles
            WHERE user_id = $1
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| RunnerProfile {
            user_id: r.get("user_id"),
            distance: r.get("distance"),
            competition_date: r.get("competition_date"),
            gender: r.get("gender"),
            age: r.get("age"),
            height: r.get("height"),
            weight: r.get("weight"),
            experience: r.get("experience"),
            goal: r.get("goal"),
            target_time: r.get("target_time"),
            fitness_level: r.get("fitness_level"),
            comfortable_pace: r.get("comfortable_pace"),
            weekly_volume: r.get("weekly_volume"),
            training_start_date: r.get("training_start_date"),
            training_days_per_week: r.get("training_days_per_week"),
            preferred_training_days: r.get("preferred_training_days"),
        }))
    }

    /// Store a generated plan and return its id.
    pub async fn insert_plan(&self, user_id: i32, plan: &PlanData) -> anyhow::Result<i32> {
        let plan_data = serde_json::to_value(plan)?;
        let row = sqlx::query(
            r#"
            INSERT INTO training_plans (user_id, plan_name, plan_description, plan_data)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(&plan.plan_name)
        .bind(&plan.plan_description)
        .bind(&plan_data)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    /// Latest stored plan for a user.
    pub async fn latest_plan(&self, user_id: i32) -> anyhow::Result<Option<(i32, Value)>> {
        let row = sqlx::query(
            r#"
            SELECT id, plan_data FROM training_plans
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| (r.get("id"), r.get("plan_data"))))
    }
}
