//! Training-plan data model and structure repair.
//!
//! Canonical plan shape, as stored in `training_plans.plan_data`:
//!
//! ```json
//! {
//!   "plan_name": "...",
//!   "plan_description": "...",
//!   "training_days": [
//!     {"day": "...", "date": "...", "training_type": "...",
//!      "distance": "...", "pace": "...", "description": "..."}
//!   ]
//! }
//! ```
//!
//! `training_days` must be a non-null, non-empty, flat list. The LLM does
//! not always honor that, and three malformations are known from
//! production data: a null list, an empty list, and the whole plan nested
//! one level too deep under a duplicate `plan_data` key. [`canonicalize`]
//! repairs all three; a plan without a recoverable day list falls back to a
//! fixed three-day default rather than ever reaching the user broken.

mod generation;
mod repair;

pub use generation::{build_coach_prompt, generate_plan, COACH_SYSTEM_PROMPT};
pub use repair::{repair_all_plans, RepairStats};

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// One scheduled training day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingDay {
    pub day: String,
    pub date: String,
    pub training_type: String,
    pub distance: String,
    pub pace: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

/// A complete training plan in canonical shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanData {
    pub plan_name: String,
    pub plan_description: String,
    pub training_days: Vec<TrainingDay>,
}

/// Which known malformation a stored plan exhibited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformation {
    NullTrainingDays,
    EmptyTrainingDays,
    NestedPlanData,
}

const FALLBACK_PLAN_NAME: &str = "План тренировок";
const FALLBACK_PLAN_DESCRIPTION: &str = "План тренировок для подготовки к марафону";

/// The fixed fallback schedule substituted when a plan has no recoverable
/// day list: an easy run, a tempo session, and a long run.
pub fn default_training_days() -> Vec<TrainingDay> {
    let today = Local::now().format("%d.%m.%Y").to_string();
    vec![
        TrainingDay {
            day: "Понедельник".to_string(),
            date: today.clone(),
            training_type: "Легкая пробежка".to_string(),
            distance: "5 км".to_string(),
            pace: "6:00-6:30 мин/км".to_string(),
            description: "Легкая восстановительная пробежка в комфортном темпе.".to_string(),
            purpose: None,
        },
        TrainingDay {
            day: "Среда".to_string(),
            date: today.clone(),
            training_type: "Темповая тренировка".to_string(),
            distance: "7 км".to_string(),
            pace: "5:30-6:00 мин/км".to_string(),
            description: "Разминка 2 км, темповая часть 3 км, заминка 2 км.".to_string(),
            purpose: None,
        },
        TrainingDay {
            day: "Суббота".to_string(),
            date: today,
            training_type: "Длительная пробежка".to_string(),
            distance: "10 км".to_string(),
            pace: "6:00-6:30 мин/км".to_string(),
            description: "Длительная пробежка в аэробном темпе для развития выносливости."
                .to_string(),
            purpose: None,
        },
    ]
}

fn default_days_value() -> Value {
    serde_json::to_value(default_training_days()).unwrap_or_else(|_| json!([]))
}

fn string_or<'a>(value: &'a Value, key: &str, fallback: &'a str) -> &'a str {
    value[key].as_str().filter(|s| !s.is_empty()).unwrap_or(fallback)
}

/// Repair a stored plan value into canonical shape.
///
/// Returns `None` when the value is already canonical (so a second pass over
/// repaired data writes nothing), or the repaired value together with the
/// malformation that was found.
///
/// Repair rules, matching what production data required:
/// - nested `plan_data` key: the plan is rebuilt as the flat triple, taking
///   `plan_name`/`plan_description` from whichever level has them and the
///   day list from the inner object (falling back to the default schedule
///   if the inner list is empty too); the duplicate key is dropped.
/// - null/missing/non-array `training_days`: the default schedule is
///   substituted, all other keys untouched.
/// - empty `training_days` array: same substitution.
pub fn canonicalize(value: &Value) -> Option<(Value, Malformation)> {
    // Nested takes precedence: a plan with both a flat and a nested day
    // list was produced by double-wrapping and the inner one is the real
    // schedule.
    if !value["plan_data"]["training_days"].is_null() {
        let inner = &value["plan_data"];
        let days = match inner["training_days"].as_array() {
            Some(days) if !days.is_empty() => Value::Array(days.clone()),
            _ => default_days_value(),
        };
        let plan_name = string_or(
            value,
            "plan_name",
            string_or(inner, "plan_name", FALLBACK_PLAN_NAME),
        );
        let plan_description = string_or(
            value,
            "plan_description",
            string_or(inner, "plan_description", FALLBACK_PLAN_DESCRIPTION),
        );
        let repaired = json!({
            "plan_name": plan_name,
            "plan_description": plan_description,
            "training_days": days,
        });
        return Some((repaired, Malformation::NestedPlanData));
    }

    let object = match value.as_object() {
        Some(object) => object,
        // not even an object: nothing recoverable, rebuild from scratch
        None => {
            let repaired = json!({
                "plan_name": FALLBACK_PLAN_NAME,
                "plan_description": FALLBACK_PLAN_DESCRIPTION,
                "training_days": default_days_value(),
            });
            return Some((repaired, Malformation::NullTrainingDays));
        }
    };

    match object.get("training_days") {
        Some(Value::Array(days)) if !days.is_empty() => None,
        Some(Value::Array(_)) => Some((
            with_default_days(object),
            Malformation::EmptyTrainingDays,
        )),
        _ => Some((with_default_days(object), Malformation::NullTrainingDays)),
    }
}

fn with_default_days(object: &Map<String, Value>) -> Value {
    let mut repaired = object.clone();
    repaired.insert("training_days".to_string(), default_days_value());
    Value::Object(repaired)
}
