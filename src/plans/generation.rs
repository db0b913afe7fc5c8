//! Training-plan generation through the LLM provider.
//!
//! The provider returns a JSON document that *should* match the canonical
//! plan shape; it is canonicalized before anything is stored, so a
//! malformed answer is repaired here instead of surfacing to the user.

use tracing::{info, warn};

use crate::provider::ModelProvider;
use crate::store::RunnerProfile;
use crate::utils::truncate_str;

use super::{canonicalize, PlanData};

/// System prompt for the coaching model. The product speaks Russian; the
/// prompt pins the reply to the canonical JSON shape.
pub const COACH_SYSTEM_PROMPT: &str = "Ты опытный беговой тренер. Твоя задача - создать \
персонализированный план тренировок на 7 дней, основываясь на профиле бегуна. \
План должен начинаться с указанной даты (или с сегодняшнего дня, если дата не указана) \
и быть структурирован по дням недели с конкретными датами. План должен включать \
детальное описание каждой тренировки (дистанция, темп, тип тренировки). \
Учитывай цель бегуна, его физическую подготовку и еженедельный объем. \
Отвечай только в указанном JSON формате на русском языке.";

fn field<T: std::fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "Неизвестно".to_string())
}

/// Build the user prompt from a runner profile.
pub fn build_coach_prompt(profile: &RunnerProfile) -> String {
    let start_date = profile
        .training_start_date
        .map(|d| d.format("%d.%m.%Y").to_string())
        .unwrap_or_else(|| "Сегодня".to_string());
    let competition_date = profile
        .competition_date
        .map(|d| d.format("%d.%m.%Y").to_string())
        .unwrap_or_else(|| "Неизвестно".to_string());

    let mut prompt = format!(
        "Создай персонализированный план беговых тренировок на 7 дней для бегуна \
         со следующим профилем:\n\n\
         - Целевая дистанция: {} км\n\
         - Дата соревнования: {}\n\
         - Дата начала тренировок: {}\n\
         - Пол: {}\n\
         - Возраст: {}\n\
         - Рост: {} см\n\
         - Вес: {} кг\n\
         - Цель: {}\n",
        field(&profile.distance),
        competition_date,
        start_date,
        field(&profile.gender),
        field(&profile.age),
        field(&profile.height),
        field(&profile.weight),
        field(&profile.goal),
    );

    if profile.goal.as_deref() == Some("Улучшить время") {
        prompt.push_str(&format!(
            "- Целевое время: {}\n",
            field(&profile.target_time)
        ));
    }

    prompt.push_str(&format!(
        "- Опыт бега: {}\n\
         - Уровень физической подготовки: {}\n\
         - Комфортный темп бега: {}\n\
         - Еженедельный объем бега: {} км\n\
         - Тренировочных дней в неделю: {}\n",
        field(&profile.experience),
        field(&profile.fitness_level),
        field(&profile.comfortable_pace),
        field(&profile.weekly_volume),
        field(&profile.training_days_per_week),
    ));

    if let Some(days) = &profile.preferred_training_days {
        prompt.push_str(&format!("- Предпочитаемые дни тренировок: {}\n", days));
    }

    prompt.push_str(
        "\nПлан должен включать разнообразные тренировки (длительные, темповые, \
         интервальные, восстановительные) с учетом уровня подготовки бегуна.\n\n\
         Для каждого дня недели укажи:\n\
         1. День недели\n\
         2. Тип тренировки\n\
         3. Дистанцию\n\
         4. Целевой темп\n\
         5. Детальное описание тренировки\n\n\
         Ответ предоставь в следующем JSON формате:\n\
         {\n\
         \x20 \"plan_name\": \"Название плана (включающее цель бегуна)\",\n\
         \x20 \"plan_description\": \"Общее описание плана\",\n\
         \x20 \"training_days\": [\n\
         \x20   {\n\
         \x20     \"day\": \"День недели (например, Понедельник)\",\n\
         \x20     \"date\": \"Дата в формате ДД.ММ.ГГГГ\",\n\
         \x20     \"training_type\": \"Тип тренировки\",\n\
         \x20     \"distance\": \"Дистанция в км\",\n\
         \x20     \"pace\": \"Целевой темп\",\n\
         \x20     \"description\": \"Подробное описание тренировки\"\n\
         \x20   }\n\
         \x20 ]\n\
         }",
    );

    prompt
}

/// Generate a plan for a runner and return it in canonical shape.
///
/// One retry on a failed call or unparseable answer; a *parseable but
/// malformed* answer is repaired via [`canonicalize`] rather than retried,
/// since the repaired plan is already usable.
pub async fn generate_plan(
    provider: &dyn ModelProvider,
    profile: &RunnerProfile,
) -> anyhow::Result<PlanData> {
    let prompt = build_coach_prompt(profile);

    let mut last_err = None;
    for attempt in 1..=2 {
        let content = match provider.chat_json(COACH_SYSTEM_PROMPT, &prompt).await {
            Ok(content) => content,
            Err(e) => {
                warn!(attempt, "Plan generation call failed: {}", e);
                last_err = Some(e);
                continue;
            }
        };

        let value: serde_json::Value = match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    attempt,
                    content = %truncate_str(&content, 200),
                    "Plan response is not valid JSON: {}",
                    e
                );
                last_err = Some(e.into());
                continue;
            }
        };

        let canonical = match canonicalize(&value) {
            None => value,
            Some((repaired, why)) => {
                warn!(?why, "Model returned a malformed plan, repaired before storage");
                repaired
            }
        };

        let plan: PlanData = serde_json::from_value(canonical)?;
        info!(
            plan_name = %plan.plan_name,
            days = plan.training_days.len(),
            "Generated training plan"
        );
        return Ok(plan);
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("plan generation failed")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ModelProvider;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Provider stub returning scripted responses in order.
    struct ScriptedProvider {
        responses: Mutex<Vec<anyhow::Result<String>>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<anyhow::Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        async fn chat_json(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            self.responses
                .lock()
                .unwrap()
                .remove(0)
        }
    }

    fn profile() -> RunnerProfile {
        RunnerProfile {
            user_id: 1,
            distance: Some(10.0),
            competition_date: None,
            gender: Some("М".to_string()),
            age: Some(34),
            height: Some(180.0),
            weight: Some(74.0),
            experience: Some("2 года".to_string()),
            goal: Some("Улучшить время".to_string()),
            target_time: Some("45:00".to_string()),
            fitness_level: Some("Средний".to_string()),
            comfortable_pace: Some("5:45 мин/км".to_string()),
            weekly_volume: Some(30.0),
            training_start_date: None,
            training_days_per_week: Some(3),
            preferred_training_days: Some("Пн, Ср, Сб".to_string()),
        }
    }

    fn valid_plan_json() -> String {
        serde_json::json!({
            "plan_name": "План на 10 км",
            "plan_description": "Неделя качества",
            "training_days": [
                {"day": "Понедельник", "date": "10.08.2026", "training_type": "Интервалы",
                 "distance": "8 км", "pace": "4:30 мин/км", "description": "10x400 через 200"}
            ]
        })
        .to_string()
    }

    #[test]
    fn prompt_contains_profile_fields_and_schema() {
        let prompt = build_coach_prompt(&profile());
        assert!(prompt.contains("10 км") || prompt.contains("10"));
        assert!(prompt.contains("Целевое время: 45:00"));
        assert!(prompt.contains("Комфортный темп бега: 5:45 мин/км"));
        assert!(prompt.contains("Предпочитаемые дни тренировок: Пн, Ср, Сб"));
        assert!(prompt.contains("\"training_days\""));
    }

    #[test]
    fn prompt_omits_target_time_for_other_goals() {
        let mut p = profile();
        p.goal = Some("Финишировать".to_string());
        let prompt = build_coach_prompt(&p);
        assert!(!prompt.contains("Целевое время"));
    }

    #[test]
    fn prompt_handles_sparse_profiles() {
        let sparse = RunnerProfile {
            user_id: 2,
            distance: None,
            competition_date: None,
            gender: None,
            age: None,
            height: None,
            weight: None,
            experience: None,
            goal: None,
            target_time: None,
            fitness_level: None,
            comfortable_pace: None,
            weekly_volume: None,
            training_start_date: None,
            training_days_per_week: None,
            preferred_training_days: None,
        };
        let prompt = build_coach_prompt(&sparse);
        assert!(prompt.contains("Неизвестно"));
        assert!(prompt.contains("Сегодня"));
    }

    #[tokio::test]
    async fn valid_answer_becomes_a_plan() {
        let provider = ScriptedProvider::new(vec![Ok(valid_plan_json())]);
        let plan = generate_plan(&provider, &profile()).await.unwrap();
        assert_eq!(plan.plan_name, "План на 10 км");
        assert_eq!(plan.training_days.len(), 1);
    }

    #[tokio::test]
    async fn nested_answer_is_repaired_not_rejected() {
        let nested = serde_json::json!({
            "plan_data": {
                "plan_name": "Вложенный",
                "training_days": [
                    {"day": "Среда", "date": "12.08.2026", "training_type": "Темп",
                     "distance": "7 км", "pace": "5:00 мин/км", "description": "3 км в темпе"}
                ]
            }
        })
        .to_string();
        let provider = ScriptedProvider::new(vec![Ok(nested)]);
        let plan = generate_plan(&provider, &profile()).await.unwrap();
        assert_eq!(plan.plan_name, "Вложенный");
        assert_eq!(plan.training_days.len(), 1);
    }

    #[tokio::test]
    async fn null_days_answer_gets_the_default_schedule() {
        let broken = serde_json::json!({
            "plan_name": "Пустой",
            "plan_description": "x",
            "training_days": null
        })
        .to_string();
        let provider = ScriptedProvider::new(vec![Ok(broken)]);
        let plan = generate_plan(&provider, &profile()).await.unwrap();
        assert_eq!(plan.training_days.len(), 3);
    }

    #[tokio::test]
    async fn one_bad_call_is_retried() {
        let provider = ScriptedProvider::new(vec![
            Err(anyhow::anyhow!("rate limited")),
            Ok(valid_plan_json()),
        ]);
        assert!(generate_plan(&provider, &profile()).await.is_ok());
    }

    #[tokio::test]
    async fn two_bad_calls_fail() {
        let provider = ScriptedProvider::new(vec![
            Ok("not json at all".to_string()),
            Err(anyhow::anyhow!("boom")),
        ]);
        assert!(generate_plan(&provider, &profile()).await.is_err());
    }
}
