//! Derived fields exposed to templates under the `calculated` scope.
//!
//! Each field is computed only when all of its inputs are answered; an absent field surfaces as a
//! render error if a template requires it.

use std::collections::BTreeMap;

use crate::workflows::intake::{IntakeResponses, QuestionId};

use super::context::ContextValue;

const CALORIES_PER_GRAM_PROTEIN: f64 = 4.0;
const CALORIES_PER_GRAM_CARB: f64 = 4.0;
const CALORIES_PER_GRAM_FAT: f64 = 9.0;
const FAT_SHARE_OF_CALORIES: f64 = 0.25;
const WATER_LITERS_PER_KG: f64 = 0.035;

/// Numeric inputs pulled from the answers.
#[derive(Debug, Clone, Copy, Default)]
struct BodyInputs {
    age: Option<f64>,
    weight_kg: Option<f64>,
    height_cm: Option<f64>,
    sex_offset: Option<f64>,
    activity_multiplier: Option<f64>,
    goal: Option<Goal>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Goal {
    LoseFat,
    BuildMuscle,
    Maintain,
}

impl Goal {
    fn calorie_factor(self) -> f64 {
        match self {
            Goal::LoseFat => 0.8,
            Goal::BuildMuscle => 1.1,
            Goal::Maintain => 1.0,
        }
    }

    fn protein_per_kg(self) -> f64 {
        match self {
            Goal::LoseFat | Goal::BuildMuscle => 2.0,
            Goal::Maintain => 1.6,
        }
    }
}

impl BodyInputs {
    fn from_answers(responses: &IntakeResponses) -> Self {
        let number = |id: &str| {
            responses
                .answered(&QuestionId::from(id))
                .and_then(|value| value.as_number())
        };
        let text = |id: &str| {
            responses
                .answered(&QuestionId::from(id))
                .map(|value| value.to_string())
        };

        Self {
            age: number("age"),
            weight_kg: number("weight_kg").filter(|weight| *weight > 0.0),
            height_cm: number("height_cm").filter(|height| *height > 0.0),
            sex_offset: text("sex").and_then(|sex| match sex.as_str() {
                "male" => Some(5.0),
                "female" => Some(-161.0),
                _ => None,
            }),
            activity_multiplier: text("activity_level").and_then(|level| match level.as_str() {
                "sedentary" => Some(1.2),
                "light" => Some(1.375),
                "moderate" => Some(1.55),
                "active" => Some(1.725),
                "very_active" => Some(1.9),
                _ => None,
            }),
            goal: text("primary_goal").map(|goal| match goal.as_str() {
                "lose_fat" => Goal::LoseFat,
                "build_muscle" => Goal::BuildMuscle,
                _ => Goal::Maintain,
            }),
        }
    }
}

/// Build the `calculated` scope from a finalized answer set.
pub fn calculated_fields(responses: &IntakeResponses) -> BTreeMap<String, ContextValue> {
    let inputs = BodyInputs::from_answers(responses);
    let mut fields = BTreeMap::new();

    if let Some(weight) = inputs.weight_kg {
        fields.insert("waterLiters".to_string(), round1(weight * WATER_LITERS_PER_KG).into());
    }

    if let (Some(weight), Some(height)) = (inputs.weight_kg, inputs.height_cm) {
        let meters = height / 100.0;
        fields.insert("bmi".to_string(), round1(weight / (meters * meters)).into());
    }

    let bmr = match (inputs.weight_kg, inputs.height_cm, inputs.age, inputs.sex_offset) {
        (Some(weight), Some(height), Some(age), Some(offset)) => {
            Some((10.0 * weight + 6.25 * height - 5.0 * age + offset).round())
        }
        _ => None,
    };
    let Some(bmr) = bmr else {
        return fields;
    };
    fields.insert("bmr".to_string(), bmr.into());

    let Some(multiplier) = inputs.activity_multiplier else {
        return fields;
    };
    let maintenance = (bmr * multiplier).round();
    fields.insert("maintenanceCalories".to_string(), maintenance.into());

    let (Some(goal), Some(weight)) = (inputs.goal, inputs.weight_kg) else {
        return fields;
    };
    let daily = (maintenance * goal.calorie_factor()).round();
    let protein = (weight * goal.protein_per_kg()).round();
    let fat = (daily * FAT_SHARE_OF_CALORIES / CALORIES_PER_GRAM_FAT).round();
    let carbs = ((daily - protein * CALORIES_PER_GRAM_PROTEIN - fat * CALORIES_PER_GRAM_FAT)
        / CALORIES_PER_GRAM_CARB)
        .max(0.0)
        .round();

    fields.insert("dailyCalories".to_string(), daily.into());
    fields.insert("proteinGrams".to_string(), protein.into());
    fields.insert("fatGrams".to_string(), fat.into());
    fields.insert("carbGrams".to_string(), carbs.into());
    fields.insert(
        "macroTable".to_string(),
        ContextValue::List(vec![
            macro_row("Protein", protein, CALORIES_PER_GRAM_PROTEIN),
            macro_row("Carbohydrates", carbs, CALORIES_PER_GRAM_CARB),
            macro_row("Fat", fat, CALORIES_PER_GRAM_FAT),
        ]),
    );

    fields
}

fn macro_row(name: &str, grams: f64, calories_per_gram: f64) -> ContextValue {
    let mut row = BTreeMap::new();
    row.insert("macro".to_string(), ContextValue::text(name));
    row.insert("grams".to_string(), ContextValue::Number(grams));
    row.insert(
        "calories".to_string(),
        ContextValue::Number((grams * calories_per_gram).round()),
    );
    ContextValue::Map(row)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
