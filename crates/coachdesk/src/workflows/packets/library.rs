use super::render::RenderError;
use super::template::{ContentBlock, ContentKind, PacketSection, PacketTemplate, PacketType};

/// Published packet templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    templates: Vec<PacketTemplate>,
}

impl TemplateLibrary {
    pub fn new(templates: Vec<PacketTemplate>) -> Self {
        Self { templates }
    }

    pub fn standard() -> Self {
        Self::new(vec![
            nutrition_template(),
            athlete_nutrition_template(),
            training_template(),
            lifestyle_template(),
        ])
    }

    pub fn templates(&self) -> &[PacketTemplate] {
        &self.templates
    }

    /// Segment-specific template first, then the packet type's default.
    pub fn select(
        &self,
        packet_type: PacketType,
        segment: Option<&str>,
    ) -> Result<&PacketTemplate, RenderError> {
        let candidates = || {
            self.templates
                .iter()
                .filter(move |template| template.packet_type == packet_type)
        };

        candidates()
            .find(|template| template.matches_segment(segment))
            .or_else(|| candidates().find(|template| template.is_default))
            .ok_or(RenderError::TemplateNotFound { packet_type })
    }
}

fn text(id: &str, content: &str) -> ContentBlock {
    ContentBlock::new(id, ContentKind::Text, content)
}

fn heading(id: &str, content: &str) -> ContentBlock {
    ContentBlock::new(id, ContentKind::Heading, content)
}

fn nutrition_template() -> PacketTemplate {
    PacketTemplate {
        id: "nutrition-standard".to_string(),
        packet_type: PacketType::Nutrition,
        segment: None,
        is_default: true,
        sections: vec![
            PacketSection::new("overview", "Overview", &["title", "greeting", "divider"]),
            PacketSection::new("targets", "Daily Targets", &["calories", "macros", "water"]),
            PacketSection::new("preferences", "Your Preferences", &["diet", "allergies"]),
        ],
        blocks: vec![
            heading("title", "{{packet.title}} for {{client.fullName}}"),
            text(
                "greeting",
                "Hi {{client.firstName}}, this plan was prepared on {{packet.requestedOn}}.",
            ),
            ContentBlock::new("divider", ContentKind::Divider, ""),
            text(
                "calories",
                "Eat about {{calculated.dailyCalories}} kcal per day \
                 (maintenance is {{calculated.maintenanceCalories}} kcal).",
            ),
            ContentBlock::new("macros", ContentKind::Table, "Macronutrient split")
                .with_data_source("calculated.macroTable"),
            text("water", "Aim for {{calculated.waterLiters}} liters of water daily."),
            text("diet", "Dietary preferences: {{answers.dietary_preferences}}")
                .with_optional(&["answers.dietary_preferences"]),
            text("allergies", "Allergies to avoid: {{answers.allergies}}")
                .with_optional(&["answers.allergies"]),
        ],
    }
}

fn athlete_nutrition_template() -> PacketTemplate {
    PacketTemplate {
        id: "nutrition-athlete".to_string(),
        packet_type: PacketType::Nutrition,
        segment: Some("athlete".to_string()),
        is_default: false,
        sections: vec![
            PacketSection::new("overview", "Overview", &["title"]),
            PacketSection::new("fuel", "Fueling", &["calories", "macros", "timing"]),
        ],
        blocks: vec![
            heading("title", "Performance {{packet.title}} for {{client.fullName}}"),
            text(
                "calories",
                "Training days: {{calculated.dailyCalories}} kcal with \
                 {{calculated.carbGrams}} g carbohydrates.",
            ),
            ContentBlock::new("macros", ContentKind::Table, "Macronutrient split")
                .with_data_source("calculated.macroTable"),
            text(
                "timing",
                "Front-load carbohydrates around your {{answers.training_days}} weekly sessions.",
            ),
        ],
    }
}

fn training_template() -> PacketTemplate {
    PacketTemplate {
        id: "training-standard".to_string(),
        packet_type: PacketType::Training,
        segment: None,
        is_default: true,
        sections: vec![
            PacketSection::new("overview", "Overview", &["title", "schedule"]),
            PacketSection::new("setup", "Setup", &["equipment", "limitations"]),
        ],
        blocks: vec![
            heading("title", "{{packet.title}} for {{client.fullName}}"),
            text(
                "schedule",
                "You will train {{answers.training_days}} days per week at a \
                 {{answers.activity_level}} baseline.",
            ),
            ContentBlock::new("equipment", ContentKind::List, "Equipment: {{answers.equipment}}")
                .with_optional(&["answers.equipment"]),
            text("limitations", "Limitations noted: {{answers.injury_details}}")
                .with_optional(&["answers.injury_details"]),
        ],
    }
}

fn lifestyle_template() -> PacketTemplate {
    PacketTemplate {
        id: "lifestyle-standard".to_string(),
        packet_type: PacketType::Lifestyle,
        segment: None,
        is_default: true,
        sections: vec![PacketSection::new(
            "recovery",
            "Recovery",
            &["title", "sleep", "stress", "notes"],
        )],
        blocks: vec![
            heading("title", "{{packet.title}} for {{client.fullName}}"),
            text(
                "sleep",
                "You reported {{answers.sleep_hours}} hours of sleep; we will build toward 7-9.",
            ),
            text("stress", "Current stress level: {{answers.stress_level}} out of 10."),
            text("notes", "Coach notes: {{answers.coach_notes}}")
                .with_optional(&["answers.coach_notes"]),
        ],
    }
}
