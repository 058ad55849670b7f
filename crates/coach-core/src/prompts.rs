//! Prompt construction for the completion service.
//!
//! Pure string building; no I/O. The response shapes requested here are the
//! ones [`crate::response`] validates.

use std::fmt::Write as _;

use coach_db::models::{Difficulty, Weakness};

use crate::generator::ChatMessage;
use crate::plan::{DateRange, PlanRequest};

/// Sampling settings for question batches.
pub const QUESTION_TEMPERATURE: f32 = 0.8;
pub const QUESTION_MAX_TOKENS: u32 = 4000;

/// Sampling settings for training plans.
pub const PLAN_TEMPERATURE: f32 = 0.7;
pub const PLAN_MAX_TOKENS: u32 = 3000;

const SYSTEM_ROLE: &str = "You are an experienced coach preparing upper-primary students \
     (ages 10-12) for secondary school admission interviews. Reply with JSON only.";

/// Human-readable label for a category slug.
pub fn category_label(category: &str) -> &str {
    match category {
        "english-oral" => "English speaking",
        "chinese-oral" => "Chinese expression",
        "logic-thinking" => "logical thinking",
        "current-affairs" => "current affairs",
        "science-knowledge" => "science knowledge",
        "personal-growth" => "personal growth",
        "group-discussion" => "group discussion",
        other => other,
    }
}

fn category_focus(category: &str) -> Option<&'static str> {
    Some(match category {
        "english-oral" => {
            "Write the questions in English. Cover self-introduction, daily conversation, \
             picture description and impromptu speaking."
        }
        "chinese-oral" => {
            "Write the questions in Chinese. Cover reading aloud, discussing news, \
             reading comprehension and stating an opinion."
        }
        "logic-thinking" => "Cover applied maths, reasoning puzzles and problem solving.",
        "current-affairs" => "Base the questions on recent local and international news.",
        "science-knowledge" => {
            "Cover everyday science, environmental protection and technology (STEM)."
        }
        "personal-growth" => "Cover hobbies, learning experiences, ambitions and self-reflection.",
        "group-discussion" => "Use open topics suitable for a small-group discussion.",
        _ => return None,
    })
}

fn difficulty_label(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => "easy",
        Difficulty::Medium => "moderate",
        Difficulty::Hard => "challenging",
    }
}

/// Messages asking for `count` questions in one category.
pub fn question_batch(
    category: &str,
    difficulty: Difficulty,
    school_code: Option<&str>,
    count: usize,
) -> Vec<ChatMessage> {
    let mut prompt = format!(
        "Generate {count} {} interview questions at {} difficulty.\n",
        category_label(category),
        difficulty_label(difficulty),
    );
    if let Some(school) = school_code {
        let _ = writeln!(prompt, "Tailor them to the interview style of school {school}.");
    }
    if let Some(focus) = category_focus(category) {
        let _ = writeln!(prompt, "{focus}");
    }
    prompt.push_str(
        "\nReturn a JSON array. Each element must have:\n\
         - \"question_text\": the question (string)\n\
         - \"reference_answer\": key points of a good answer (string)\n\
         - \"tags\": short topic labels (array of strings)\n",
    );
    vec![ChatMessage::system(SYSTEM_ROLE), ChatMessage::user(prompt)]
}

fn schedule_block(range: &DateRange, daily_duration: i32) -> String {
    format!(
        "Training period: {} to {} ({} days), {} minutes per day.\n",
        range.start(),
        range.end(),
        range.total_days(),
        daily_duration
    )
}

fn response_shape(range: &DateRange, daily_duration: i32) -> String {
    format!(
        "\nReturn one JSON object:\n\
         {{\n  \"category_allocation\": {{\"<category>\": <percent>, ...}},\n  \
         \"ai_suggestions\": \"<advice for the student>\",\n  \
         \"daily_tasks\": [{{\"task_date\": \"{}\", \"category\": \"<category>\", \
         \"duration\": {}, \"question_ids\": []}}]\n}}\n\
         Percentages must add up to 100. Include one task for every day of the period.\n",
        range.start(),
        daily_duration
    )
}

fn category_list(categories: &[&str]) -> String {
    categories
        .iter()
        .map(|c| format!("- {c} ({})", category_label(c)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Messages asking for a general training plan.
pub fn training_plan(request: &PlanRequest, categories: &[&str]) -> Vec<ChatMessage> {
    let mut prompt = format!(
        "Create a training plan for {} who is applying to {}.\n",
        request.student_name, request.target_school
    );
    prompt.push_str(&schedule_block(&request.range, request.daily_duration));
    let _ = writeln!(prompt, "\nCategories:\n{}", category_list(categories));
    prompt.push_str("Weight the categories toward what the target school values.\n");
    prompt.push_str(&response_shape(&request.range, request.daily_duration));
    vec![ChatMessage::system(SYSTEM_ROLE), ChatMessage::user(prompt)]
}

/// Messages asking for a plan that targets one recorded weakness.
pub fn weakness_plan(
    request: &PlanRequest,
    weakness: &Weakness,
    categories: &[&str],
) -> Vec<ChatMessage> {
    let mut prompt = format!("Create a remedial training plan for {}", request.student_name);
    if !request.target_school.is_empty() {
        let _ = write!(prompt, " who is applying to {}", request.target_school);
    }
    prompt.push_str(".\n");
    prompt.push_str(&schedule_block(&request.range, request.daily_duration));
    let _ = writeln!(
        prompt,
        "\nWeakness to fix:\n- category: {} ({})\n- type: {}\n- severity: {}\n- description: {}",
        weakness.category,
        category_label(&weakness.category),
        weakness.weakness_type,
        weakness.severity,
        weakness.description
    );
    if let Some(example) = &weakness.example_text {
        let _ = writeln!(prompt, "- example: {example}");
    }
    if !weakness.related_topics.is_empty() {
        let _ = writeln!(prompt, "- related topics: {}", weakness.related_topics.join(", "));
    }
    let _ = writeln!(
        prompt,
        "\nGive {} at least 30% of the allocation and at least 40% of the days.",
        weakness.category
    );
    let _ = writeln!(prompt, "\nCategories:\n{}", category_list(categories));
    prompt.push_str(&response_shape(&request.range, request.daily_duration));
    vec![ChatMessage::system(SYSTEM_ROLE), ChatMessage::user(prompt)]
}
