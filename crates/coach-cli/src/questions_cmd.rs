//! `coach questions` subcommands.

use anyhow::Result;

use coach_core::generator::TextGenerator;
use coach_core::questions::{QuestionRequest, Tier, ensure_available_detailed};
use coach_db::Gateway;

use crate::QuestionCommands;

pub async fn run_questions_command(
    command: QuestionCommands,
    gateway: &Gateway,
    generator: &dyn TextGenerator,
) -> Result<()> {
    match command {
        QuestionCommands::Ensure {
            category,
            count,
            school,
            difficulty,
        } => {
            let mut request = QuestionRequest::new(category, count).with_difficulty(difficulty);
            if let Some(school) = school {
                request = request.with_school(school);
            }
            cmd_ensure(gateway, generator, &request).await
        }
    }
}

async fn cmd_ensure(
    gateway: &Gateway,
    generator: &dyn TextGenerator,
    request: &QuestionRequest,
) -> Result<()> {
    let result = ensure_available_detailed(gateway, generator, request).await;

    let source = match result.tier {
        Tier::Pool => "existing pool",
        Tier::Generated => "pool topped up with generated questions",
        Tier::Degraded => "pool topped up with generic generated questions",
        Tier::Fallback => "existing pool (generation failed)",
    };
    println!(
        "{} of {} questions available for {} ({source}).",
        result.questions.len(),
        request.count,
        request.category
    );
    if let Some(batch) = &result.batch {
        println!(
            "  Generated: {} stored, {} failed",
            batch.succeeded.len(),
            batch.failed.len()
        );
        for failure in &batch.failed {
            println!("    ! {}: {}", failure.item.question_text, failure.error);
        }
    }
    println!();
    for (i, q) in result.questions.iter().enumerate() {
        println!("{:>3}. [{}] {}", i + 1, q.source, q.question_text);
    }
    Ok(())
}
