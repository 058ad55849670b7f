//! `coach session` subcommands.

use anyhow::Result;

use coach_core::generator::TextGenerator;
use coach_core::session::{Answer, StartSession, complete_session, record_answer, start_session};
use coach_db::Gateway;

use crate::SessionCommands;

pub async fn run_session_command(
    command: SessionCommands,
    gateway: &Gateway,
    generator: &dyn TextGenerator,
) -> Result<()> {
    match command {
        SessionCommands::Start {
            task,
            category,
            count,
            mode,
        } => {
            let started = start_session(
                gateway,
                generator,
                &StartSession {
                    task_id: task,
                    category,
                    mode,
                    question_count: count,
                },
            )
            .await?;
            println!("Session {} started ({}).", started.session.id, started.session.category);
            for (i, q) in started.questions.iter().enumerate() {
                println!("{:>3}. {}  [{}]", i + 1, q.question_text, q.id);
            }
            Ok(())
        }
        SessionCommands::Answer {
            session_id,
            question,
            answer,
            question_id,
            response_time,
        } => {
            let record = record_answer(
                gateway,
                &Answer {
                    session_id,
                    question_id,
                    question_text: question,
                    answer_text: answer,
                    response_time,
                },
            )
            .await?;
            match record.plan_id {
                Some(plan_id) => println!("Answer {} recorded for plan {plan_id}.", record.id),
                None => println!("Answer {} recorded (free practice).", record.id),
            }
            Ok(())
        }
        SessionCommands::Complete { session_id } => {
            let session = complete_session(gateway, session_id).await?;
            println!("Session {} is {}.", session.id, session.status);
            Ok(())
        }
    }
}
