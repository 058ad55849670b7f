//! `coach weakness` subcommands.
//!
//! - `coach weakness record <category> <type>`  -- store a new weakness
//! - `coach weakness list`                      -- list weaknesses, newest first
//! - `coach weakness show <id>`                 -- show one weakness
//! - `coach weakness status <id> <status>`      -- move a weakness to a new status
//! - `coach weakness summary`                   -- counts by category, severity and status

use anyhow::Result;
use uuid::Uuid;

use coach_core::weakness::{
    RecordWeakness, WeaknessQuery, get_weakness, list_weaknesses, record_weakness,
    set_weakness_status, weakness_summary,
};
use coach_db::models::Weakness;
use coach_db::{Gateway, Page};

use crate::WeaknessCommands;

pub async fn run_weakness_command(command: WeaknessCommands, gateway: &Gateway) -> Result<()> {
    match command {
        WeaknessCommands::Record {
            category,
            weakness_type,
            student,
            severity,
            description,
            example,
            suggestion,
            topics,
        } => {
            let input = RecordWeakness {
                student_name: student,
                category,
                weakness_type,
                severity,
                description: description.unwrap_or_default(),
                example_text: example,
                improvement_suggestions: suggestion,
                related_topics: topics,
            };
            let weakness = record_weakness(gateway, &input).await?;
            println!("Weakness recorded.");
            print_weakness(&weakness);
            Ok(())
        }
        WeaknessCommands::List {
            student,
            category,
            status,
            severity,
            limit,
        } => {
            let query = WeaknessQuery {
                student_name: student,
                category,
                status,
                severity,
            };
            let rows = list_weaknesses(gateway, &query, Page::new(limit, 0)).await?;
            print_table(&rows);
            Ok(())
        }
        WeaknessCommands::Show { weakness_id } => {
            let weakness = get_weakness(gateway, weakness_id).await?;
            print_weakness(&weakness);
            Ok(())
        }
        WeaknessCommands::Status {
            weakness_id,
            status,
        } => {
            let weakness = set_weakness_status(gateway, weakness_id, status).await?;
            println!("Weakness {} is now {}.", weakness.id, weakness.status);
            Ok(())
        }
        WeaknessCommands::Summary { student } => cmd_summary(gateway, student.as_deref()).await,
    }
}

async fn cmd_summary(gateway: &Gateway, student: Option<&str>) -> Result<()> {
    let summary = weakness_summary(gateway, student).await?;
    println!("Weaknesses: {}", summary.total);
    for (title, counts) in [
        ("By category", &summary.by_category),
        ("By severity", &summary.by_severity),
        ("By status", &summary.by_status),
    ] {
        if counts.is_empty() {
            continue;
        }
        println!();
        println!("  {title}:");
        for (key, count) in counts {
            println!("    {key:<20} {count:>5}");
        }
    }
    Ok(())
}

fn print_table(rows: &[Weakness]) {
    if rows.is_empty() {
        println!("No weaknesses found.");
        return;
    }
    println!(
        "{:<36}  {:<8}  {:<8}  {:<20}  {:<16}  STUDENT",
        "ID", "STATUS", "SEVERITY", "CATEGORY", "TYPE"
    );
    for w in rows {
        println!(
            "{:<36}  {:<8}  {:<8}  {:<20}  {:<16}  {}",
            w.id,
            w.status.as_str(),
            w.severity.as_str(),
            w.category,
            w.weakness_type,
            w.student_name.as_deref().unwrap_or("-")
        );
    }
}

fn print_weakness(w: &Weakness) {
    println!();
    println!("  Weakness ID: {}", w.id);
    if let Some(student) = &w.student_name {
        println!("  Student:     {student}");
    }
    println!("  Category:    {}", w.category);
    println!("  Type:        {}", w.weakness_type);
    println!("  Severity:    {}", w.severity);
    println!("  Status:      {}", w.status);
    println!("  Recorded:    {}", w.created_at.format("%Y-%m-%d %H:%M"));
    if !w.description.is_empty() {
        println!("  Description: {}", w.description);
    }
    if let Some(example) = &w.example_text {
        println!("  Example:     {example}");
    }
    if let Some(suggestion) = &w.improvement_suggestions {
        println!("  Suggestion:  {suggestion}");
    }
    if !w.related_topics.is_empty() {
        println!("  Topics:      {}", w.related_topics.join(", "));
    }
}
