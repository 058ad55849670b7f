mod config;
mod plan_cmds;
mod questions_cmd;
mod repair_cmd;
mod serve_cmd;
mod session_cmds;
mod weakness_cmds;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use coach_db::models::{Difficulty, SessionMode, Severity, WeaknessStatus};
use coach_db::{Gateway, pool};

use config::CoachConfig;

#[derive(Parser)]
#[command(name = "coach", about = "Interview coaching: question pool, training plans and practice")]
struct Cli {
    /// Database URL (overrides COACH_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a coach config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/coach")]
        db_url: String,
        /// API key for the completion service
        #[arg(long)]
        api_key: Option<String>,
        /// Base URL of the completion service
        #[arg(long)]
        api_url: Option<String>,
        /// Model name
        #[arg(long)]
        model: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the database if needed and run migrations
    DbInit,
    /// Question pool management
    Questions {
        #[command(subcommand)]
        command: QuestionCommands,
    },
    /// Training plan management
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Practice sessions
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Recorded weaknesses
    Weakness {
        #[command(subcommand)]
        command: WeaknessCommands,
    },
    /// Reconcile session, task and answer links
    Repair {
        /// Only repair records belonging to this plan
        #[arg(long, conflicts_with = "session")]
        plan: Option<Uuid>,
        /// Only repair records belonging to this session
        #[arg(long)]
        session: Option<Uuid>,
        /// Report inconsistencies without changing anything
        #[arg(long)]
        check: bool,
    },
    /// Serve the JSON API over HTTP
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 3001)]
        port: u16,
    },
}

#[derive(Subcommand)]
pub enum QuestionCommands {
    /// Make sure a category has enough questions, generating if short
    Ensure {
        /// Category slug (e.g. english-oral)
        category: String,
        /// Number of questions wanted
        #[arg(long, default_value_t = 5)]
        count: usize,
        /// Tailor generated questions to this school
        #[arg(long)]
        school: Option<String>,
        /// easy, medium or hard
        #[arg(long, default_value = "medium")]
        difficulty: Difficulty,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Generate and store a general training plan
    Generate {
        /// Student name
        #[arg(long)]
        student: String,
        /// Target school
        #[arg(long, default_value = "")]
        school: String,
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,
        /// Minutes per day
        #[arg(long, default_value_t = 30)]
        daily_minutes: i32,
    },
    /// Generate and store a plan targeting a recorded weakness
    FromWeakness {
        /// Weakness ID
        weakness_id: Uuid,
        /// Student name (defaults to the weakness record's)
        #[arg(long)]
        student: Option<String>,
        /// Target school
        #[arg(long, default_value = "")]
        school: String,
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,
        /// Minutes per day
        #[arg(long, default_value_t = 30)]
        daily_minutes: i32,
    },
    /// Show a plan and its tasks (omit plan_id to list plans)
    Show {
        /// Plan ID to show
        plan_id: Option<Uuid>,
    },
}

#[derive(Subcommand)]
pub enum SessionCommands {
    /// Start a practice session
    Start {
        /// Task to practise (omit for free practice)
        #[arg(long)]
        task: Option<Uuid>,
        /// Category (defaults to the task's)
        #[arg(long)]
        category: Option<String>,
        /// Number of questions
        #[arg(long, default_value_t = 5)]
        count: usize,
        /// text_qa or ai_interview
        #[arg(long, default_value = "text_qa")]
        mode: SessionMode,
    },
    /// Record an answer
    Answer {
        /// Session ID
        session_id: Uuid,
        /// Question text as asked
        #[arg(long)]
        question: String,
        /// The student's answer
        #[arg(long)]
        answer: String,
        /// Pool question ID, when the question came from the pool
        #[arg(long)]
        question_id: Option<Uuid>,
        /// Seconds taken to answer
        #[arg(long)]
        response_time: Option<i32>,
    },
    /// Mark a session completed
    Complete {
        /// Session ID
        session_id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum WeaknessCommands {
    /// Record a weakness observed in practice
    Record {
        /// Category slug (e.g. logic-thinking)
        category: String,
        /// Kind of weakness (e.g. grammar, structure)
        weakness_type: String,
        /// Student name
        #[arg(long)]
        student: Option<String>,
        /// low, medium or high
        #[arg(long, default_value = "medium")]
        severity: Severity,
        /// What goes wrong
        #[arg(long)]
        description: Option<String>,
        /// An answer that shows the weakness
        #[arg(long)]
        example: Option<String>,
        /// How to improve
        #[arg(long)]
        suggestion: Option<String>,
        /// Related topic (repeatable)
        #[arg(long = "topic")]
        topics: Vec<String>,
    },
    /// List weaknesses, newest first
    List {
        /// Only this student's weaknesses
        #[arg(long)]
        student: Option<String>,
        /// Only this category
        #[arg(long)]
        category: Option<String>,
        /// active, improved or resolved
        #[arg(long)]
        status: Option<WeaknessStatus>,
        /// low, medium or high
        #[arg(long)]
        severity: Option<Severity>,
        /// Maximum rows to show
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Show one weakness
    Show {
        /// Weakness ID
        weakness_id: Uuid,
    },
    /// Change a weakness's status
    Status {
        /// Weakness ID
        weakness_id: Uuid,
        /// active, improved or resolved
        status: WeaknessStatus,
    },
    /// Count weaknesses by category, severity and status
    Summary {
        /// Only this student's weaknesses
        #[arg(long)]
        student: Option<String>,
    },
}

/// Execute the `coach init` command: write config file.
fn cmd_init(
    db_url: &str,
    api_key: Option<String>,
    api_url: Option<String>,
    model: Option<String>,
    force: bool,
) -> Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let has_key = api_key.is_some();
    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        generator: config::GeneratorSection {
            api_url,
            api_key,
            model,
            timeout_secs: None,
        },
    };

    config::save_config_to(&path, &cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    if has_key {
        println!("  generator.api_key = (set)");
    } else {
        println!("  generator.api_key = (unset; templates and the stored pool will be used)");
    }
    println!();
    println!("Next: run `coach db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `coach db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> Result<()> {
    let resolved = CoachConfig::resolve(cli_db_url)?;

    println!("Initializing coach database...");

    if pool::ensure_database_exists(&resolved.db_config).await? {
        println!("Created database.");
    }
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("coach db-init complete.");
    Ok(())
}

async fn connect(resolved: &CoachConfig) -> Result<Gateway> {
    let db_pool = pool::create_pool(&resolved.db_config)
        .await
        .context("run `coach db-init` first if the database does not exist")?;
    Ok(Gateway::with_default_cache(db_pool))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            db_url,
            api_key,
            api_url,
            model,
            force,
        } => {
            cmd_init(&db_url, api_key, api_url, model, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Questions { command } => {
            let resolved = CoachConfig::resolve(cli.database_url.as_deref())?;
            let generator = resolved.build_generator()?;
            let gateway = connect(&resolved).await?;
            let result = questions_cmd::run_questions_command(command, &gateway, generator.as_ref()).await;
            gateway.close().await;
            result?;
        }
        Commands::Plan { command } => {
            let resolved = CoachConfig::resolve(cli.database_url.as_deref())?;
            let generator = resolved.build_generator()?;
            let gateway = connect(&resolved).await?;
            let result = plan_cmds::run_plan_command(command, &gateway, generator.as_ref()).await;
            gateway.close().await;
            result?;
        }
        Commands::Session { command } => {
            let resolved = CoachConfig::resolve(cli.database_url.as_deref())?;
            let generator = resolved.build_generator()?;
            let gateway = connect(&resolved).await?;
            let result = session_cmds::run_session_command(command, &gateway, generator.as_ref()).await;
            gateway.close().await;
            result?;
        }
        Commands::Weakness { command } => {
            let resolved = CoachConfig::resolve(cli.database_url.as_deref())?;
            let gateway = connect(&resolved).await?;
            let result = weakness_cmds::run_weakness_command(command, &gateway).await;
            gateway.close().await;
            result?;
        }
        Commands::Repair {
            plan,
            session,
            check,
        } => {
            let resolved = CoachConfig::resolve(cli.database_url.as_deref())?;
            let gateway = connect(&resolved).await?;
            let scope = repair_cmd::scope_from_flags(plan, session);
            let result = repair_cmd::run_repair(&gateway, scope, check).await;
            gateway.close().await;
            result?;
        }
        Commands::Serve { bind, port } => {
            let resolved = CoachConfig::resolve(cli.database_url.as_deref())?;
            let generator = resolved.build_generator()?;
            let gateway = connect(&resolved).await?;
            let result = serve_cmd::run_serve(gateway.clone(), generator, &bind, port).await;
            gateway.close().await;
            result?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod test_util {
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Serialize tests that touch process environment variables.
    pub fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }
}
