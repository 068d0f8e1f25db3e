use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

mod ai;
mod config;
mod db;
mod error;
mod models;
mod planner;
mod recovery;
mod report;
mod risk;

use config::AppConfig;
use models::{Notification, RecoveryPlan, RiskLevel, Student};
use recovery::RecoveryPlanGenerator;

#[derive(Parser)]
#[command(name = "risk-monitor")]
#[command(about = "Student dropout risk scoring and recovery plans", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: AppConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the demo student roster
    Seed,
    /// Import students from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Recompute risk assessments and raise alerts for new high-risk students
    Assess {
        #[arg(long)]
        student: Option<String>,
    },
    /// List students by risk score
    Roster {
        #[arg(long)]
        level: Option<RiskLevel>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Manage recovery plans
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Show unread risk alerts
    Alerts {
        #[arg(long)]
        mark_read: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Generate a new recovery plan, replacing the active one
    Generate {
        #[arg(long)]
        student: String,
    },
    /// Show the active plan, or every plan with --history
    Show {
        #[arg(long)]
        student: String,
        #[arg(long)]
        history: bool,
    },
    /// Mark a schedule day as done (or not done with --undo)
    Complete {
        #[arg(long)]
        plan: Uuid,
        #[arg(long)]
        day: usize,
        #[arg(long)]
        undo: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let database_url = cli.config.database_url()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let count = db::seed(&pool).await?;
            println!("Seeded {count} students.");
        }
        Commands::Import { csv } => {
            let imported = db::import_csv(&pool, &csv).await?;
            println!("Imported {imported} students from {}.", csv.display());
        }
        Commands::Assess { student } => {
            assess(&pool, student.as_deref()).await?;
        }
        Commands::Roster { level, limit } => {
            let students = db::fetch_students(&pool, level).await?;
            if students.is_empty() {
                println!("No students found.");
                return Ok(());
            }

            let stats = models::RiskStats::from_students(&students);
            println!(
                "{} students: {} high, {} medium, {} low",
                stats.total, stats.high, stats.medium, stats.low
            );
            for student in students.iter().take(limit) {
                print_student(student);
            }
        }
        Commands::Plan { command } => run_plan_command(&pool, &cli.config, command).await?,
        Commands::Alerts { mark_read } => {
            let notifications = db::fetch_unread_notifications(&pool).await?;
            if notifications.is_empty() {
                println!("No unread alerts.");
            }
            for notification in &notifications {
                println!(
                    "- [{}] {}: {}",
                    notification.created_at.format("%Y-%m-%d %H:%M"),
                    notification.title,
                    notification.message
                );
            }
            if mark_read {
                let updated = db::mark_notifications_read(&pool).await?;
                println!("Marked {updated} alerts as read.");
            }
        }
        Commands::Report { out } => {
            let students = db::fetch_students(&pool, None).await?;
            let plans = db::fetch_active_plans(&pool).await?;
            let report = report::build_report(chrono::Utc::now(), &students, &plans);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn assess(pool: &PgPool, student_id: Option<&str>) -> anyhow::Result<()> {
    let students = match student_id {
        Some(id) => {
            let student = db::fetch_student(pool, id)
                .await?
                .with_context(|| format!("student not found: {id}"))?;
            vec![student]
        }
        None => db::fetch_students(pool, None).await?,
    };

    let mut alerts = 0usize;
    for mut student in students {
        let previous = student.assessment.level;
        let assessment = risk::assess(&student.performance);
        db::record_assessment(pool, &student.id, &assessment).await?;
        student.assessment = assessment;

        if risk::escalated(previous, student.assessment.level) {
            db::insert_notification(pool, &Notification::risk_alert(&student)).await?;
            info!(student_id = %student.id, from = %previous, "Student escalated to high risk");
            alerts += 1;
        }
        print_student(&student);
    }

    println!("Raised {alerts} new high-risk alerts.");
    Ok(())
}

async fn run_plan_command(
    pool: &PgPool,
    config: &AppConfig,
    command: PlanCommands,
) -> anyhow::Result<()> {
    match command {
        PlanCommands::Generate { student } => {
            if config.gemini_api_key.is_none() {
                warn!("GEMINI_API_KEY not set; generating a rule-based plan");
            }
            let generator = RecoveryPlanGenerator::new(
                db::PgStore::new(pool.clone()),
                config.ai_adapter(),
                config.ai_timeout(),
            );
            let plan_id = generator
                .generate(&student)
                .await
                .context("could not generate plan")?;

            if let Some(plan) = db::fetch_plan(pool, plan_id).await? {
                print_plan(&plan);
            } else {
                println!("Generated plan {plan_id}.");
            }
        }
        PlanCommands::Show { student, history } => {
            let plans = db::fetch_plans_for_student(pool, &student).await?;
            let shown: Vec<&RecoveryPlan> = if history {
                plans.iter().collect()
            } else {
                plans.iter().filter(|p| p.is_active).take(1).collect()
            };

            if shown.is_empty() {
                println!("No recovery plan for {student}.");
            }
            for plan in shown {
                print_plan(plan);
            }
        }
        PlanCommands::Complete { plan, day, undo } => {
            let mut recovery_plan = db::fetch_plan(pool, plan)
                .await?
                .with_context(|| format!("recovery plan not found: {plan}"))?;
            recovery_plan.set_completed(day, !undo)?;
            db::save_progress(pool, &recovery_plan).await?;
            println!(
                "Plan {} is {:.0}% complete.",
                recovery_plan.id, recovery_plan.progress_percentage
            );
        }
    }

    Ok(())
}

fn print_student(student: &Student) {
    println!(
        "- {} ({}, {}, {}) {} risk, score {}, assessed {}{}",
        student.name,
        student.id,
        student.email,
        student.course,
        student.assessment.level,
        student.assessment.score,
        student.last_assessed_at.format("%Y-%m-%d"),
        if student.assessment.factors.is_empty() {
            String::new()
        } else {
            format!(": {}", student.assessment.factors.join(", "))
        }
    );
}

fn print_plan(plan: &RecoveryPlan) {
    let content = &plan.content;
    println!(
        "Plan {} for {} ({} risk, {}, {})",
        plan.id,
        plan.student_id,
        plan.risk_level,
        plan.provenance,
        if plan.is_active { "active" } else { "superseded" }
    );
    println!(
        "Generated {}, {:.0}% complete",
        plan.generated_at.format("%Y-%m-%d %H:%M"),
        plan.progress_percentage
    );
    println!("Weak topics: {}", content.weak_topics.join(", "));
    println!("Daily study hours: {}", content.daily_study_hours);
    println!("Schedule:");
    for (index, entry) in content.schedule.iter().enumerate() {
        println!(
            "  [{}] {}. {}: {} ({})",
            if entry.completed { "x" } else { " " },
            index,
            entry.day,
            entry.focus,
            entry.duration
        );
    }
    println!("Resources:");
    for resource in &content.resources {
        println!("  - {} ({:?}): {}", resource.title, resource.kind, resource.description);
    }
    println!("Strategies:");
    for strategy in &content.strategies {
        println!("  - {strategy}");
    }
    println!();
}
