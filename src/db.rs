use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Notification, Provenance, RecoveryPlan, RecoveryPlanContent, Resource, RiskAssessment,
    RiskLevel, ScheduleEntry, Student, StudentPerformanceRecord,
};
use crate::recovery::{PlanStore, StudentStore};
use crate::risk;

const STUDENT_COLUMNS: &str = "id, full_name, email, course, attendance_percentage, quiz_scores, \
     assignments_submitted, total_assignments, engagement_score, risk_score, risk_level, \
     risk_factors, last_assessed_at";

const PLAN_COLUMNS: &str = "id, student_id, risk_level, weak_topics, daily_study_hours, schedule, \
     resources, strategies, generated_by, ai_model, is_active, progress_percentage, \
     generated_at, created_at, updated_at";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub id: String,
    pub name: String,
    pub email: String,
    pub course: String,
    pub performance: StudentPerformanceRecord,
}

/// Inserts or refreshes a student and records a fresh assessment for it.
pub async fn upsert_student(pool: &PgPool, student: &NewStudent) -> anyhow::Result<RiskAssessment> {
    let assessment = risk::assess(&student.performance);
    let record = &student.performance;

    sqlx::query(
        r#"
        INSERT INTO student_risk.students
        (id, full_name, email, course, attendance_percentage, quiz_scores,
         assignments_submitted, total_assignments, engagement_score,
         risk_score, risk_level, risk_factors, last_assessed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now())
        ON CONFLICT (id) DO UPDATE
        SET full_name = EXCLUDED.full_name,
            email = EXCLUDED.email,
            course = EXCLUDED.course,
            attendance_percentage = EXCLUDED.attendance_percentage,
            quiz_scores = EXCLUDED.quiz_scores,
            assignments_submitted = EXCLUDED.assignments_submitted,
            total_assignments = EXCLUDED.total_assignments,
            engagement_score = EXCLUDED.engagement_score,
            risk_score = EXCLUDED.risk_score,
            risk_level = EXCLUDED.risk_level,
            risk_factors = EXCLUDED.risk_factors,
            last_assessed_at = EXCLUDED.last_assessed_at,
            updated_at = now()
        "#,
    )
    .bind(&student.id)
    .bind(&student.name)
    .bind(&student.email)
    .bind(&student.course)
    .bind(record.attendance_percentage)
    .bind(&record.quiz_scores)
    .bind(i32::try_from(record.assignments_submitted)?)
    .bind(i32::try_from(record.total_assignments)?)
    .bind(record.engagement_score)
    .bind(assessment.score as i32)
    .bind(assessment.level.as_str())
    .bind(&assessment.factors)
    .execute(pool)
    .await
    .with_context(|| format!("failed to store student {}", student.id))?;

    Ok(assessment)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let roster: [(&str, &str, &str, &str, f64, &[f64], u32, u32, f64); 10] = [
        (
            "STU001",
            "Marcus Chen",
            "marcus.chen@university.edu",
            "Data Structures",
            45.0,
            &[42.0, 38.0, 35.0, 40.0, 32.0, 28.0, 25.0, 30.0],
            3,
            10,
            25.0,
        ),
        (
            "STU002",
            "Priya Patel",
            "priya.patel@university.edu",
            "Machine Learning Basics",
            52.0,
            &[55.0, 48.0, 42.0, 38.0, 35.0, 30.0, 28.0, 25.0],
            4,
            10,
            30.0,
        ),
        (
            "STU003",
            "Emma Johnson",
            "emma.johnson@university.edu",
            "Web Development",
            68.0,
            &[65.0, 58.0, 62.0, 55.0, 60.0, 52.0, 58.0, 55.0],
            6,
            10,
            55.0,
        ),
        (
            "STU004",
            "David Kim",
            "david.kim@university.edu",
            "Computer Science 101",
            72.0,
            &[70.0, 62.0, 58.0, 65.0, 55.0, 60.0, 52.0, 58.0],
            7,
            10,
            58.0,
        ),
        (
            "STU005",
            "Sofia Rodriguez",
            "sofia.rodriguez@university.edu",
            "Database Systems",
            65.0,
            &[58.0, 55.0, 60.0, 52.0, 58.0, 55.0, 50.0, 55.0],
            6,
            10,
            52.0,
        ),
        (
            "STU006",
            "Alex Thompson",
            "alex.thompson@university.edu",
            "Data Structures",
            70.0,
            &[62.0, 58.0, 55.0, 60.0, 58.0, 62.0, 55.0, 58.0],
            7,
            10,
            60.0,
        ),
        (
            "STU007",
            "Jessica Liu",
            "jessica.liu@university.edu",
            "Machine Learning Basics",
            95.0,
            &[92.0, 88.0, 95.0, 90.0, 87.0, 93.0, 91.0, 89.0],
            10,
            10,
            92.0,
        ),
        (
            "STU008",
            "Ryan O'Connor",
            "ryan.oconnor@university.edu",
            "Web Development",
            88.0,
            &[85.0, 82.0, 88.0, 80.0, 86.0, 84.0, 87.0, 83.0],
            9,
            10,
            85.0,
        ),
        (
            "STU009",
            "Aisha Mohammed",
            "aisha.mohammed@university.edu",
            "Computer Science 101",
            92.0,
            &[90.0, 85.0, 92.0, 88.0, 91.0, 87.0, 89.0, 86.0],
            10,
            10,
            88.0,
        ),
        (
            "STU010",
            "Tyler Washington",
            "tyler.washington@university.edu",
            "Database Systems",
            90.0,
            &[88.0, 84.0, 90.0, 82.0, 88.0, 85.0, 86.0, 84.0],
            9,
            10,
            82.0,
        ),
    ];

    for (id, name, email, course, attendance, quizzes, submitted, total, engagement) in roster {
        upsert_student(
            pool,
            &NewStudent {
                id: id.to_string(),
                name: name.to_string(),
                email: email.to_string(),
                course: course.to_string(),
                performance: StudentPerformanceRecord {
                    attendance_percentage: attendance,
                    quiz_scores: quizzes.to_vec(),
                    assignments_submitted: submitted,
                    total_assignments: total,
                    engagement_score: engagement,
                },
            },
        )
        .await?;
    }

    Ok(roster.len())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: String,
        name: String,
        email: String,
        course: String,
        attendance_percentage: f64,
        quiz_scores: String,
        assignments_submitted: u32,
        total_assignments: u32,
        engagement_score: f64,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut imported = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid CSV record {}", line + 1))?;
        let quiz_scores = parse_quiz_scores(&row.quiz_scores)
            .with_context(|| format!("invalid quiz scores for {}", row.student_id))?;

        let student = NewStudent {
            id: row.student_id,
            name: row.name,
            email: row.email,
            course: row.course,
            performance: StudentPerformanceRecord {
                attendance_percentage: clamp_percentage(row.attendance_percentage),
                quiz_scores,
                assignments_submitted: row.assignments_submitted.min(row.total_assignments),
                total_assignments: row.total_assignments,
                engagement_score: clamp_percentage(row.engagement_score),
            },
        };
        upsert_student(pool, &student).await?;
        imported += 1;
    }

    Ok(imported)
}

/// Parses `;`-separated quiz scores, clamping each into 0..=100.
pub fn parse_quiz_scores(raw: &str) -> anyhow::Result<Vec<f64>> {
    raw.split(';')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            value
                .parse::<f64>()
                .map(clamp_percentage)
                .with_context(|| format!("not a number: {value}"))
        })
        .collect()
}

pub fn clamp_percentage(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

pub async fn fetch_students(
    pool: &PgPool,
    level: Option<RiskLevel>,
) -> anyhow::Result<Vec<Student>> {
    let mut query = format!("SELECT {STUDENT_COLUMNS} FROM student_risk.students");
    if level.is_some() {
        query.push_str(" WHERE risk_level = $1");
    }
    query.push_str(" ORDER BY risk_score DESC, full_name ASC");

    let mut rows = sqlx::query(&query);
    if let Some(level) = level {
        rows = rows.bind(level.as_str());
    }

    let records = rows.fetch_all(pool).await?;
    let mut students = Vec::with_capacity(records.len());
    for row in records {
        students.push(student_from_row(&row)?);
    }
    Ok(students)
}

pub async fn fetch_student(pool: &PgPool, id: &str) -> Result<Option<Student>, StoreError> {
    let query = format!("SELECT {STUDENT_COLUMNS} FROM student_risk.students WHERE id = $1");
    let row = sqlx::query(&query).bind(id).fetch_optional(pool).await?;
    row.as_ref().map(student_from_row).transpose()
}

pub async fn record_assessment(
    pool: &PgPool,
    student_id: &str,
    assessment: &RiskAssessment,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE student_risk.students
        SET risk_score = $2, risk_level = $3, risk_factors = $4,
            last_assessed_at = now(), updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(student_id)
    .bind(assessment.score as i32)
    .bind(assessment.level.as_str())
    .bind(&assessment.factors)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_plan(pool: &PgPool, plan_id: Uuid) -> Result<Option<RecoveryPlan>, StoreError> {
    let query = format!("SELECT {PLAN_COLUMNS} FROM student_risk.recovery_plans WHERE id = $1");
    let row = sqlx::query(&query).bind(plan_id).fetch_optional(pool).await?;
    row.as_ref().map(plan_from_row).transpose()
}

pub async fn fetch_plans_for_student(
    pool: &PgPool,
    student_id: &str,
) -> Result<Vec<RecoveryPlan>, StoreError> {
    let query = format!(
        "SELECT {PLAN_COLUMNS} FROM student_risk.recovery_plans \
         WHERE student_id = $1 ORDER BY created_at DESC"
    );
    let rows = sqlx::query(&query).bind(student_id).fetch_all(pool).await?;
    rows.iter().map(plan_from_row).collect()
}

pub async fn fetch_active_plans(pool: &PgPool) -> Result<Vec<RecoveryPlan>, StoreError> {
    let query = format!(
        "SELECT {PLAN_COLUMNS} FROM student_risk.recovery_plans \
         WHERE is_active ORDER BY created_at DESC"
    );
    let rows = sqlx::query(&query).fetch_all(pool).await?;
    rows.iter().map(plan_from_row).collect()
}

pub async fn save_progress(pool: &PgPool, plan: &RecoveryPlan) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE student_risk.recovery_plans
        SET schedule = $2, progress_percentage = $3, updated_at = $4
        WHERE id = $1
        "#,
    )
    .bind(plan.id)
    .bind(Json(&plan.content.schedule))
    .bind(plan.progress_percentage)
    .bind(plan.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_notification(
    pool: &PgPool,
    notification: &Notification,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO student_risk.notifications
        (id, student_id, kind, title, message, is_read, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(notification.id)
    .bind(&notification.student_id)
    .bind(&notification.kind)
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(notification.is_read)
    .bind(notification.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_unread_notifications(pool: &PgPool) -> anyhow::Result<Vec<Notification>> {
    let rows = sqlx::query(
        r#"
        SELECT id, student_id, kind, title, message, is_read, created_at
        FROM student_risk.notifications
        WHERE NOT is_read
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut notifications = Vec::with_capacity(rows.len());
    for row in rows {
        notifications.push(Notification {
            id: row.try_get("id")?,
            student_id: row.try_get("student_id")?,
            kind: row.try_get("kind")?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            is_read: row.try_get("is_read")?,
            created_at: row.try_get("created_at")?,
        });
    }
    Ok(notifications)
}

pub async fn mark_notifications_read(pool: &PgPool) -> anyhow::Result<u64> {
    let result = sqlx::query(
        "UPDATE student_risk.notifications SET is_read = TRUE, read_at = now() WHERE NOT is_read",
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

fn student_from_row(row: &PgRow) -> Result<Student, StoreError> {
    let level: String = row.try_get("risk_level")?;
    let level = level.parse::<RiskLevel>().map_err(|e| malformed("students", e))?;
    let score: i32 = row.try_get("risk_score")?;

    Ok(Student {
        id: row.try_get("id")?,
        name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        course: row.try_get("course")?,
        performance: StudentPerformanceRecord {
            attendance_percentage: row.try_get("attendance_percentage")?,
            quiz_scores: row.try_get("quiz_scores")?,
            assignments_submitted: non_negative(row.try_get("assignments_submitted")?, "students")?,
            total_assignments: non_negative(row.try_get("total_assignments")?, "students")?,
            engagement_score: row.try_get("engagement_score")?,
        },
        assessment: RiskAssessment {
            score: non_negative(score, "students")?,
            level,
            factors: row.try_get("risk_factors")?,
        },
        last_assessed_at: row.try_get("last_assessed_at")?,
    })
}

fn plan_from_row(row: &PgRow) -> Result<RecoveryPlan, StoreError> {
    let level: String = row.try_get("risk_level")?;
    let generated_by: String = row.try_get("generated_by")?;
    let schedule: Json<Vec<ScheduleEntry>> = row.try_get("schedule")?;
    let resources: Json<Vec<Resource>> = row.try_get("resources")?;

    Ok(RecoveryPlan {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        risk_level: level
            .parse::<RiskLevel>()
            .map_err(|e| malformed("recovery_plans", e))?,
        content: RecoveryPlanContent {
            weak_topics: row.try_get("weak_topics")?,
            daily_study_hours: non_negative(row.try_get("daily_study_hours")?, "recovery_plans")?,
            schedule: schedule.0,
            resources: resources.0,
            strategies: row.try_get("strategies")?,
        },
        provenance: Provenance::from_columns(&generated_by, row.try_get("ai_model")?)
            .map_err(|e| malformed("recovery_plans", e))?,
        is_active: row.try_get("is_active")?,
        progress_percentage: row.try_get("progress_percentage")?,
        generated_at: row.try_get("generated_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn non_negative(value: i32, table: &'static str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Malformed {
        table,
        reason: format!("negative count {value}"),
    })
}

fn malformed(table: &'static str, err: anyhow::Error) -> StoreError {
    StoreError::Malformed {
        table,
        reason: err.to_string(),
    }
}

/// Postgres-backed student and plan store used by the plan generator.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StudentStore for PgStore {
    async fn student(&self, id: &str) -> Result<Option<Student>, StoreError> {
        fetch_student(&self.pool, id).await
    }
}

#[async_trait]
impl PlanStore for PgStore {
    async fn active_plan(&self, student_id: &str) -> Result<Option<RecoveryPlan>, StoreError> {
        let query = format!(
            "SELECT {PLAN_COLUMNS} FROM student_risk.recovery_plans \
             WHERE student_id = $1 AND is_active \
             ORDER BY created_at DESC LIMIT 1"
        );
        let row = sqlx::query(&query)
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(plan_from_row).transpose()
    }

    async fn mark_inactive(&self, plan_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE student_risk.recovery_plans SET is_active = FALSE, updated_at = now() WHERE id = $1",
        )
        .bind(plan_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save(&self, plan: &RecoveryPlan) -> Result<(), StoreError> {
        let content = &plan.content;
        sqlx::query(
            r#"
            INSERT INTO student_risk.recovery_plans
            (id, student_id, risk_level, weak_topics, daily_study_hours, schedule,
             resources, strategies, generated_by, ai_model, is_active,
             progress_percentage, generated_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(plan.id)
        .bind(&plan.student_id)
        .bind(plan.risk_level.as_str())
        .bind(&content.weak_topics)
        .bind(content.daily_study_hours as i32)
        .bind(Json(&content.schedule))
        .bind(Json(&content.resources))
        .bind(&content.strategies)
        .bind(plan.provenance.generated_by())
        .bind(plan.provenance.model())
        .bind(plan.is_active)
        .bind(plan.progress_percentage)
        .bind(plan.generated_at)
        .bind(plan.created_at)
        .bind(plan.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiz_scores_parse_and_clamp() {
        let scores = parse_quiz_scores("42; 38;105;-3").unwrap();
        assert_eq!(scores, vec![42.0, 38.0, 100.0, 0.0]);
    }

    #[test]
    fn blank_quiz_scores_are_empty() {
        assert!(parse_quiz_scores("").unwrap().is_empty());
        assert!(parse_quiz_scores(" ; ").unwrap().is_empty());
    }

    #[test]
    fn garbage_quiz_score_is_an_error() {
        assert!(parse_quiz_scores("42;abc").is_err());
    }

    #[test]
    fn percentages_clamp_into_range() {
        assert_eq!(clamp_percentage(-5.0), 0.0);
        assert_eq!(clamp_percentage(55.5), 55.5);
        assert_eq!(clamp_percentage(140.0), 100.0);
        assert_eq!(clamp_percentage(f64::NAN), 0.0);
    }

    #[test]
    fn negative_counts_are_malformed() {
        assert_eq!(non_negative(7, "students").unwrap(), 7);
        assert!(matches!(
            non_negative(-1, "students"),
            Err(StoreError::Malformed { table: "students", .. })
        ));
    }
}
