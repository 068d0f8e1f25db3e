use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Raw performance signals for one student at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentPerformanceRecord {
    pub attendance_percentage: f64,
    pub quiz_scores: Vec<f64>,
    pub assignments_submitted: u32,
    pub total_assignments: u32,
    pub engagement_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: u32) -> Self {
        if score >= 70 {
            RiskLevel::High
        } else if score >= 40 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => anyhow::bail!("unknown risk level: {other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: u32,
    pub level: RiskLevel,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
    pub course: String,
    pub performance: StudentPerformanceRecord,
    pub assessment: RiskAssessment,
    pub last_assessed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct RiskStats {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl RiskStats {
    pub fn from_students(students: &[Student]) -> Self {
        let mut stats = RiskStats {
            total: students.len(),
            ..RiskStats::default()
        };

        for student in students {
            match student.assessment.level {
                RiskLevel::High => stats.high += 1,
                RiskLevel::Medium => stats.medium += 1,
                RiskLevel::Low => stats.low += 1,
            }
        }

        stats
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskFactorSummary {
    pub factor: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub day: String,
    pub focus: String,
    pub duration: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    #[serde(rename = "Video Course")]
    VideoCourse,
    Exercises,
    Community,
    Mentorship,
    Article,
    Book,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub url: String,
    #[serde(default)]
    pub description: String,
}

/// Plan body without provenance or lifecycle metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryPlanContent {
    pub weak_topics: Vec<String>,
    pub daily_study_hours: u32,
    pub schedule: Vec<ScheduleEntry>,
    pub resources: Vec<Resource>,
    pub strategies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    Manual,
    Ai { model: String },
}

impl Provenance {
    pub fn generated_by(&self) -> &'static str {
        match self {
            Provenance::Manual => "manual",
            Provenance::Ai { .. } => "ai",
        }
    }

    pub fn model(&self) -> Option<&str> {
        match self {
            Provenance::Manual => None,
            Provenance::Ai { model } => Some(model),
        }
    }

    /// Rebuilds the tag from its stored columns; an `ai` row must carry a model.
    pub fn from_columns(generated_by: &str, model: Option<String>) -> anyhow::Result<Self> {
        match (generated_by, model) {
            ("manual", _) => Ok(Provenance::Manual),
            ("ai", Some(model)) => Ok(Provenance::Ai { model }),
            ("ai", None) => anyhow::bail!("ai-generated plan is missing its model"),
            (other, _) => anyhow::bail!("unknown plan provenance: {other}"),
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Manual => f.write_str("manual"),
            Provenance::Ai { model } => write!(f, "ai ({model})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryPlan {
    pub id: Uuid,
    pub student_id: String,
    pub risk_level: RiskLevel,
    pub content: RecoveryPlanContent,
    pub provenance: Provenance,
    pub is_active: bool,
    pub progress_percentage: f64,
    pub generated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProgressError {
    #[error("schedule has no day at index {index} (plan has {len} days)")]
    DayOutOfRange { index: usize, len: usize },
}

impl RecoveryPlan {
    pub fn new(
        student_id: &str,
        risk_level: RiskLevel,
        content: RecoveryPlanContent,
        provenance: Provenance,
    ) -> Self {
        let now = Utc::now();
        RecoveryPlan {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            risk_level,
            content,
            provenance,
            is_active: true,
            progress_percentage: 0.0,
            generated_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_completed(&mut self, day_index: usize, completed: bool) -> Result<(), ProgressError> {
        let len = self.content.schedule.len();
        let entry = self
            .content
            .schedule
            .get_mut(day_index)
            .ok_or(ProgressError::DayOutOfRange {
                index: day_index,
                len,
            })?;
        entry.completed = completed;

        let done = self.content.schedule.iter().filter(|e| e.completed).count();
        self.progress_percentage = done as f64 / len as f64 * 100.0;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub student_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn risk_alert(student: &Student) -> Self {
        let level = student.assessment.level;
        Notification {
            id: Uuid::new_v4(),
            student_id: student.id.clone(),
            kind: "risk_alert".to_string(),
            title: format!("{level} Risk Alert: {}", student.name),
            message: format!(
                "{} has been identified as {level} risk. Review their profile and consider intervention.",
                student.name
            ),
            is_read: false,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> RecoveryPlan {
        let entry = |day: &str| ScheduleEntry {
            day: day.to_string(),
            focus: "Review".to_string(),
            duration: "2 hours".to_string(),
            completed: false,
        };
        RecoveryPlan::new(
            "STU001",
            RiskLevel::High,
            RecoveryPlanContent {
                weak_topics: vec!["Study Habits".to_string()],
                daily_study_hours: 4,
                schedule: vec![entry("Monday"), entry("Tuesday"), entry("Wednesday"), entry("Thursday")],
                resources: Vec::new(),
                strategies: Vec::new(),
            },
            Provenance::Manual,
        )
    }

    #[test]
    fn levels_follow_thresholds() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(39), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(40), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(69), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(70), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::High);
    }

    #[test]
    fn levels_are_monotonic_in_score() {
        let levels: Vec<RiskLevel> = (0..=100).map(RiskLevel::from_score).collect();
        assert!(levels.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn risk_level_parses_case_insensitively() {
        assert_eq!("high".parse::<RiskLevel>().unwrap(), RiskLevel::High);
        assert_eq!("Medium".parse::<RiskLevel>().unwrap(), RiskLevel::Medium);
        assert!("severe".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn provenance_round_trips_through_columns() {
        let ai = Provenance::Ai {
            model: "gemini-pro".to_string(),
        };
        let rebuilt =
            Provenance::from_columns(ai.generated_by(), ai.model().map(str::to_string)).unwrap();
        assert_eq!(rebuilt, ai);
        assert_eq!(
            Provenance::from_columns("manual", None).unwrap(),
            Provenance::Manual
        );
        assert!(Provenance::from_columns("ai", None).is_err());
    }

    #[test]
    fn completing_days_updates_progress() {
        let mut plan = sample_plan();
        assert_eq!(plan.progress_percentage, 0.0);

        plan.set_completed(0, true).unwrap();
        assert!((plan.progress_percentage - 25.0).abs() < f64::EPSILON);

        plan.set_completed(3, true).unwrap();
        assert!((plan.progress_percentage - 50.0).abs() < f64::EPSILON);

        plan.set_completed(0, false).unwrap();
        assert!((plan.progress_percentage - 25.0).abs() < f64::EPSILON);
        assert!(!plan.content.schedule[0].completed);
    }

    #[test]
    fn completing_unknown_day_is_rejected() {
        let mut plan = sample_plan();
        let err = plan.set_completed(9, true).unwrap_err();
        assert_eq!(err, ProgressError::DayOutOfRange { index: 9, len: 4 });
        assert_eq!(plan.progress_percentage, 0.0);
    }

    #[test]
    fn resource_kind_uses_display_names_on_the_wire() {
        let json = serde_json::to_string(&ResourceKind::VideoCourse).unwrap();
        assert_eq!(json, "\"Video Course\"");
    }
}
