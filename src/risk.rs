use crate::models::{RiskAssessment, RiskLevel, StudentPerformanceRecord};

pub fn assess(record: &StudentPerformanceRecord) -> RiskAssessment {
    let mut score = 0u32;
    let mut factors = Vec::new();

    let buckets = [
        attendance_bucket(record.attendance_percentage),
        quiz_bucket(quiz_average(&record.quiz_scores)),
        completion_bucket(completion_rate(
            record.assignments_submitted,
            record.total_assignments,
        )),
        engagement_bucket(record.engagement_score),
    ];

    for (points, label) in buckets.into_iter().flatten() {
        score += points;
        factors.push(label.to_string());
    }

    let score = score.min(100);
    RiskAssessment {
        score,
        level: RiskLevel::from_score(score),
        factors,
    }
}

/// Mean quiz score; an empty list counts as 0.
pub fn quiz_average(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// Submitted share of assignments in percent; no assignments counts as 0.
pub fn completion_rate(submitted: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    submitted as f64 / total as f64 * 100.0
}

/// True when a reassessment moves a student into High from a lower level.
pub fn escalated(previous: RiskLevel, current: RiskLevel) -> bool {
    current == RiskLevel::High && previous < RiskLevel::High
}

fn attendance_bucket(attendance: f64) -> Option<(u32, &'static str)> {
    if attendance < 60.0 {
        Some((30, "Low attendance"))
    } else if attendance < 75.0 {
        Some((15, "Below average attendance"))
    } else {
        None
    }
}

fn quiz_bucket(average: f64) -> Option<(u32, &'static str)> {
    if average < 50.0 {
        Some((30, "Poor quiz performance"))
    } else if average < 65.0 {
        Some((15, "Below average quiz scores"))
    } else {
        None
    }
}

fn completion_bucket(rate: f64) -> Option<(u32, &'static str)> {
    if rate < 50.0 {
        Some((20, "Low assignment completion"))
    } else if rate < 70.0 {
        Some((10, "Below average assignment completion"))
    } else {
        None
    }
}

fn engagement_bucket(engagement: f64) -> Option<(u32, &'static str)> {
    if engagement < 40.0 {
        Some((20, "Low engagement"))
    } else if engagement < 60.0 {
        Some((10, "Below average engagement"))
    } else {
        None
    }
}
