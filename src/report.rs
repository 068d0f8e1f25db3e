use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{RecoveryPlan, RiskFactorSummary, RiskLevel, RiskStats, Student};

pub fn summarize_factors(students: &[Student]) -> Vec<RiskFactorSummary> {
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for student in students {
        for factor in &student.assessment.factors {
            *counts.entry(factor.as_str()).or_insert(0) += 1;
        }
    }

    let mut summaries: Vec<RiskFactorSummary> = counts
        .into_iter()
        .map(|(factor, count)| RiskFactorSummary {
            factor: factor.to_string(),
            count,
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.factor.cmp(&b.factor)));
    summaries
}

/// High-risk students that have no active recovery plan yet.
pub fn high_risk_without_plan<'a>(
    students: &'a [Student],
    active_plans: &[RecoveryPlan],
) -> Vec<&'a Student> {
    let covered: HashSet<&str> = active_plans
        .iter()
        .filter(|plan| plan.is_active)
        .map(|plan| plan.student_id.as_str())
        .collect();

    students
        .iter()
        .filter(|s| s.assessment.level == RiskLevel::High && !covered.contains(s.id.as_str()))
        .collect()
}

pub fn build_report(
    generated_at: DateTime<Utc>,
    students: &[Student],
    active_plans: &[RecoveryPlan],
) -> String {
    let stats = RiskStats::from_students(students);
    let factors = summarize_factors(students);

    let mut ranked: Vec<&Student> = students.iter().collect();
    ranked.sort_by(|a, b| {
        b.assessment
            .score
            .cmp(&a.assessment.score)
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut output = String::new();

    let _ = writeln!(output, "# Student Risk Report");
    let _ = writeln!(
        output,
        "Generated {} for {} students",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        stats.total
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Mix");
    let _ = writeln!(output, "- High: {}", stats.high);
    let _ = writeln!(output, "- Medium: {}", stats.medium);
    let _ = writeln!(output, "- Low: {}", stats.low);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Students");

    if ranked.is_empty() {
        let _ = writeln!(output, "No students on the roster.");
    } else {
        for student in ranked.iter().take(10) {
            let factors = if student.assessment.factors.is_empty() {
                "no risk factors".to_string()
            } else {
                student.assessment.factors.join(", ")
            };
            let _ = writeln!(
                output,
                "- {} ({}, {}) {} risk, score {}: {}",
                student.name,
                student.id,
                student.course,
                student.assessment.level,
                student.assessment.score,
                factors
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Common Risk Factors");

    if factors.is_empty() {
        let _ = writeln!(output, "No risk factors triggered.");
    } else {
        for summary in &factors {
            let _ = writeln!(output, "- {}: {} students", summary.factor, summary.count);
        }
    }

    let uncovered = high_risk_without_plan(students, active_plans);
    let _ = writeln!(output);
    let _ = writeln!(output, "## High Risk Without a Recovery Plan");

    if uncovered.is_empty() {
        let _ = writeln!(output, "Every high-risk student has an active plan.");
    } else {
        for student in uncovered {
            let _ = writeln!(output, "- {} ({})", student.name, student.id);
        }
    }

    output
}
