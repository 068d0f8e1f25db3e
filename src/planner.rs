use crate::models::{
    RecoveryPlanContent, Resource, ResourceKind, RiskLevel, ScheduleEntry,
    StudentPerformanceRecord,
};
use crate::risk;

// (day, focus, share of the daily hours in tenths)
const WEEK_TEMPLATE: [(&str, &str, u32); 6] = [
    ("Monday", "Review fundamentals", 5),
    ("Tuesday", "Practice problems", 5),
    ("Wednesday", "Concept clarification", 4),
    ("Thursday", "Group study session", 5),
    ("Friday", "Mock tests", 4),
    ("Weekend", "Self-assessment & revision", 15),
];

const RESOURCE_CATALOG: [(&str, ResourceKind, &str); 4] = [
    (
        "Khan Academy - Core Concepts",
        ResourceKind::VideoCourse,
        "Comprehensive video tutorials",
    ),
    (
        "Practice Problem Set",
        ResourceKind::Exercises,
        "Hands-on practice exercises",
    ),
    (
        "Study Group Discord",
        ResourceKind::Community,
        "Connect with peers",
    ),
    (
        "Office Hours with TA",
        ResourceKind::Mentorship,
        "Get personalized help",
    ),
];

const BASE_STRATEGIES: [&str; 5] = [
    "Break study sessions into 25-minute focused blocks (Pomodoro technique)",
    "Review notes within 24 hours of each lecture",
    "Form a study group with 2-3 classmates",
    "Use active recall instead of passive reading",
    "Attend all office hours for difficult topics",
];

const ATTENDANCE_CONCERN: f64 = 70.0;
const QUIZ_CONCERN: f64 = 60.0;
const ENGAGEMENT_CONCERN: f64 = 50.0;

/// Rule-based recovery plan. Same inputs always produce the same plan.
pub fn build(record: &StudentPerformanceRecord, level: RiskLevel) -> RecoveryPlanContent {
    let daily_study_hours = study_hours(level);

    RecoveryPlanContent {
        weak_topics: weak_topics(record),
        daily_study_hours,
        schedule: schedule(daily_study_hours),
        resources: resources(),
        strategies: strategies(record),
    }
}

pub fn study_hours(level: RiskLevel) -> u32 {
    match level {
        RiskLevel::High => 4,
        RiskLevel::Medium => 3,
        RiskLevel::Low => 2,
    }
}

pub fn weak_topics(record: &StudentPerformanceRecord) -> Vec<String> {
    let mut topics = Vec::new();

    if record.attendance_percentage < ATTENDANCE_CONCERN {
        topics.push("Attendance & Consistency");
    }
    if risk::quiz_average(&record.quiz_scores) < QUIZ_CONCERN {
        topics.extend(["Fundamental Concepts", "Problem Solving"]);
    }
    if record.engagement_score < ENGAGEMENT_CONCERN {
        topics.extend(["Study Habits", "Time Management"]);
    }
    if topics.is_empty() {
        topics.extend(["Advanced Topics", "Optimization"]);
    }

    topics.into_iter().map(String::from).collect()
}

pub fn schedule(daily_study_hours: u32) -> Vec<ScheduleEntry> {
    WEEK_TEMPLATE
        .iter()
        .map(|(day, focus, tenths)| ScheduleEntry {
            day: day.to_string(),
            focus: focus.to_string(),
            duration: format_hours(ceil_tenths(daily_study_hours, *tenths)),
            completed: false,
        })
        .collect()
}

pub fn resources() -> Vec<Resource> {
    RESOURCE_CATALOG
        .iter()
        .map(|(title, kind, description)| Resource {
            title: title.to_string(),
            kind: *kind,
            url: "#".to_string(),
            description: description.to_string(),
        })
        .collect()
}

pub fn strategies(record: &StudentPerformanceRecord) -> Vec<String> {
    let mut strategies: Vec<String> = BASE_STRATEGIES.iter().map(|s| s.to_string()).collect();

    if record.attendance_percentage < ATTENDANCE_CONCERN {
        strategies.push("Set daily reminders for class attendance".to_string());
    }
    if record.engagement_score < ENGAGEMENT_CONCERN {
        strategies.push("Reduce distractions during study time".to_string());
    }

    strategies
}

fn ceil_tenths(hours: u32, tenths: u32) -> u32 {
    (hours * tenths).div_ceil(10)
}

fn format_hours(hours: u32) -> String {
    if hours == 1 {
        "1 hour".to_string()
    } else {
        format!("{hours} hours")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(attendance: f64, quiz_scores: &[f64], engagement: f64) -> StudentPerformanceRecord {
        StudentPerformanceRecord {
            attendance_percentage: attendance,
            quiz_scores: quiz_scores.to_vec(),
            assignments_submitted: 5,
            total_assignments: 10,
            engagement_score: engagement,
        }
    }

    fn durations(level: RiskLevel) -> Vec<String> {
        build(&record(90.0, &[90.0], 90.0), level)
            .schedule
            .into_iter()
            .map(|entry| entry.duration)
            .collect()
    }

    #[test]
    fn study_hours_follow_risk_level() {
        let healthy = record(90.0, &[90.0], 90.0);
        assert_eq!(build(&healthy, RiskLevel::High).daily_study_hours, 4);
        assert_eq!(build(&healthy, RiskLevel::Medium).daily_study_hours, 3);
        assert_eq!(build(&healthy, RiskLevel::Low).daily_study_hours, 2);
    }

    #[test]
    fn schedule_durations_round_up() {
        assert_eq!(
            durations(RiskLevel::High),
            vec!["2 hours", "2 hours", "2 hours", "2 hours", "2 hours", "6 hours"]
        );
        assert_eq!(
            durations(RiskLevel::Medium),
            vec!["2 hours", "2 hours", "2 hours", "2 hours", "2 hours", "5 hours"]
        );
        assert_eq!(
            durations(RiskLevel::Low),
            vec!["1 hour", "1 hour", "1 hour", "1 hour", "1 hour", "3 hours"]
        );
    }

    #[test]
    fn schedule_covers_the_week_uncompleted() {
        let plan = build(&record(50.0, &[40.0], 30.0), RiskLevel::High);
        let days: Vec<&str> = plan.schedule.iter().map(|e| e.day.as_str()).collect();
        assert_eq!(
            days,
            vec!["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Weekend"]
        );
        assert!(plan.schedule.iter().all(|e| !e.completed));
    }

    #[test]
    fn weak_topics_follow_each_signal_in_order() {
        let topics = weak_topics(&record(50.0, &[40.0, 50.0], 30.0));
        assert_eq!(
            topics,
            vec![
                "Attendance & Consistency",
                "Fundamental Concepts",
                "Problem Solving",
                "Study Habits",
                "Time Management",
            ]
        );

        let topics = weak_topics(&record(90.0, &[90.0], 45.0));
        assert_eq!(topics, vec!["Study Habits", "Time Management"]);
    }

    #[test]
    fn strong_student_gets_stretch_topics() {
        let topics = weak_topics(&record(70.0, &[60.0], 50.0));
        assert_eq!(topics, vec!["Advanced Topics", "Optimization"]);
    }

    #[test]
    fn empty_quiz_history_flags_fundamentals() {
        let topics = weak_topics(&record(90.0, &[], 90.0));
        assert_eq!(topics, vec!["Fundamental Concepts", "Problem Solving"]);
    }

    #[test]
    fn strategies_extend_on_attendance_and_engagement() {
        assert_eq!(strategies(&record(90.0, &[90.0], 90.0)).len(), 5);

        let extended = strategies(&record(65.0, &[90.0], 45.0));
        assert_eq!(extended.len(), 7);
        assert_eq!(extended[5], "Set daily reminders for class attendance");
        assert_eq!(extended[6], "Reduce distractions during study time");

        let attendance_only = strategies(&record(65.0, &[90.0], 90.0));
        assert_eq!(
            attendance_only.last().map(String::as_str),
            Some("Set daily reminders for class attendance")
        );
    }

    #[test]
    fn resources_are_the_fixed_catalog() {
        let low = build(&record(90.0, &[90.0], 90.0), RiskLevel::Low);
        let high = build(&record(10.0, &[10.0], 10.0), RiskLevel::High);
        assert_eq!(low.resources, high.resources);

        let kinds: Vec<ResourceKind> = low.resources.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::VideoCourse,
                ResourceKind::Exercises,
                ResourceKind::Community,
                ResourceKind::Mentorship,
            ]
        );
    }

    #[test]
    fn build_is_deterministic() {
        let input = record(62.0, &[55.0, 48.0, 61.0], 41.0);
        let first = build(&input, RiskLevel::Medium);
        let second = build(&input, RiskLevel::Medium);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
