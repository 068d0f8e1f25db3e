//! Generative-AI recovery plans.
//!
//! [`GeminiPlanAdapter`] sends the student's numbers to the Gemini
//! `generateContent` endpoint and expects a JSON plan back.

use std::fmt::Write;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AiError;
use crate::models::{RecoveryPlanContent, Student};
use crate::risk;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const USER_AGENT: &str = concat!("student-risk-monitor/", env!("CARGO_PKG_VERSION"));
const MAX_DAILY_HOURS: u32 = 12;

#[async_trait]
pub trait AiPlanAdapter: Send + Sync {
    /// Model identifier recorded on plans this adapter produces.
    fn model(&self) -> &str;

    async fn complete(&self, student: &Student) -> Result<RecoveryPlanContent, AiError>;
}

pub struct GeminiPlanAdapter {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GeminiPlanAdapter {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self, AiError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::Unavailable(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: GEMINI_BASE_URL.to_string(),
            api_key,
            model,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }

    fn request_error(&self, e: reqwest::Error) -> AiError {
        if e.is_timeout() {
            AiError::Timeout(self.timeout)
        } else {
            AiError::Unavailable(e.without_url().to_string())
        }
    }
}

#[async_trait]
impl AiPlanAdapter for GeminiPlanAdapter {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, student: &Student) -> Result<RecoveryPlanContent, AiError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: build_prompt(student),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.4,
                response_mime_type: "application/json",
            },
        };

        tracing::debug!(student_id = %student.id, model = %self.model, "Requesting AI recovery plan");

        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Unavailable(format!("HTTP {}: {body}", status.as_u16())));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AiError::InvalidResponse(e.without_url().to_string()))?;

        let text = body
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .find(|t| !t.trim().is_empty())
            .ok_or_else(|| AiError::InvalidResponse("response has no candidate text".to_string()))?;

        parse_plan(&text)
    }
}

fn build_prompt(student: &Student) -> String {
    let record = &student.performance;
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "You are an academic advisor. Create a one-week recovery plan for a student at risk of dropping out."
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Student: {}", student.name);
    let _ = writeln!(prompt, "Course: {}", student.course);
    let _ = writeln!(
        prompt,
        "Risk: {} ({}/100)",
        student.assessment.level, student.assessment.score
    );
    if !student.assessment.factors.is_empty() {
        let _ = writeln!(prompt, "Risk factors: {}", student.assessment.factors.join(", "));
    }
    let _ = writeln!(prompt, "Attendance: {:.0}%", record.attendance_percentage);
    let _ = writeln!(
        prompt,
        "Quiz average: {:.1} over {} quizzes",
        risk::quiz_average(&record.quiz_scores),
        record.quiz_scores.len()
    );
    let _ = writeln!(
        prompt,
        "Assignments submitted: {}/{}",
        record.assignments_submitted, record.total_assignments
    );
    let _ = writeln!(prompt, "Engagement: {:.0}/100", record.engagement_score);
    let _ = writeln!(prompt);
    let _ = writeln!(
        prompt,
        "Reply with JSON only, using exactly these fields: \
         weakTopics (array of strings), dailyStudyHours (integer), \
         schedule (array of {{day, focus, duration}} for Monday to Friday and Weekend, duration like \"2 hours\"), \
         resources (array of {{title, type, url, description}} where type is one of \
         \"Video Course\", \"Exercises\", \"Community\", \"Mentorship\", \"Article\", \"Book\"), \
         strategies (array of strings)."
    );

    prompt
}

fn parse_plan(text: &str) -> Result<RecoveryPlanContent, AiError> {
    let json = strip_code_fence(text);
    let mut plan: RecoveryPlanContent =
        serde_json::from_str(json).map_err(|e| AiError::InvalidResponse(e.to_string()))?;

    if plan.weak_topics.is_empty() {
        return Err(AiError::InvalidResponse("plan has no weak topics".to_string()));
    }
    if plan.schedule.is_empty() {
        return Err(AiError::InvalidResponse("plan has no schedule".to_string()));
    }
    if plan.daily_study_hours == 0 || plan.daily_study_hours > MAX_DAILY_HOURS {
        return Err(AiError::InvalidResponse(format!(
            "implausible daily study hours: {}",
            plan.daily_study_hours
        )));
    }

    for entry in &mut plan.schedule {
        entry.completed = false;
    }
    Ok(plan)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::{ResourceKind, StudentPerformanceRecord};

    const PLAN_JSON: &str = r##"{
        "weakTopics": ["Recursion", "Big-O analysis"],
        "dailyStudyHours": 3,
        "schedule": [
            {"day": "Monday", "focus": "Recursion drills", "duration": "2 hours", "completed": true},
            {"day": "Weekend", "focus": "Mock exam", "duration": "4 hours"}
        ],
        "resources": [
            {"title": "Visualgo", "type": "Exercises", "url": "https://visualgo.net", "description": "Animated algorithms"},
            {"title": "CLRS", "type": "Book", "url": "#"}
        ],
        "strategies": ["Explain each solution aloud"]
    }"##;

    #[test]
    fn parses_plain_json_plan() {
        let plan = parse_plan(PLAN_JSON).unwrap();
        assert_eq!(plan.weak_topics, vec!["Recursion", "Big-O analysis"]);
        assert_eq!(plan.daily_study_hours, 3);
        assert_eq!(plan.schedule.len(), 2);
        assert!(plan.schedule.iter().all(|e| !e.completed));
        assert_eq!(plan.resources[1].kind, ResourceKind::Book);
        assert_eq!(plan.resources[1].description, "");
    }

    #[test]
    fn parses_fenced_json_plan() {
        let fenced = format!("```json\n{PLAN_JSON}\n```");
        let plan = parse_plan(&fenced).unwrap();
        assert_eq!(plan.strategies, vec!["Explain each solution aloud"]);
    }

    #[test]
    fn rejects_non_json_reply() {
        let err = parse_plan("Here is your plan: study more.").unwrap_err();
        assert!(matches!(err, AiError::InvalidResponse(_)));
    }

    #[test]
    fn rejects_empty_or_implausible_plans() {
        let empty_topics = PLAN_JSON.replace(r#"["Recursion", "Big-O analysis"]"#, "[]");
        assert!(matches!(
            parse_plan(&empty_topics),
            Err(AiError::InvalidResponse(_))
        ));

        let too_many_hours = PLAN_JSON.replace(r#""dailyStudyHours": 3"#, r#""dailyStudyHours": 20"#);
        assert!(matches!(
            parse_plan(&too_many_hours),
            Err(AiError::InvalidResponse(_))
        ));
    }

    #[test]
    fn strip_code_fence_leaves_bare_text_alone() {
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
    }

    fn sample_student() -> Student {
        let performance = StudentPerformanceRecord {
            attendance_percentage: 55.0,
            quiz_scores: vec![45.0, 38.0, 42.0, 35.0, 40.0],
            assignments_submitted: 4,
            total_assignments: 10,
            engagement_score: 35.0,
        };
        Student {
            id: "TEST001".to_string(),
            name: "Test Student".to_string(),
            email: "test@university.edu".to_string(),
            course: "Computer Science 101".to_string(),
            assessment: risk::assess(&performance),
            performance,
            last_assessed_at: Utc::now(),
        }
    }

    #[test]
    fn prompt_mentions_the_students_numbers() {
        let prompt = build_prompt(&sample_student());
        assert!(prompt.contains("Student: Test Student"));
        assert!(prompt.contains("Risk: High (100/100)"));
        assert!(prompt.contains("Attendance: 55%"));
        assert!(prompt.contains("Quiz average: 40.0 over 5 quizzes"));
        assert!(prompt.contains("Assignments submitted: 4/10"));
    }

    fn adapter_at(base_url: String, timeout: Duration) -> GeminiPlanAdapter {
        let mut adapter =
            GeminiPlanAdapter::new("SECRET-KEY-123".to_string(), "gemini-pro".to_string(), timeout)
                .unwrap();
        adapter.base_url = base_url;
        adapter
    }

    #[tokio::test]
    async fn connection_errors_do_not_expose_the_api_key() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let adapter = adapter_at(format!("http://{addr}"), Duration::from_secs(5));
        let err = adapter.complete(&sample_student()).await.unwrap_err();

        assert!(matches!(err, AiError::Unavailable(_)));
        assert!(!err.to_string().contains("SECRET-KEY-123"));
    }

    #[tokio::test]
    async fn silent_server_maps_to_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let timeout = Duration::from_millis(200);
        let adapter = adapter_at(format!("http://{addr}"), timeout);
        let err = adapter.complete(&sample_student()).await.unwrap_err();
        server.abort();

        assert!(matches!(err, AiError::Timeout(t) if t == timeout));
        assert!(!err.to_string().contains("SECRET-KEY-123"));
    }

    #[test]
    fn endpoint_includes_model() {
        let adapter = GeminiPlanAdapter::new(
            "key".to_string(),
            "gemini-pro".to_string(),
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(
            adapter.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent"
        );
        assert_eq!(adapter.model(), "gemini-pro");
    }
}
