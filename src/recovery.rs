//! Recovery plan generation: supersede the active plan, ask the AI adapter,
//! fall back to the rule-based planner, then persist.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ai::AiPlanAdapter;
use crate::error::{AiError, PlanError, StoreError};
use crate::models::{Provenance, RecoveryPlan, RecoveryPlanContent, Student};
use crate::planner;

#[async_trait]
pub trait StudentStore: Send + Sync {
    async fn student(&self, id: &str) -> Result<Option<Student>, StoreError>;
}

#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn active_plan(&self, student_id: &str) -> Result<Option<RecoveryPlan>, StoreError>;

    async fn mark_inactive(&self, plan_id: Uuid) -> Result<(), StoreError>;

    async fn save(&self, plan: &RecoveryPlan) -> Result<(), StoreError>;
}

pub struct RecoveryPlanGenerator<S> {
    store: S,
    ai: Option<Arc<dyn AiPlanAdapter>>,
    ai_timeout: Duration,
}

impl<S> RecoveryPlanGenerator<S>
where
    S: StudentStore + PlanStore,
{
    pub fn new(store: S, ai: Option<Arc<dyn AiPlanAdapter>>, ai_timeout: Duration) -> Self {
        Self {
            store,
            ai,
            ai_timeout,
        }
    }

    /// Generates a fresh plan for the student and makes it the active one.
    ///
    /// Only a missing student or a failed lookup/save is an error. AI failures
    /// fall back to the rule-based planner and a failed deactivation of the
    /// previous plan is logged and ignored.
    pub async fn generate(&self, student_id: &str) -> Result<Uuid, PlanError> {
        let student = self
            .store
            .student(student_id)
            .await
            .map_err(|source| PlanError::Lookup {
                student_id: student_id.to_string(),
                source,
            })?
            .ok_or_else(|| PlanError::StudentNotFound(student_id.to_string()))?;

        self.supersede(student_id).await;

        let (content, provenance) = self.draft(&student).await;

        let plan = RecoveryPlan::new(
            student_id,
            student.assessment.level,
            content,
            provenance,
        );
        self.store.save(&plan).await.map_err(PlanError::Persistence)?;

        info!(
            student_id,
            plan_id = %plan.id,
            generated_by = %plan.provenance,
            "Recovery plan generated"
        );
        Ok(plan.id)
    }

    async fn supersede(&self, student_id: &str) {
        let existing = match self.store.active_plan(student_id).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(student_id, error = %e, "Could not look up active plan; continuing");
                return;
            }
        };

        if let Some(plan) = existing {
            if let Err(e) = self.store.mark_inactive(plan.id).await {
                warn!(
                    student_id,
                    plan_id = %plan.id,
                    error = %e,
                    "Could not deactivate previous plan; continuing"
                );
            }
        }
    }

    async fn draft(&self, student: &Student) -> (RecoveryPlanContent, Provenance) {
        if let Some(ai) = &self.ai {
            match self.ask_ai(ai.as_ref(), student).await {
                Ok(content) => {
                    return (
                        content,
                        Provenance::Ai {
                            model: ai.model().to_string(),
                        },
                    );
                }
                Err(e) => {
                    warn!(
                        student_id = %student.id,
                        error = %e,
                        "AI plan generation failed, falling back to rule-based plan"
                    );
                }
            }
        }

        let content = planner::build(&student.performance, student.assessment.level);
        (content, Provenance::Manual)
    }

    async fn ask_ai(
        &self,
        ai: &dyn AiPlanAdapter,
        student: &Student,
    ) -> Result<RecoveryPlanContent, AiError> {
        tokio::time::timeout(self.ai_timeout, ai.complete(student))
            .await
            .map_err(|_| AiError::Timeout(self.ai_timeout))?
    }
}
