//! Case orchestration entry points: start, state fetch, approval resume.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};

use hub_primitives::JsonMap;
use hub_store::ContextStore;

use crate::redact::{redact_payload, redact_text};
use crate::state::{JourneyState, Stage};
use crate::workflow::{case_state_key, checkpoint_key, CaseWorkflow};
use crate::{JourneyError, JourneyResult};

const SERVICE_DISCLAIMER: &str = "This orchestration output is educational and non-diagnostic.";

/// Request to drive a case end-to-end.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCaseRequest {
    /// Owning tenant.
    pub tenant_id: String,
    /// Case identifier.
    pub case_id: String,
    /// Patient details.
    #[serde(default)]
    pub patient: JsonMap,
    /// Intake form.
    #[serde(default)]
    pub intake: JsonMap,
}

/// External approval decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalDecision {
    /// Clear the gate and continue to completion.
    #[serde(rename = "APPROVED")]
    Approved,
    /// Hold the case.
    #[serde(rename = "REJECTED")]
    Rejected,
}

/// Request resolving a pending approval.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    /// Owning tenant.
    pub tenant_id: String,
    /// Case identifier.
    pub case_id: String,
    /// The decision.
    pub decision: ApprovalDecision,
    /// Optional reviewer comment.
    #[serde(default)]
    pub comment: Option<String>,
}

/// Drives case journeys and renders their state for callers.
///
/// Holds the process-local case-input map used for approval resumes; when a
/// case is missing there (for example after a restart) the durable
/// checkpoint is used instead.
pub struct JourneyService {
    workflow: CaseWorkflow,
    store: ContextStore,
    case_inputs: RwLock<HashMap<String, HashMap<String, JourneyState>>>,
    service_disclaimer: String,
}

impl JourneyService {
    /// Creates the service over a workflow and the checkpoint store.
    #[must_use]
    pub fn new(workflow: CaseWorkflow, store: ContextStore) -> Self {
        Self {
            workflow,
            store,
            case_inputs: RwLock::new(HashMap::new()),
            service_disclaimer: SERVICE_DISCLAIMER.to_owned(),
        }
    }

    /// Overrides the service-level disclaimer appended after each run.
    #[must_use]
    pub fn with_service_disclaimer(mut self, text: impl Into<String>) -> Self {
        self.service_disclaimer = text.into();
        self
    }

    /// Drives a case from intake; may halt at the approval gate.
    ///
    /// Returns the rendered (redacted) state view.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError`] when a checkpoint write fails.
    pub async fn start_case(&self, request: StartCaseRequest) -> JourneyResult<Value> {
        info!(tenant_id = %request.tenant_id, case_id = %request.case_id, "starting case journey");
        let mut state = JourneyState::new(
            request.tenant_id.clone(),
            request.case_id.clone(),
            request.patient,
            request.intake,
        );
        self.workflow.run(&mut state).await?;

        state.add_disclaimer(&self.service_disclaimer);
        state.touch();
        self.remember(&state).await;
        Ok(render_state(&state))
    }

    /// Renders the checkpointed state of a case, `None` when unknown.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError::CorruptState`] when the stored checkpoint
    /// cannot be decoded.
    pub async fn get_state(&self, tenant_id: &str, case_id: &str) -> JourneyResult<Option<Value>> {
        match self.load_checkpoint(tenant_id, case_id).await? {
            Some(state) => Ok(Some(render_state(&state))),
            None => Ok(None),
        }
    }

    /// Applies an approval decision; `None` when the case is unknown.
    ///
    /// A rejection holds the case; an approval clears the gate, re-enters
    /// the stage table at the approval node, and runs to completion.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError`] when a checkpoint write fails or the stored
    /// state is corrupt.
    pub async fn resolve_approval(&self, request: ApprovalRequest) -> JourneyResult<Option<Value>> {
        let Some(mut state) = self.find_case(&request.tenant_id, &request.case_id).await? else {
            warn!(
                tenant_id = %request.tenant_id,
                case_id = %request.case_id,
                "approval for unknown case"
            );
            return Ok(None);
        };

        match request.decision {
            ApprovalDecision::Rejected => {
                state.status = "on-hold".to_owned();
                state.stage = Stage::AwaitingDecision;
                state.approvals = vec![json!({
                    "type": "clinical_review",
                    "payload": {"decision": "REJECTED", "comment": request.comment},
                })];
                state.touch();
                self.workflow.checkpoint(&state).await?;
                self.remember(&state).await;
                Ok(Some(render_state(&state)))
            }
            ApprovalDecision::Approved => {
                state.red_flags.clear();
                state.approvals.clear();
                state.stage = Stage::Approvals;
                state.status = "pricing".to_owned();
                self.workflow.resume(&mut state).await?;

                state.add_disclaimer(&self.service_disclaimer);
                state.touch();
                self.remember(&state).await;
                Ok(Some(render_state(&state)))
            }
        }
    }

    async fn find_case(&self, tenant_id: &str, case_id: &str) -> JourneyResult<Option<JourneyState>> {
        if let Some(state) = self
            .case_inputs
            .read()
            .await
            .get(tenant_id)
            .and_then(|cases| cases.get(case_id))
        {
            return Ok(Some(state.clone()));
        }
        self.load_checkpoint(tenant_id, case_id).await
    }

    async fn load_checkpoint(
        &self,
        tenant_id: &str,
        case_id: &str,
    ) -> JourneyResult<Option<JourneyState>> {
        let Some(value) = self
            .store
            .get_json(&checkpoint_key(tenant_id, case_id))
            .await?
        else {
            return Ok(None);
        };
        let state = serde_json::from_value(value).map_err(|err| JourneyError::CorruptState {
            reason: format!("{err}"),
        })?;
        Ok(Some(state))
    }

    /// Returns the compact case view, `None` when unknown.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError`] on store failure.
    pub async fn get_compact_state(
        &self,
        tenant_id: &str,
        case_id: &str,
    ) -> JourneyResult<Option<Value>> {
        Ok(self
            .store
            .get_json(&case_state_key(tenant_id, case_id))
            .await?)
    }

    async fn remember(&self, state: &JourneyState) {
        self.case_inputs
            .write()
            .await
            .entry(state.tenant_id.clone())
            .or_default()
            .insert(state.case_id.clone(), state.clone());
    }
}

/// Renders a state for callers: camelCase keys, PHI redacted from the
/// patient, intake, and clinical summary. The stored checkpoint itself stays
/// unredacted.
#[must_use]
pub(crate) fn render_state(state: &JourneyState) -> Value {
    json!({
        "caseId": &state.case_id,
        "tenantId": &state.tenant_id,
        "status": &state.status,
        "stage": state.stage,
        "clinicalSummary": redact_text(&state.clinical_summary),
        "eligibility": &state.eligibility,
        "pricing": &state.pricing,
        "travelPlan": &state.travel,
        "docs": &state.docs,
        "approvals": &state.approvals,
        "itinerary": &state.itinerary,
        "aftercare": &state.aftercare,
        "disclaimers": &state.disclaimers,
        "redFlags": &state.red_flags,
        "patient": redact_payload(&state.patient),
        "intake": redact_payload(&state.intake),
        "updatedAt": &state.updated_at,
    })
}
