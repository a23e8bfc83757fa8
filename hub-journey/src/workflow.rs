//! The staged case workflow.

use chrono::{Duration as TimeDelta, Utc};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use hub_bus::EventBus;
use hub_primitives::{HubEvent, JsonMap};
use hub_store::ContextStore;

use crate::redact::{redact_payload, redact_text};
use crate::state::{JourneyState, Stage, NON_DIAGNOSTIC_DISCLAIMER};
use crate::tools::{CaseManagerTool, DocumentVaultTool, ToolError, TravelSearchTool};
use crate::JourneyResult;

const CASE_CREATED: &str = "case.created";
const APPROVAL_REQUIRED: &str = "approval.required";
const TRAVEL_OFFER_GENERATED: &str = "travel.offer.generated";
const PAYMENT_SUCCEEDED: &str = "payment.succeeded";
const DOC_UPLOADED: &str = "doc.uploaded";

/// Integration tool handles available to the workflow; each is optional and
/// failures in any of them never fail a step.
#[derive(Default)]
pub struct WorkflowTools {
    /// Case-management client.
    pub case_manager: Option<CaseManagerTool>,
    /// Flight and hotel search client.
    pub travel: Option<TravelSearchTool>,
    /// Document blob gateway client.
    pub documents: Option<DocumentVaultTool>,
}

/// Outcome of one workflow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeFlow {
    Next,
    Halt,
}

type NodeFn = for<'a> fn(&'a CaseWorkflow, &'a mut JourneyState) -> BoxFuture<'a, JourneyResult<NodeFlow>>;

/// Explicit stage table: execution order, one handler per stage.
const STAGE_TABLE: [(Stage, NodeFn); 9] = [
    (Stage::Intake, intake_step),
    (Stage::Eligibility, eligibility_step),
    (Stage::ProviderMatch, provider_match_step),
    (Stage::Pricing, pricing_step),
    (Stage::Travel, travel_step),
    (Stage::DocsVisa, docs_visa_step),
    (Stage::Approvals, approvals_step),
    (Stage::Itinerary, itinerary_step),
    (Stage::Aftercare, aftercare_step),
];

fn intake_step<'a>(wf: &'a CaseWorkflow, state: &'a mut JourneyState) -> BoxFuture<'a, JourneyResult<NodeFlow>> {
    Box::pin(wf.intake(state))
}

fn eligibility_step<'a>(wf: &'a CaseWorkflow, state: &'a mut JourneyState) -> BoxFuture<'a, JourneyResult<NodeFlow>> {
    Box::pin(wf.eligibility(state))
}

fn provider_match_step<'a>(wf: &'a CaseWorkflow, state: &'a mut JourneyState) -> BoxFuture<'a, JourneyResult<NodeFlow>> {
    Box::pin(wf.provider_match(state))
}

fn pricing_step<'a>(wf: &'a CaseWorkflow, state: &'a mut JourneyState) -> BoxFuture<'a, JourneyResult<NodeFlow>> {
    Box::pin(wf.pricing(state))
}

fn travel_step<'a>(wf: &'a CaseWorkflow, state: &'a mut JourneyState) -> BoxFuture<'a, JourneyResult<NodeFlow>> {
    Box::pin(wf.travel(state))
}

fn docs_visa_step<'a>(wf: &'a CaseWorkflow, state: &'a mut JourneyState) -> BoxFuture<'a, JourneyResult<NodeFlow>> {
    Box::pin(wf.docs_visa(state))
}

fn approvals_step<'a>(wf: &'a CaseWorkflow, state: &'a mut JourneyState) -> BoxFuture<'a, JourneyResult<NodeFlow>> {
    Box::pin(wf.approvals(state))
}

fn itinerary_step<'a>(wf: &'a CaseWorkflow, state: &'a mut JourneyState) -> BoxFuture<'a, JourneyResult<NodeFlow>> {
    Box::pin(wf.itinerary(state))
}

fn aftercare_step<'a>(wf: &'a CaseWorkflow, state: &'a mut JourneyState) -> BoxFuture<'a, JourneyResult<NodeFlow>> {
    Box::pin(wf.aftercare(state))
}

/// Drives a case through the stage table.
///
/// Every node checkpoints the full state plus a compact view, then emits a
/// redacted stage event on the bus. Checkpoint failures fail the step; event
/// emission is best-effort.
pub struct CaseWorkflow {
    store: ContextStore,
    bus: EventBus,
    tools: WorkflowTools,
}

impl CaseWorkflow {
    /// Creates a workflow over the shared store, bus, and tool handles.
    #[must_use]
    pub fn new(store: ContextStore, bus: EventBus, tools: WorkflowTools) -> Self {
        Self { store, bus, tools }
    }

    /// Runs a fresh case from intake until completion or the approval gate.
    ///
    /// # Errors
    ///
    /// Returns [`crate::JourneyError::Checkpoint`] when a checkpoint write
    /// fails; the step is considered failed and the stage does not advance.
    pub async fn run(&self, state: &mut JourneyState) -> JourneyResult<()> {
        self.run_from(state, Stage::Intake).await
    }

    /// Re-enters the stage table at the approval gate and runs forward.
    ///
    /// # Errors
    ///
    /// See [`Self::run`].
    pub async fn resume(&self, state: &mut JourneyState) -> JourneyResult<()> {
        self.run_from(state, Stage::Approvals).await
    }

    async fn run_from(&self, state: &mut JourneyState, from: Stage) -> JourneyResult<()> {
        let Some(start) = STAGE_TABLE.iter().position(|(stage, _)| *stage == from) else {
            return Ok(());
        };
        for (stage, node) in &STAGE_TABLE[start..] {
            debug!(case_id = %state.case_id, stage = %stage, "running journey node");
            if node(self, state).await? == NodeFlow::Halt {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Persists the full checkpoint and the compact case view.
    ///
    /// # Errors
    ///
    /// Returns [`crate::JourneyError::Checkpoint`] when either write fails.
    pub(crate) async fn checkpoint(&self, state: &JourneyState) -> JourneyResult<()> {
        let full = serde_json::to_value(state).unwrap_or(Value::Null);
        self.store
            .set_json(&checkpoint_key(&state.tenant_id, &state.case_id), &full, None)
            .await?;

        let compact = json!({
            "caseId": &state.case_id,
            "stage": state.stage,
            "status": &state.status,
            "updatedAt": &state.updated_at,
        });
        self.store
            .set_json(&case_state_key(&state.tenant_id, &state.case_id), &compact, None)
            .await?;
        Ok(())
    }

    async fn emit(&self, event_type: &str, state: &JourneyState, payload: JsonMap) {
        let mut body = JsonMap::new();
        body.insert("caseId".to_owned(), json!(&state.case_id));
        body.extend(payload);

        let event = HubEvent {
            id: Uuid::new_v4().to_string(),
            tenant_id: state.tenant_id.clone(),
            event_type: event_type.to_owned(),
            source: "journey".to_owned(),
            timestamp: Utc::now(),
            payload: redact_payload(&body),
            session_id: None,
            target_agent: None,
            agent_name: None,
            channel: None,
            correlation_id: Some(state.case_id.clone()),
            metadata: JsonMap::new(),
        };
        self.bus.publish(&event).await;
    }

    async fn intake(&self, state: &mut JourneyState) -> JourneyResult<NodeFlow> {
        state.stage = Stage::Intake;
        state.status = "intake".to_owned();
        state.transcript.push("Intake received and recorded.".to_owned());
        state.add_disclaimer(NON_DIAGNOSTIC_DISCLAIMER);
        state.touch();

        if let Some(tool) = &self.tools.case_manager {
            let payload = json!({
                "tenantId": &state.tenant_id,
                "intake": redact_payload(&state.intake),
            });
            if let Err(err) = tool.start_case(&state.case_id, &payload).await {
                warn!(case_id = %state.case_id, error = %err, "case-management start failed");
            }
        }

        self.checkpoint(state).await?;
        self.emit(CASE_CREATED, state, object(json!({"stage": state.stage}))).await;

        state.stage = Stage::Eligibility;
        state.status = "eligibility".to_owned();
        Ok(NodeFlow::Next)
    }

    async fn eligibility(&self, state: &mut JourneyState) -> JourneyResult<NodeFlow> {
        let bmi = state
            .intake
            .get("metrics")
            .and_then(|metrics| metrics.get("bmi"))
            .and_then(Value::as_f64)
            .unwrap_or(24.0);
        let eligible = bmi < 32.0;
        let (status, note) = if eligible {
            ("eligible", "BMI within acceptable range")
        } else {
            ("needs-review", "BMI requires clinical oversight")
        };

        state.eligibility = object(json!({
            "status": status,
            "bmi": bmi,
            "notes": [note],
        }));
        if !eligible {
            state.red_flags.push("clinical_review_required".to_owned());
        }

        state.stage = Stage::ProviderMatch;
        state.status = "eligibility".to_owned();
        state.touch();
        self.checkpoint(state).await?;
        Ok(NodeFlow::Next)
    }

    async fn provider_match(&self, state: &mut JourneyState) -> JourneyResult<NodeFlow> {
        let preferences = state
            .intake
            .get("travelPreferences")
            .cloned()
            .unwrap_or_else(|| json!({}));
        state.docs.insert(
            "provider_match".to_owned(),
            json!({
                "primary": {
                    "id": "provider-istanbul-1",
                    "name": "Istanbul Care Hospital",
                    "score": 0.92,
                    "language_support": ["en", "tr"],
                },
                "alternatives": [
                    {"id": "provider-ankara-1", "name": "Ankara Ortho Center", "score": 0.88}
                ],
                "preferences": preferences,
            }),
        );

        if let Some(tool) = &self.tools.case_manager {
            let note = format!("Matched providers for case {}", state.case_id);
            if let Err(err) = tool.add_note(&state.case_id, &note, None).await {
                debug!(case_id = %state.case_id, error = %err, "case note skipped");
            }
        }

        state.stage = Stage::Pricing;
        state.status = "provider-match".to_owned();
        state.touch();
        self.checkpoint(state).await?;
        Ok(NodeFlow::Next)
    }

    async fn pricing(&self, state: &mut JourneyState) -> JourneyResult<NodeFlow> {
        let base_price = 6200.0_f64;
        let budget = state
            .intake
            .get("budget")
            .and_then(|budget| budget.get("maxAmount"))
            .and_then(Value::as_f64);
        let base = budget.map_or(base_price, |cap| base_price.min(cap));
        let travel_allowance = 900.0_f64;
        let total = base + travel_allowance;

        state.pricing = object(json!({
            "currency": "EUR",
            "total": total,
            "travel": travel_allowance,
            "breakdown": {
                "procedure": base - 1200.0,
                "hospital": 1200.0,
                "travel": travel_allowance,
            },
            "disclaimer": NON_DIAGNOSTIC_DISCLAIMER,
        }));

        state.stage = Stage::Travel;
        state.status = "pricing".to_owned();
        state.touch();
        self.checkpoint(state).await?;
        self.emit(
            PAYMENT_SUCCEEDED,
            state,
            object(json!({"amount": total, "currency": "EUR"})),
        )
        .await;
        Ok(NodeFlow::Next)
    }

    async fn travel(&self, state: &mut JourneyState) -> JourneyResult<NodeFlow> {
        let preferences = state
            .intake
            .get("travelPreferences")
            .cloned()
            .unwrap_or_else(|| json!({}));

        let mut flights = json!({});
        let mut hotels = json!({});
        if let Some(tool) = &self.tools.travel {
            let query = json!({"preferences": preferences});
            let searched: Result<(Value, Value), ToolError> = async {
                let flights = tool.search_flights(&query).await?;
                let hotels = tool.search_hotels(&query).await?;
                Ok((flights, hotels))
            }
            .await;
            match searched {
                Ok((found_flights, found_hotels)) => {
                    flights = found_flights;
                    hotels = found_hotels;
                }
                Err(err) => {
                    warn!(case_id = %state.case_id, error = %err, "travel search fallback");
                    let departure = Utc::now() + TimeDelta::days(21);
                    flights = json!({
                        "itineraries": [{
                            "carrier": "TK",
                            "number": "TK34",
                            "origin": "LHR",
                            "destination": "IST",
                            "departure": departure.to_rfc3339(),
                        }]
                    });
                    hotels = json!({
                        "options": [{"name": "Harbiye Surgical Suites", "nights": 7}]
                    });
                }
            }
        }

        state.travel = object(json!({
            "flights": pick(&flights, "itineraries"),
            "hotels": pick(&hotels, "options"),
        }));

        state.stage = Stage::DocsVisa;
        state.status = "travel".to_owned();
        state.touch();
        self.checkpoint(state).await?;
        self.emit(
            TRAVEL_OFFER_GENERATED,
            state,
            object(json!({"offers": &state.travel})),
        )
        .await;
        Ok(NodeFlow::Next)
    }

    async fn docs_visa(&self, state: &mut JourneyState) -> JourneyResult<NodeFlow> {
        let documents = json!([
            {"name": "Passport copy", "status": "required"},
            {"name": "Medical history", "status": "required"},
            {"name": "Treatment plan", "status": "optional"},
        ]);
        state.docs.insert(
            "visa_requirements".to_owned(),
            json!({
                "documents": &documents,
                "processing_time_days": 10,
                "disclaimer": NON_DIAGNOSTIC_DISCLAIMER,
            }),
        );

        if let Some(vault) = &self.tools.documents {
            let key = format!("{}/checklist.json", state.case_id);
            let uploaded = async {
                vault.upload(&key, b"{}".to_vec(), "application/json").await?;
                vault.presign(&key, std::time::Duration::from_secs(3600)).await
            }
            .await;
            match uploaded {
                Ok(url) => {
                    state.docs.insert("uploadLink".to_owned(), json!(url));
                }
                Err(err) => {
                    debug!(case_id = %state.case_id, error = %err, "document upload skipped");
                }
            }
        }

        state.stage = Stage::Approvals;
        state.status = "docs".to_owned();
        state.touch();
        self.checkpoint(state).await?;
        self.emit(
            DOC_UPLOADED,
            state,
            object(json!({"documents": {"items": documents}})),
        )
        .await;
        Ok(NodeFlow::Next)
    }

    async fn approvals(&self, state: &mut JourneyState) -> JourneyResult<NodeFlow> {
        state.approvals.clear();
        if state.red_flags.is_empty() {
            state.stage = Stage::Itinerary;
            state.status = "approved".to_owned();
            state.touch();
            self.checkpoint(state).await?;
            return Ok(NodeFlow::Next);
        }

        state.approvals.push(json!({
            "id": format!("approval-{}", state.case_id),
            "type": "clinical_review",
            "payload": {"flags": &state.red_flags},
        }));
        state.stage = Stage::AwaitingApproval;
        state.status = "awaiting-approval".to_owned();
        state.touch();
        self.checkpoint(state).await?;
        self.emit(
            APPROVAL_REQUIRED,
            state,
            object(json!({"flags": &state.red_flags})),
        )
        .await;
        Ok(NodeFlow::Halt)
    }

    async fn itinerary(&self, state: &mut JourneyState) -> JourneyResult<NodeFlow> {
        let start = Utc::now() + TimeDelta::days(22);
        let procedure = state
            .intake
            .get("targetProcedure")
            .and_then(Value::as_str)
            .unwrap_or("Procedure");
        state.itinerary = object(json!({
            "events": [
                {"id": "consult-1", "title": "Pre-op consultation", "start": start.to_rfc3339()},
                {
                    "id": "surgery",
                    "title": redact_text(procedure),
                    "start": (start + TimeDelta::days(1)).to_rfc3339(),
                },
            ],
            "disclaimer": NON_DIAGNOSTIC_DISCLAIMER,
        }));

        state.stage = Stage::Aftercare;
        state.status = "itinerary".to_owned();
        state.touch();
        self.checkpoint(state).await?;
        Ok(NodeFlow::Next)
    }

    async fn aftercare(&self, state: &mut JourneyState) -> JourneyResult<NodeFlow> {
        state.aftercare = object(json!({
            "virtual_followups": 3,
            "local_clinic": "Partner Clinic - London",
            "disclaimer": NON_DIAGNOSTIC_DISCLAIMER,
        }));

        state.stage = Stage::Completed;
        state.status = "completed".to_owned();
        state.touch();
        self.checkpoint(state).await?;
        Ok(NodeFlow::Next)
    }
}

/// Key of the full checkpoint for a case.
pub(crate) fn checkpoint_key(tenant_id: &str, case_id: &str) -> String {
    let tenant = if tenant_id.is_empty() { "system" } else { tenant_id };
    format!("{tenant}:lg:ckpt:{case_id}")
}

/// Key of the compact case view.
pub(crate) fn case_state_key(tenant_id: &str, case_id: &str) -> String {
    let tenant = if tenant_id.is_empty() { "system" } else { tenant_id };
    format!("{tenant}:case:state:{case_id}")
}

fn object(value: Value) -> JsonMap {
    value.as_object().cloned().unwrap_or_default()
}

fn pick(response: &Value, key: &str) -> Value {
    match response.get(key) {
        Some(inner)
            if !inner.is_null() && !inner.as_array().is_some_and(Vec::is_empty) =>
        {
            inner.clone()
        }
        _ => response.clone(),
    }
}
