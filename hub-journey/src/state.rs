//! Durable case state.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use hub_primitives::JsonMap;

/// Disclaimer carried by every case from intake onwards.
pub const NON_DIAGNOSTIC_DISCLAIMER: &str = "This platform provides educational, non-diagnostic support only. All medical decisions must be validated by licensed clinicians.";

/// Stages of the case journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Stage {
    /// Intake received.
    #[default]
    #[serde(rename = "intake")]
    Intake,
    /// Clinical eligibility screening.
    #[serde(rename = "eligibility")]
    Eligibility,
    /// Provider matching.
    #[serde(rename = "provider_match")]
    ProviderMatch,
    /// Pricing computation.
    #[serde(rename = "pricing")]
    Pricing,
    /// Travel search.
    #[serde(rename = "travel")]
    Travel,
    /// Documents and visa checklist.
    #[serde(rename = "docs_visa")]
    DocsVisa,
    /// Approval gate evaluation.
    #[serde(rename = "approvals")]
    Approvals,
    /// Halted waiting for an external approval decision.
    #[serde(rename = "awaiting-approval")]
    AwaitingApproval,
    /// Held after a rejected approval decision.
    #[serde(rename = "awaiting-decision")]
    AwaitingDecision,
    /// Itinerary assembly.
    #[serde(rename = "itinerary")]
    Itinerary,
    /// Aftercare planning.
    #[serde(rename = "aftercare")]
    Aftercare,
    /// Journey finished.
    #[serde(rename = "completed")]
    Completed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Intake => "intake",
            Self::Eligibility => "eligibility",
            Self::ProviderMatch => "provider_match",
            Self::Pricing => "pricing",
            Self::Travel => "travel",
            Self::DocsVisa => "docs_visa",
            Self::Approvals => "approvals",
            Self::AwaitingApproval => "awaiting-approval",
            Self::AwaitingDecision => "awaiting-decision",
            Self::Itinerary => "itinerary",
            Self::Aftercare => "aftercare",
            Self::Completed => "completed",
        })
    }
}

/// Working state of one case journey.
///
/// `updated_at` advances monotonically within a case; `approvals` is
/// non-empty exactly when the case halted at the approval gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyState {
    /// Owning tenant.
    pub tenant_id: String,
    /// Case identifier.
    pub case_id: String,
    /// Intake form as submitted.
    #[serde(default)]
    pub intake: JsonMap,
    /// Patient details as submitted.
    #[serde(default)]
    pub patient: JsonMap,
    /// Current stage.
    #[serde(default)]
    pub stage: Stage,
    /// Human-facing status string.
    #[serde(default)]
    pub status: String,
    /// Free-text clinical summary.
    #[serde(default)]
    pub clinical_summary: String,
    /// Eligibility screening outcome.
    #[serde(default)]
    pub eligibility: JsonMap,
    /// Pricing summary.
    #[serde(default)]
    pub pricing: JsonMap,
    /// Travel offers.
    #[serde(default)]
    pub travel: JsonMap,
    /// Document artefacts keyed by purpose.
    #[serde(default)]
    pub docs: JsonMap,
    /// Pending or recorded approvals.
    #[serde(default)]
    pub approvals: Vec<Value>,
    /// Assembled itinerary.
    #[serde(default)]
    pub itinerary: JsonMap,
    /// Aftercare plan.
    #[serde(default)]
    pub aftercare: JsonMap,
    /// Disclaimers attached to the case.
    #[serde(default)]
    pub disclaimers: Vec<String>,
    /// Clinical red flags raised during screening.
    #[serde(default)]
    pub red_flags: Vec<String>,
    /// Narrative transcript entries.
    #[serde(default)]
    pub transcript: Vec<String>,
    /// Last update timestamp (RFC 3339).
    #[serde(default)]
    pub updated_at: String,
}

impl JourneyState {
    /// Creates a fresh case at intake.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        case_id: impl Into<String>,
        patient: JsonMap,
        intake: JsonMap,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            case_id: case_id.into(),
            intake,
            patient,
            stage: Stage::Intake,
            status: "intake".to_owned(),
            clinical_summary: String::new(),
            eligibility: JsonMap::new(),
            pricing: JsonMap::new(),
            travel: JsonMap::new(),
            docs: JsonMap::new(),
            approvals: Vec::new(),
            itinerary: JsonMap::new(),
            aftercare: JsonMap::new(),
            disclaimers: vec![NON_DIAGNOSTIC_DISCLAIMER.to_owned()],
            red_flags: Vec::new(),
            transcript: Vec::new(),
            updated_at: now_stamp(),
        }
    }

    /// Adds a disclaimer once.
    pub fn add_disclaimer(&mut self, text: &str) {
        if !self.disclaimers.iter().any(|existing| existing == text) {
            self.disclaimers.push(text.to_owned());
        }
    }

    /// Bumps the update timestamp.
    pub fn touch(&mut self) {
        self.updated_at = now_stamp();
    }
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
