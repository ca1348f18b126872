use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One phase of a pipeline's fixed sequence, declared in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepName {
    Initialization,
    ProviderSetup,
    ContractSetup,
    FeeEstimation,
    NonceSetup,
    Submission,
    Confirmation,
}

impl StepName {
    pub const ALL: [StepName; 7] = [
        StepName::Initialization,
        StepName::ProviderSetup,
        StepName::ContractSetup,
        StepName::FeeEstimation,
        StepName::NonceSetup,
        StepName::Submission,
        StepName::Confirmation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Initialization => "initialization",
            StepName::ProviderSetup => "providerSetup",
            StepName::ContractSetup => "contractSetup",
            StepName::FeeEstimation => "feeEstimation",
            StepName::NonceSetup => "nonceSetup",
            StepName::Submission => "submission",
            StepName::Confirmation => "confirmation",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn next(&self) -> Option<StepName> {
        StepName::ALL.get(self.index() + 1).copied()
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Error,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Pending,
    Submitted,
    Confirmed,
    Error,
}

impl OverallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OverallStatus::Confirmed | OverallStatus::Error)
    }
}

/// The write operation a pipeline carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Mint,
    CreateProposal,
    Vote,
    CloseProposal,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Mint => "mint",
            OperationKind::CreateProposal => "createProposal",
            OperationKind::Vote => "vote",
            OperationKind::CloseProposal => "closeProposal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepState {
    pub name: StepName,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub diagnostics: Map<String, Value>,
}

impl StepState {
    pub fn new(name: StepName) -> Self {
        Self {
            name,
            status: StepStatus::Pending,
            started_at: None,
            ended_at: None,
            attempts: 0,
            max_attempts: None,
            diagnostics: Map::new(),
        }
    }

    pub fn diagnostic_str(&self, key: &str) -> Option<&str> {
        self.diagnostics.get(key).and_then(Value::as_str)
    }

    pub fn diagnostic_u64(&self, key: &str) -> Option<u64> {
        self.diagnostics.get(key).and_then(Value::as_u64)
    }
}

/// One tracked write-operation lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: String,
    pub kind: OperationKind,
    pub overall_status: OverallStatus,
    pub created_at: DateTime<Utc>,
    pub payload: Value,
    pub steps: Vec<StepState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub peak_progress: u8,
}

impl Pipeline {
    pub fn new(id: String, kind: OperationKind, payload: Value, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            overall_status: OverallStatus::Pending,
            created_at,
            payload,
            steps: StepName::ALL.iter().copied().map(StepState::new).collect(),
            result: None,
            error: None,
            peak_progress: 0,
        }
    }

    pub fn step(&self, name: StepName) -> Option<&StepState> {
        self.steps.iter().find(|step| step.name == name)
    }

    /// Returns the step entry, inserting it at its ordered position if a
    /// deserialized pipeline lacks it.
    pub fn step_mut(&mut self, name: StepName) -> &mut StepState {
        let position = match self.steps.iter().position(|step| step.name == name) {
            Some(position) => position,
            None => {
                let at = self
                    .steps
                    .iter()
                    .position(|step| step.name > name)
                    .unwrap_or(self.steps.len());
                self.steps.insert(at, StepState::new(name));
                at
            }
        };
        &mut self.steps[position]
    }

    pub fn step_status(&self, name: StepName) -> StepStatus {
        self.step(name)
            .map(|step| step.status)
            .unwrap_or(StepStatus::Pending)
    }

    pub fn tx_hash(&self) -> Option<&str> {
        self.step(StepName::Submission)
            .and_then(|step| step.diagnostic_str("txHash"))
    }

    pub fn reference_link(&self) -> Option<&str> {
        self.step(StepName::Submission)
            .and_then(|step| step.diagnostic_str("referenceLink"))
    }

    pub fn is_terminal(&self) -> bool {
        self.overall_status.is_terminal()
    }
}
