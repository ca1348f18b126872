use crate::models::{OverallStatus, Pipeline, StepName, StepState, StepStatus};

/// Share of the overall percentage carried by each step. Sums to 100.
pub fn step_weight(step: StepName) -> f64 {
    match step {
        StepName::Initialization => 10.0,
        StepName::ProviderSetup => 10.0,
        StepName::ContractSetup => 10.0,
        StepName::FeeEstimation => 10.0,
        StepName::NonceSetup => 10.0,
        StepName::Submission => 25.0,
        StepName::Confirmation => 25.0,
    }
}

pub fn status_fraction(status: StepStatus) -> f64 {
    match status {
        StepStatus::Pending => 0.0,
        StepStatus::Retry => 0.3,
        StepStatus::InProgress => 0.5,
        StepStatus::Completed => 1.0,
        StepStatus::Error => 0.0,
    }
}

/// Weighted sum of step completion, rounded to a whole percent.
pub fn weighted_percent(steps: &[StepState]) -> u8 {
    let total: f64 = steps
        .iter()
        .map(|step| step_weight(step.name) * status_fraction(step.status))
        .sum();
    total.round().clamp(0.0, 100.0) as u8
}

/// Progress reported to clients.
///
/// `CONFIRMED` always reads 100 and `ERROR` reads the plain weighted sum.
/// Otherwise the weighted sum is floored by the highest value already
/// reported, so a step falling back to `RETRY` between submission attempts
/// does not move the bar backwards.
pub fn percent(pipeline: &Pipeline) -> u8 {
    match pipeline.overall_status {
        OverallStatus::Confirmed => 100,
        OverallStatus::Error => weighted_percent(&pipeline.steps),
        _ => weighted_percent(&pipeline.steps).max(pipeline.peak_progress),
    }
}
