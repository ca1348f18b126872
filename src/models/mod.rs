// src/models/mod.rs
pub mod pipeline;
pub mod response;

pub use pipeline::{
    OperationKind, OverallStatus, Pipeline, StepName, StepState, StepStatus,
};
pub use response::ApiResponse;
