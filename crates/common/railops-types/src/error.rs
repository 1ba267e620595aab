use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("malformed employee code: {0}")]
    MalformedEmployeeCode(String),

    #[error("unknown department: {0}")]
    UnknownDepartment(String),

    #[error("unknown standard code: {0}")]
    UnknownStandard(String),

    #[error("unknown category code: {0}")]
    UnknownCategory(String),

    #[error("fault checklist must carry exactly {expected} flags, got {got}")]
    ChecklistSize { expected: usize, got: usize },

    #[error("fault checklist with zero flags set carries no responsibility")]
    EmptyChecklist,

    #[error("points value out of range: {0}")]
    PointsOutOfRange(f64),
}
