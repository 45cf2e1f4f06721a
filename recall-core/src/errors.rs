use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SrsError {
    #[error("grade must be between 0 and 5, got {0}")]
    InvalidGrade(i32),
    #[error("interval_days must be a non-negative finite number, got {0}")]
    InvalidInterval(f64),
}
