//! Runtime configuration
use crate::error::WorkflowError;
use crate::types::Money;
use anyhow::Context;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Whether a trip may get another advance request once one exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdvanceResubmission {
    /// Any existing advance request blocks a new one, whatever its status.
    #[default]
    Never,
    /// Only rejected advances may be followed by a fresh request.
    AfterRejection,
}

impl FromStr for AdvanceResubmission {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" => Ok(Self::Never),
            "after_rejection" => Ok(Self::AfterRejection),
            other => Err(WorkflowError::Config(format!(
                "unknown advance resubmission policy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Largest amount a single payment request may carry.
    pub amount_ceiling: Money,
    pub advance_resubmission: AdvanceResubmission,
    pub db_path: PathBuf,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            amount_ceiling: 10_000_000,
            advance_resubmission: AdvanceResubmission::Never,
            db_path: PathBuf::from("trip_workflow.db"),
        }
    }
}

impl WorkflowConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let amount_ceiling = match env::var("TRIP_WORKFLOW_AMOUNT_CEILING") {
            Ok(raw) => raw
                .parse::<Money>()
                .with_context(|| format!("TRIP_WORKFLOW_AMOUNT_CEILING must be a number, got '{raw}'"))?,
            Err(_) => defaults.amount_ceiling,
        };
        let advance_resubmission = match env::var("TRIP_WORKFLOW_ADVANCE_RESUBMISSION") {
            Ok(raw) => raw
                .parse::<AdvanceResubmission>()
                .context("TRIP_WORKFLOW_ADVANCE_RESUBMISSION")?,
            Err(_) => defaults.advance_resubmission,
        };
        let db_path = env::var("TRIP_WORKFLOW_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let config = Self {
            amount_ceiling,
            advance_resubmission,
            db_path,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.amount_ceiling == 0 {
            return Err(WorkflowError::Config(
                "amount ceiling must be positive".into(),
            ));
        }
        Ok(())
    }
}
