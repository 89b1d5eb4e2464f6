use serde::{Deserialize, Serialize};

use crate::error::PreconditionError;
use crate::params::ProcessingParameters;

// ---------------------------------------------------------------------------
// Template – frozen output of phase 1
// ---------------------------------------------------------------------------

/// Feature positions and the parameters that produced them. Immutable once
/// built; phase 2 only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Detected m/z positions, ascending.
    pub features: Vec<f64>,
    pub parameters: ProcessingParameters,
    pub training_samples: usize,
    /// Group labels of the training set, first-seen order.
    pub groups: Vec<String>,
}

impl Template {
    pub fn new(
        mut features: Vec<f64>,
        parameters: ProcessingParameters,
        training_samples: usize,
        groups: Vec<String>,
    ) -> Self {
        features.sort_by(|a, b| a.total_cmp(b));
        Self {
            features,
            parameters,
            training_samples,
            groups,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// ---------------------------------------------------------------------------
// Workflow state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub enum WorkflowState {
    #[default]
    NoTemplate,
    TemplateReady(Template),
}

/// Per-session workflow state. Owned by the application and passed by
/// reference to whatever handles a request; there is no global instance.
#[derive(Debug, Default)]
pub struct Session {
    state: WorkflowState,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn template(&self) -> Option<&Template> {
        match &self.state {
            WorkflowState::TemplateReady(t) => Some(t),
            WorkflowState::NoTemplate => None,
        }
    }

    pub fn has_template(&self) -> bool {
        self.template().is_some()
    }

    /// Guard for phase 1: only allowed while no template exists.
    pub fn ensure_can_build(&self) -> Result<(), PreconditionError> {
        match self.state {
            WorkflowState::NoTemplate => Ok(()),
            WorkflowState::TemplateReady(_) => Err(PreconditionError::TemplateExists),
        }
    }

    /// Guard for phase 2: the template to apply.
    pub fn require_template(&self) -> Result<&Template, PreconditionError> {
        self.template().ok_or(PreconditionError::NoTemplate)
    }

    /// `NoTemplate → TemplateReady`. Rejected if a template already exists.
    pub fn establish(&mut self, template: Template) -> Result<&Template, PreconditionError> {
        self.ensure_can_build()?;
        log::info!(
            "Template established: {} features from {} training samples",
            template.features.len(),
            template.training_samples
        );
        self.state = WorkflowState::TemplateReady(template);
        self.require_template()
    }

    /// Explicit user action: drop the template and return to `NoTemplate`.
    pub fn discard_template(&mut self) -> Option<Template> {
        match std::mem::take(&mut self.state) {
            WorkflowState::TemplateReady(t) => {
                log::info!("Template discarded");
                Some(t)
            }
            WorkflowState::NoTemplate => None,
        }
    }
}
