//! Stages and the run state machine

/// One step of the pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Retrieve,
    Analyze,
    Draft,
    Critique,
    Refine,
}

impl Stage {
    /// Progress label sent to the client before the stage runs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Retrieve => "Retrieving relevant information...",
            Self::Analyze => "Analyzing retrieved information...",
            Self::Draft => "Generating creative response...",
            Self::Critique => "Evaluating response quality...",
            Self::Refine => "Refining response...",
        }
    }

    /// State the run is in while this stage executes
    pub fn state(&self) -> PipelineState {
        match self {
            Self::Retrieve => PipelineState::Retrieving,
            Self::Analyze => PipelineState::Analyzing,
            Self::Draft => PipelineState::Drafting,
            Self::Critique => PipelineState::Critiquing,
            Self::Refine => PipelineState::Refining,
        }
    }
}

/// Lifecycle of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Retrieving,
    Analyzing,
    Drafting,
    Critiquing,
    Refining,
    Complete,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;

        if self.is_terminal() {
            return false;
        }
        matches!(
            (*self, next),
            (_, Failed)
                | (Idle, Retrieving)
                | (Retrieving, Analyzing)
                | (Analyzing, Drafting)
                | (Drafting, Critiquing)
                | (Critiquing, Refining)
                | (Refining, Critiquing)
                | (Critiquing, Complete)
                | (Refining, Complete)
        )
    }
}
