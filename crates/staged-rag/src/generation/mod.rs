//! Prompt construction for the stage pipeline

pub mod prompt;

pub use prompt::{KbProfile, PromptBuilder, GROUNDING_RULE, NO_SOURCES};
