//! The uniform tool surface exposed to external agents.

mod envelope;
mod surface;

pub use envelope::{
    asset_response, error_response, execution_response, instructions_response, metadata_response,
    reference_response, safe_call, search_response, ResponseType, ToolResponse,
};
pub use surface::{RunRequest, SkillsToolbox};
