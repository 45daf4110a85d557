//! The repository registry and per-skill handles.

mod handle;
mod repository;

pub use handle::SkillHandle;
pub use repository::SkillsRepository;
