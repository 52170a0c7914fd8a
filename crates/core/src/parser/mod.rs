//! Release-name parsing.
//!
//! The rest of the crate only depends on [`TitleParser`]; [`SceneTitleParser`]
//! is the default implementation for scene and fansub naming conventions.

mod scene;
mod types;

pub use scene::SceneTitleParser;
pub use types::{ParsedTitle, TitleParser};
