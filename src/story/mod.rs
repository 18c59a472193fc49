// Story assembly: title, entity roll-up, identity and the output records
pub mod assemble;
pub mod entities;
pub mod identity;
pub mod title;
pub mod types;

pub use assemble::{assemble_story, story_articles, StoryContext};
pub use entities::aggregate_entities;
pub use identity::{clustering_fingerprint, generate_story_id};
pub use title::select_title;
pub use types::*;
