pub mod coherence_prompts;
pub mod map_prompts;
mod tables;

pub use tables::map_tables;
