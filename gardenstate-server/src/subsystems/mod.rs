pub mod context;
pub mod enrich;
pub mod listener;
pub mod media;
pub mod parser;
pub mod prompts;
pub mod queue;
pub mod writer;
