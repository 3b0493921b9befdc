//! Port traits the conversation engine depends on

pub mod history;
pub mod llm;
pub mod memory;

pub use history::HistoryStore;
pub use llm::LLMProvider;
pub use memory::MemoryStore;
