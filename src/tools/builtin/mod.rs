//! Built-in tool implementations, one module per capability domain.

pub mod dictionaries;
pub mod llm_ping;
pub mod marketplace;
pub mod planner;
pub mod storage;
