//! Adapter between an agent-style conversational model interface and the
//! LM Studio REST API.

pub mod api;
pub mod core;
pub mod inference;

#[cfg(test)]
pub mod test_support;
