//! These models represent the objects passed around by the agent
//!
//! There are a few different related formats we need to interact with:
//! - harmony tagged messages, decoded from raw model completions
//! - openai chat messages/tools, sent from the agent to the LLM
//! - decisions, produced by interpreting a model response
//!
//! We always convert those formats into the internal structs defined here, which
//! are not an exact match to any of them.
pub mod content;
pub mod decision;
pub mod message;
pub mod response;
pub mod role;
pub mod tool;
