//! PeerRank-Evaluator: rubric scoring through an LLM
//!
//! Implements [`peerrank_core::RubricEvaluator`] against any endpoint that
//! speaks the OpenAI chat-completions protocol.
//!
//! ## Layer 2 - External Oracles
//!
//! Focus: one idempotent request per review text, honest error
//! classification so the scorer knows what is worth retrying.

mod config;
mod error;
mod openai;

pub use config::{EvaluatorConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use error::{classify_status, transport_error};
pub use openai::{build_request_body, parse_reply, user_prompt, OpenAiEvaluator, MAX_REVIEW_CHARS};
