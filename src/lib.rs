//! Adaptive question-style engine for certification exam prep.
//!
//! - `selector` picks direct / scenario / case_study per objective, steering a
//!   session toward the target mix without randomness
//! - `distribution` keeps per-session running counts and a health score
//! - `template_cache` shares prompt skeletons across exams of one family
//! - `validator` scores a finished question against its intended style
//!
//! `state::AppState` wires these together; `routes` exposes them over HTTP.

pub mod config;
pub mod distribution;
pub mod domain;
pub mod error;
pub mod openai;
pub mod protocol;
pub mod registry;
pub mod routes;
pub mod seeds;
pub mod selector;
pub mod state;
pub mod telemetry;
pub mod template_cache;
pub mod templates;
pub mod util;
pub mod validator;

pub use error::{EngineError, Result};
pub use state::AppState;
