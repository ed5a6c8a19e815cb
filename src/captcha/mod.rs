//! Captcha module - access-control challenge handling
//!
//! Detects the challenge widget on the current page, obtains a solution
//! token from an external token service, and injects it back so the
//! portal lets the session through.

pub mod provider;
pub mod solver;

pub use provider::{HttpTokenProvider, TokenProvider};
pub use solver::{ChallengeOutcome, ChallengeSolver};
