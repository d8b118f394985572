pub mod keep_policy;

pub use keep_policy::{resolve, Candidate, KeepDecision, Reason};
