//! Public evaluation entry point for the policy engine.

use super::model::{evaluate_inner, Decision, Policy, Request};
use crate::errors::Result;

/// Evaluate `policy` against `request`, returning the first matching
/// rule's decision, or a deny with `"no-matching-rule"` if none match.
pub fn evaluate(policy: &Policy, request: &Request) -> Result<Decision> {
    evaluate_inner(policy, request)
}
