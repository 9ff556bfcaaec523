// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Attribute-Based Access Control (ABAC).
//!
//! Policies match on resource patterns, actions and typed attribute
//! conditions. An applicable deny always beats an applicable allow; when no
//! policy applies the caller falls back to RBAC.

mod engine;
mod types;

pub(crate) use engine::deny_actions;
pub use engine::{PolicyEngine, USER_DENY_PREFIX};
pub use types::{
    pattern_matches, Attribute, AttributeValue, Effect, EvaluationContext, Operator, Policy,
    PolicyCondition, PolicyDecision, PolicyMatch,
};
