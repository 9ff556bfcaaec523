// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Role-Based Access Control (RBAC).
//!
//! This module provides:
//! - The closed role hierarchy
//! - Permission definitions and wildcard-aware permission sets
//! - The [`PermissionCatalog`] resolving users to effective permissions

mod catalog;
pub mod permission;
mod role;

pub use catalog::{PermissionCatalog, PermissionCatalogBuilder};
pub use permission::{Permission, PermissionSet, ALL_PERMISSIONS, WILDCARD};
pub use role::Role;
