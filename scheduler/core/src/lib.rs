// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Slotkeeper Core
//!
//! Concurrency-safe reservation of capacity-limited activity slots.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, claim coordinator, resource stores

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
