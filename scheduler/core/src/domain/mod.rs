// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Aggregates, value objects and the persistence contract for slot claims.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and rules, no I/O

pub mod activity;
pub mod agent;
pub mod claim;
pub mod events;
pub mod overlap;
pub mod repository;
pub mod scheduler_config;
