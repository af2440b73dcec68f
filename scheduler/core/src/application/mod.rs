// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod claim_coordinator;
pub mod repository_factory;

pub use claim_coordinator::{ClaimCoordinator, ClaimPolicy, ClaimService};
pub use repository_factory::create_resource_store;
