// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Domain Layer
//!
//! Pure domain types for multi-agent coordination. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`broadcast`] | `BroadcastGroup`, `BroadcastMode`, `BroadcastResult` |
//! | [`subagent`] | `SubAgentConfig`, `SubAgentCall`, `SubAgentContext` |

pub mod broadcast;
pub mod subagent;

pub use broadcast::*;
pub use subagent::*;
