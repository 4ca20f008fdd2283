// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `conductor-swarm`: Multi-Agent Coordination Crate
//!
//! Fans one message out to a group of agents and lets agents invoke other
//! agents as tools without runaway recursion.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `BroadcastGroup`, `BroadcastResult`, `SubAgentConfig`, `SubAgentContext` |
//! | [`application`] | Application | `BroadcastManager`, `SubAgentManager` and their executor traits |
//!
//! ## Key Concepts
//!
//! - **Broadcast group**: a fixed list of target agent ids delivered to in
//!   `all`, `race` or `fallback` mode.
//! - **Recursion guard**: depth limit, allow/block lists and a sliding-window
//!   loop check applied before every sub-agent call.
//! - **Executor**: caller-supplied trait object resolving an agent id to an
//!   actual call. Approval policies and tracing plug in here.

pub mod domain;
pub mod application;

pub use application::broadcast::{BroadcastExecutor, BroadcastManager};
pub use application::subagent::{SubAgentExecutor, SubAgentManager};
pub use domain::*;
