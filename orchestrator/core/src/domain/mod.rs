// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Value types and pure algorithms shared by every orchestration component.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Agent contract, run results, graph validation, configuration

pub mod agent;
pub mod slush;
pub mod run;
pub mod chain;
pub mod graph;
pub mod events;
pub mod kernel_config;
