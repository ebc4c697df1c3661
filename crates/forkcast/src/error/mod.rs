// SPDX-License-Identifier: GPL-3.0

//! Error types for simulation operations.
//!
//! This module contains all error types used throughout the `forkcast` crate,
//! organized by context:
//!
//! - [`cache::CacheError`] - Errors from the block/storage database adapter.
//! - [`engine::EngineError`] - Errors from the fork engine seam.
//! - [`rpc::RpcClientError`] - Errors from live-chain RPC operations.
//! - [`simulator::SimulatorError`] - Errors raised inside the simulation pipelines.

pub mod cache;
pub mod engine;
pub mod rpc;
pub mod simulator;

pub use cache::CacheError;
pub use engine::EngineError;
pub use rpc::RpcClientError;
pub use simulator::SimulatorError;
