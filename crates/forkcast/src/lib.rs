// SPDX-License-Identifier: GPL-3.0

//! Simulation of extrinsics against ephemeral forks of live Polkadot SDK chains.
//!
//! A caller proposes one or more encoded extrinsics and learns, before
//! committing anything, whether they would succeed, what they would cost, and
//! how account balances would change. Nothing is ever broadcast: state is
//! forked at a chosen block, operations execute against the fork, and the
//! fork is discarded.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      SimulationBackend                          │
//! │        (local in-process  /  remote over HTTP, probed)          │
//! └─────────────────────────────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Simulator                               │
//! │   simulate()            one fork, one dry run                   │
//! │   simulate_sequence()   one fork, one real block per item       │
//! └─────────────────────────────────────────────────────────────────┘
//!              │                    │                    │
//!              ▼                    ▼                    ▼
//! ┌────────────────────┐ ┌───────────────────┐ ┌────────────────────┐
//! │ LiveChain (subxt)  │ │ ForkEngine (seam) │ │ ForkDatabase       │
//! │ head, fees,        │ │ fork / dry-run /  │ │ (SQLite or memory, │
//! │ metadata, name     │ │ build block       │ │  genesis-scoped)   │
//! └────────────────────┘ └───────────────────┘ └────────────────────┘
//! ```
//!
//! The heavy fork executor (a full runtime host that lazily mirrors remote
//! state) is an external collaborator behind the [`ForkEngine`] seam;
//! [`RpcForkEngine`] consumes a chopsticks-compatible fork service over
//! WebSocket JSON-RPC.
//!
//! # Example
//!
//! ```ignore
//! use forkcast::{ChainClient, RpcForkEngine, Simulator, SimulationRequest};
//!
//! let chain = ChainClient::connect(&"wss://rpc.polkadot.io".parse()?).await?;
//! let simulator = Simulator::new(Arc::new(RpcForkEngine::new(engine_url)));
//!
//! let result = simulator.simulate(&chain, &request, None).await;
//! if result.success {
//!     println!("would succeed, fee ≈ {}", result.estimated_fee);
//! } else {
//!     println!("would fail: {}", result.error.unwrap());
//! }
//! ```

mod balance;
mod cache;
mod delegation;
mod engine;
pub mod error;
mod hash;
mod outcome;
pub mod policy;
mod rpc;
mod sequential;
mod simulator;
mod strings;
#[cfg(test)]
pub(crate) mod testing;
mod types;

pub use balance::{AccountData, AccountInfo, account_storage_key};
pub use cache::{BlockEntry, ForkDatabase, MemoryDatabase, SqliteDatabase, open_database};
pub use delegation::{
	SequenceItemBody, SimulateBody, SimulateSequentialBody, SimulationBackend,
	client::RemoteBackend, select_backend, server::LocalBackend, server::router,
};
pub use engine::{BuiltBlock, DryRunOutcome, Fork, ForkConfig, ForkEngine, ForkHead, RpcForkEngine};
pub use error::{CacheError, EngineError, RpcClientError, SimulatorError};
pub use hash::normalize_block_hash;
pub use outcome::{DispatchOutcome, decode_apply_result};
pub use rpc::{ChainClient, LiveChain};
pub use simulator::{AnchorPolicy, Simulator, SimulatorConfig};
pub use types::{
	BalanceChange, BuildMode, Direction, EncodedOperation, Progress, ProgressSink, ProgressStage,
	RegistryFingerprint, SequenceItem, SequentialSimulationRequest, SequentialSimulationResult,
	SimulationRequest, SimulationResult, StorageDiff, filter_ws_endpoints,
};
