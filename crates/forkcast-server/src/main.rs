// SPDX-License-Identifier: GPL-3.0

//! HTTP execution service for forkcast simulations.
//!
//! Hosts the heavy half of the client/server split: thin callers probe
//! `GET /health` and delegate `POST /simulate` / `POST /simulate-sequential`
//! here instead of hosting a fork themselves.

use clap::Parser;
use forkcast::{
	AnchorPolicy, LocalBackend, RpcForkEngine, Simulator, SimulatorConfig, router,
};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use url::Url;

#[derive(Parser)]
#[command(name = "forkcast-server", about = "Execution service for extrinsic simulations", version)]
struct Args {
	/// Address to listen on.
	#[arg(long, default_value = "127.0.0.1:8547")]
	listen: SocketAddr,

	/// WebSocket URL of the fork service hosting runtime execution.
	#[arg(long)]
	engine_url: Url,

	/// Directory for the durable block/storage cache. Omit to keep all
	/// cache state in memory.
	#[arg(long)]
	cache_dir: Option<PathBuf>,

	/// Refuse simulations whose anchor block is pruned instead of falling
	/// back to the latest block.
	#[arg(long)]
	fail_closed_anchors: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::init();
	let args = Args::parse();

	let config = SimulatorConfig {
		anchor_policy: if args.fail_closed_anchors {
			AnchorPolicy::FailClosed
		} else {
			AnchorPolicy::FallBackToLatest
		},
		cache_dir: args.cache_dir,
		..Default::default()
	};

	let engine = Arc::new(RpcForkEngine::new(args.engine_url.clone()));
	let simulator = Simulator::with_config(engine, config);
	let backend = Arc::new(LocalBackend::new(simulator));
	let app = router(backend);

	let listener = tokio::net::TcpListener::bind(args.listen).await?;
	log::info!("Listening on {} (fork engine at {})", args.listen, args.engine_url);

	axum::serve(listener, app)
		.with_graceful_shutdown(async {
			let _ = tokio::signal::ctrl_c().await;
			log::info!("Shutting down");
		})
		.await?;

	Ok(())
}
