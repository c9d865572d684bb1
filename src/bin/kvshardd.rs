// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use kvshard::config::Cli;
use kvshard::server::Server;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = Server::new(cli).run() {
        tracing::error!(error = %e, "fatal startup error");
        return Err(e);
    }
    Ok(())
}
