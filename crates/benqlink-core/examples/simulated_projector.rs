//! Simulated Projector Walkthrough
//!
//! Drives the protocol engine against the in-process projector simulator and
//! prints every confirmed state change.
//!
//! Usage:
//!   RUST_LOG=debug cargo run --example simulated_projector -- [OPTIONS]
//!
//! Options:
//!   --config FILE     Engine config JSON (default: built-in defaults)
//!   --drop RATE       Fraction of replies the simulator drops (default: 0.0)
//!   --seed N          Seed for drop decisions

use anyhow::{Context, Result};
use benqlink_core::prelude::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config = EngineConfig::default();
    let mut drop_rate = 0.0f64;
    let mut seed = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                let path = args.get(i).context("--config needs a path")?;
                config = EngineConfig::from_file(path)
                    .with_context(|| format!("loading {}", path))?;
            }
            "--drop" => {
                i += 1;
                drop_rate = args
                    .get(i)
                    .context("--drop needs a rate")?
                    .parse()
                    .context("--drop rate must be a number")?;
            }
            "--seed" => {
                i += 1;
                seed = Some(
                    args.get(i)
                        .context("--seed needs a value")?
                        .parse()
                        .context("--seed must be an integer")?,
                );
            }
            other => anyhow::bail!("unknown argument: {}", other),
        }
        i += 1;
    }

    let mut builder = SimulatedProjector::builder().drop_rate(drop_rate);
    if let Some(seed) = seed {
        builder = builder.seed(seed);
    }
    let projector = builder.build()?;

    let device = Arc::new(DeviceState::new());
    device.subscribe(|change| println!("  changed: {:?}", change));

    let engine = ProtocolEngine::new(projector, device.clone(), config)?;

    println!("Powering on...");
    engine.turn_power_on()?;
    engine.update_status()?;
    wait_idle(&engine).await;

    println!("Changing picture settings...");
    engine.set_aspect_ratio(AspectRatio::Auto)?;
    engine.set_current_source(SourceType::Hdmi2)?;
    engine.set_picture_mode(PictureMode::Cinema)?;
    wait_idle(&engine).await;

    println!("Powering off...");
    engine.turn_power_off()?;
    engine.query_aspect_ratio()?;
    wait_idle(&engine).await;

    println!(
        "Final state:\n{}",
        serde_json::to_string_pretty(&device.snapshot())?
    );
    Ok(())
}

async fn wait_idle(engine: &ProtocolEngine<SimulatedProjector>) {
    let mut idle = engine.subscribe_idle();
    if tokio::time::timeout(Duration::from_secs(10), idle.wait_for(|idle| *idle))
        .await
        .is_err()
    {
        eprintln!("Projector did not settle within 10s");
    }
}
