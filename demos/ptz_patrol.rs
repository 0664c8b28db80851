use reolink_rs::{Ptz, PtzDirection, ReolinkClient};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        println!("Usage: {} <Host> <Username> <Password>", args[0]);
        return Ok(());
    }

    let client = ReolinkClient::new(&args[1], &args[2], &args[3]).with_insecure();

    println!("Performing PTZ operations...");

    println!("Panning left...");
    client.ptz_move(0, PtzDirection::Left, 16).await?;
    tokio::time::sleep(Duration::from_millis(800)).await;
    client.ptz_stop(0).await?;

    println!("Panning right...");
    client.ptz_move(0, PtzDirection::Right, 16).await?;
    tokio::time::sleep(Duration::from_millis(800)).await;
    client.ptz_stop(0).await?;

    println!("Stored presets:");
    for preset in client.get_ptz_presets(0).await? {
        println!("  [{}] {} (enabled: {})", preset.id, preset.name, preset.enabled);
    }

    println!("Patrol routes:");
    for patrol in client.get_ptz_patrols(0).await? {
        println!("  [{}] {} with {} steps", patrol.id, patrol.name, patrol.steps.len());
    }

    println!("Guard position:");
    let guard = client.get_ptz_guard(0).await?;
    println!("  enabled: {}, timeout: {}s", guard.enabled, guard.timeout_seconds);

    client.close().await;
    println!("Done.");

    Ok(())
}
