use reolink_rs::{Alarm, ReolinkClient, System};
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
        println!("Example: cargo run --example device_info -- 192.168.1.10 admin pass123");
        return Ok(());
    }

    let host = &args[1];
    let user = &args[2];
    let pass = &args[3];

    // Most of these devices ship self-signed certificates.
    let client = ReolinkClient::new(host, user, pass).with_insecure();

    println!("--- Device Info ---");
    match client.get_device_info().await {
        Ok(info) => println!("{:#?}", info),
        Err(e) => eprintln!("Error getting device info: {}", e),
    }

    println!("\n--- Device Time ---");
    match client.get_time().await {
        Ok(time) => println!("Current device time: {}", time),
        Err(e) => eprintln!("Error getting device time: {}", e),
    }

    println!("\n--- Abilities ---");
    for feature in ["email", "ftp", "push", "talk"] {
        match client.supports(feature).await {
            Ok(supported) => println!("{feature}: {supported}"),
            Err(e) => eprintln!("Error querying ability {feature}: {}", e),
        }
    }

    println!("\n--- Motion ---");
    match client.get_motion_state(0).await {
        Ok(state) => println!("Motion detected: {}", state),
        Err(e) => eprintln!("Error getting motion state: {}", e),
    }

    client.close().await;
    println!("\nSession closed.");

    Ok(())
}
