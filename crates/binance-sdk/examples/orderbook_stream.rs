//! Example: Stream order book updates for one symbol
//!
//! Run with: cargo run --example orderbook_stream

use binance_sdk::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("=== Binance Order Book Stream ===\n");

    let mut client = DepthClient::builder([Symbol::BTC_USDT])
        .with_rows(10)
        .with_update_speed(UpdateSpeed::Ms100)
        .connect()
        .await?;

    println!("Streaming order book for BTCUSDT (rows: 10)...\n");

    let mut events = client.events().expect("events() already called");
    let mut update_count = 0;
    let max_updates = 50;

    while let Some(event) = events.recv().await {
        match event {
            BookEvent::Status { symbol, status } => {
                println!("[{}] {}", symbol, status);
                if status.is_live() {
                    if let Some(snapshot) = client.snapshot(symbol.as_str()) {
                        print_snapshot(&snapshot);
                    }
                }
            }
            BookEvent::Updated { symbol, snapshot } => {
                update_count += 1;
                println!(
                    "[Update #{}/{}] {} | id {} | Mid: ${:.2} | Spread: ${:.4}",
                    update_count,
                    max_updates,
                    symbol,
                    snapshot.last_update_id(),
                    snapshot.mid_price().unwrap_or_default(),
                    snapshot.spread().unwrap_or_default()
                );

                if update_count >= max_updates {
                    println!("\nReached {} updates. Stopping.", max_updates);
                    break;
                }
            }
            BookEvent::Resync { symbol, reason } => {
                println!("WARNING: {} resyncing: {}", symbol, reason);
            }
            BookEvent::Failed { symbol, error } => {
                println!("{} failed: {}", symbol, error);
                break;
            }
        }
    }

    client.shutdown();
    println!("\nDone!");
    Ok(())
}

fn print_snapshot(snapshot: &Snapshot) {
    println!("  Top 5 Bids:");
    for (i, level) in snapshot.bids().iter().take(5).enumerate() {
        println!("    {}. ${:.2} x {:.8}", i + 1, level.price, level.quantity);
    }

    println!("  Top 5 Asks:");
    for (i, level) in snapshot.asks().iter().take(5).enumerate() {
        println!("    {}. ${:.2} x {:.8}", i + 1, level.price, level.quantity);
    }
    println!("  Last update id: {}", snapshot.last_update_id());
}
