//! Demo: Live depth ladder
//!
//! Showcases: cumulative depth bars, resync status, recent trades tape,
//! caller-driven restart with exponential backoff after a transport failure
//!
//! Run: cargo run --bin depth_ladder -- [SYMBOL]

use binance_sdk::prelude::*;
use colored::*;
use rust_decimal::prelude::ToPrimitive;
use std::time::Duration;

const ROWS: usize = 15;
const BAR_WIDTH: usize = 24;
const TRADES: usize = 8;

fn bar_len(fraction: Decimal) -> usize {
    (fraction * Decimal::from(BAR_WIDTH))
        .round()
        .to_usize()
        .unwrap_or(0)
        .min(BAR_WIDTH)
}

fn draw_ladder(view: &BookView) {
    println!(
        "  {:>12} {:>12} {:^w$} {:^w$} {:<12} {:<12}",
        "BID QTY".white().bold(),
        "BID".white().bold(),
        "",
        "",
        "ASK".white().bold(),
        "ASK QTY".white().bold(),
        w = BAR_WIDTH
    );
    println!("  {}", "─".repeat(26 * 2 + BAR_WIDTH * 2 + 2));

    for row in view.rows.iter() {
        let (bid_qty, bid_price) = match &row.bid {
            Some(level) => (format!("{:.5}", level.quantity), format!("{:.2}", level.price)),
            None => (String::new(), String::new()),
        };
        let (ask_price, ask_qty) = match &row.ask {
            Some(level) => (format!("{:.2}", level.price), format!("{:.5}", level.quantity)),
            None => (String::new(), String::new()),
        };

        let bid_bar = bar_len(row.bid_cumulative_fraction);
        let ask_bar = bar_len(row.ask_cumulative_fraction);

        println!(
            "  {:>12} {:>12} {}{} {}{} {:<12} {:<12}",
            bid_qty,
            bid_price.green(),
            " ".repeat(BAR_WIDTH - bid_bar),
            "█".repeat(bid_bar).green(),
            "█".repeat(ask_bar).red(),
            " ".repeat(BAR_WIDTH - ask_bar),
            ask_price.red(),
            ask_qty
        );
    }

    println!();
    if let (Some(mid), Some(spread)) = (view.mid_price(), view.spread()) {
        println!(
            "  {} {:.2}  {} {:.2}  {} {}",
            "Mid:".white(),
            mid,
            "Spread:".yellow(),
            spread,
            "Update id:".dimmed(),
            view.last_update_id().unwrap_or_default()
        );
    }
}

fn draw_trades(view: &TradeView) {
    println!();
    println!("  {}  {}", "RECENT TRADES".white().bold(), view.status.to_string().dimmed());
    for trade in view.trades.iter() {
        let price = format!("{:>12.2}", trade.price);
        let price = match trade.side() {
            TradeSide::Buy => price.green(),
            TradeSide::Sell => price.red(),
        };
        println!(
            "  {} {:>12.5}  {}",
            price,
            trade.quantity,
            trade
                .trade_time
                .with_timezone(&chrono::Local)
                .format("%H:%M:%S%.3f")
                .to_string()
                .dimmed()
        );
    }
}

fn draw_status(status: &BookStatus) -> ColoredString {
    match status {
        BookStatus::Live => status.to_string().green(),
        BookStatus::Resyncing | BookStatus::Loading { .. } => status.to_string().yellow(),
        BookStatus::Error(_) => status.to_string().red(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let symbol = std::env::args()
        .nth(1)
        .unwrap_or_else(|| Symbol::BTC_USDT.to_string())
        .to_uppercase();

    let client = DepthClient::builder([symbol.clone()])
        .with_rows(ROWS)
        .with_snapshot_limit(100)
        .with_recent_trades(TRADES)
        .connect()
        .await?;

    let backoff = ReconnectConfig::new()
        .with_initial_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(30))
        .with_max_attempts(10);
    let mut attempt = 0;

    loop {
        tokio::time::sleep(Duration::from_millis(500)).await;

        let view = match client.view(&symbol) {
            Some(view) => view,
            None => break,
        };

        // Clear screen
        print!("\x1B[2J\x1B[H");
        println!("{}", "═".repeat(80).cyan());
        println!(
            "{}  {}  {}",
            format!("  {} DEPTH LADDER", view.symbol).cyan().bold(),
            draw_status(&view.status),
            chrono::Local::now().format("%H:%M:%S").to_string().dimmed()
        );
        println!("{}", "═".repeat(80).cyan());
        println!();

        if view.snapshot.is_some() {
            draw_ladder(&view);
        }
        if let Some(trades) = client.trade_view(&symbol) {
            draw_trades(&trades);
        }

        match view.status {
            BookStatus::Live => attempt = 0,
            BookStatus::Error(_) => {
                attempt += 1;
                let Some(delay) = backoff.next_delay(attempt) else {
                    println!("\n  {} giving up after {} restarts", "✗".red(), attempt - 1);
                    break;
                };
                println!("\n  Restarting in {:?} (attempt {})", delay, attempt);
                tokio::time::sleep(delay).await;
                client.refresh(&symbol).await?;
            }
            _ => {}
        }
    }

    client.shutdown();
    Ok(())
}
