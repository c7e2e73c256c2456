//! Minimal supervised loop with a final closer
//!
//! Run with: cargo run -p hearth_runner --example basic_runner
//! and stop it with Ctrl+C.

use hearth_runner::Runner;
use std::time::Duration;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let outcome = Runner::new()
        .with_named_process("flush_ticker", |ctx| async move {
            let mut ticks = 0u64;
            loop {
                tokio::select! {
                    _ = ctx.cancelled() => {
                        tracing::info!(ticks, "ticker stopping");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(500)) => {
                        ticks += 1;
                        tracing::info!(ticks, "flush tick");
                    }
                }
            }
            Ok(())
        })
        .with_closer(|| async move {
            tracing::info!("final flush");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(5))
        .run()
        .await;

    std::process::exit(outcome.exit_code());
}
