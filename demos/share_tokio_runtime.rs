use reschedule_timer::prelude::*;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

// cargo run --package reschedule_timer --example share_tokio_runtime

#[tokio::main]
async fn main() -> AnyResult<()> {
    // Spans of the run loop and its alarms are printed along with the log lines.
    FmtSubscriber::builder().with_max_level(Level::DEBUG).init();

    let timer = RescheduleTimerBuilder::default()
        .tokio_runtime_by_current()
        .set_tolerance(Duration::from_millis(200))
        .set_outcome_handler(create_log_outcome_handler("share_tokio_runtime"))
        .build_async_routine(|| async {
            println!("lease expired, releasing it.");
            sleep_by_tokio(Duration::from_millis(100)).await;
            Ok(())
        })?;

    // Heartbeats keep extending the lease.
    let heartbeat = timer.clone();
    tokio::spawn(async move {
        for _ in 0..3 {
            heartbeat.add(Duration::from_secs(1));
            sleep_by_tokio(Duration::from_millis(500)).await;
        }
    });

    let termination = timer.run().await?;
    println!("{:?}, deadline was {:?}", termination, timer.get_time());
    Ok(())
}
