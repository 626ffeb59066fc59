use reschedule_timer::prelude::*;
use std::thread::{park_timeout, sleep};
use std::time::{Duration, Instant};

// cargo run --package reschedule_timer --example debounce --features=full

fn main() -> AnyResult<()> {
    let beginning = Instant::now();

    #[allow(unused_mut)]
    let mut timer = RescheduleTimerBuilder::default()
        .set_tolerance(Duration::from_millis(250))
        .set_outcome_handler(move |outcome: AnyResult<()>| {
            println!("saved after {:?}: {:?}", beginning.elapsed(), outcome);
        })
        .spawn_routine(|| {
            println!("flushing the document to disk.");
            Ok(())
        })?;

    #[cfg(feature = "status-report")]
    let status_reporter = timer
        .take_status_reporter()
        .ok_or_else(|| anyhow!("Without `status_reporter`."))?;

    // Every keystroke pushes the save one second back.
    for key in "hello".chars() {
        println!("typed {:?}", key);
        timer.after(Duration::from_secs(1));
        sleep(Duration::from_millis(300));
    }

    park_timeout(Duration::from_secs(2));
    println!("done: {}", timer.is_done());

    #[cfg(feature = "status-report")]
    while let Ok(event) = status_reporter.get_public_event() {
        println!("{:?}", event);
    }

    Ok(())
}
