use reschedule_timer::prelude::*;

use std::sync::atomic::Ordering::{Acquire, Release};
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::Arc;
use std::thread::park_timeout;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use rand::Rng;

struct DumbUtilities {
    // Flipped by the handler when it sees the dumb error.
    is_dumb_err_handled: Arc<AtomicBool>,
    // How many times the handler was invoked at all.
    handled_count: Arc<AtomicUsize>,
}

impl DumbUtilities {
    fn body() -> impl FnOnce() -> AnyResult<()> + Send + 'static {
        || Err(anyhow!("dumb error"))
    }

    fn handler(&self) -> impl Fn(AnyResult<()>) + Send + Sync + 'static {
        let is_dumb_err_handled = self.is_dumb_err_handled.clone();
        let handled_count = self.handled_count.clone();

        move |outcome: AnyResult<()>| {
            handled_count.fetch_add(1, Release);
            if let Err(e) = outcome {
                if e.to_string() == "dumb error" {
                    is_dumb_err_handled.store(true, Release);
                }
            }
        }
    }

    fn has_run(&self) -> bool {
        self.is_dumb_err_handled.load(Acquire)
    }

    fn handled_count(&self) -> usize {
        self.handled_count.load(Acquire)
    }
}

fn create_dumb_utilities() -> DumbUtilities {
    let _ = env_logger::builder().is_test(true).try_init();

    DumbUtilities {
        is_dumb_err_handled: Arc::new(AtomicBool::new(false)),
        handled_count: Arc::new(AtomicUsize::new(0)),
    }
}

// park_timeout may wake spuriously, So have to do it separately.
fn park_for(timeout: Duration) {
    let beginning_park = Instant::now();
    let mut timeout_remaining = timeout;
    loop {
        park_timeout(timeout_remaining);
        let elapsed = beginning_park.elapsed();
        if elapsed >= timeout {
            break;
        }
        timeout_remaining = timeout - elapsed;
    }
}

#[test]
fn test_new_timer_without_handler() {
    let dumb = create_dumb_utilities();
    let handler = dumb.handler();

    let timer = RescheduleTimer::new(move || {
        handler(DumbUtilities::body()());
        Ok(())
    });
    timer.after(Duration::from_secs(1));

    park_for(Duration::from_millis(2500));
    assert!(dumb.has_run());
    assert!(timer.is_done());
}

#[test]
fn test_new_timer_with_handler() {
    let dumb = create_dumb_utilities();

    let timer = RescheduleTimer::with_handler(DumbUtilities::body(), dumb.handler());
    timer.after(Duration::from_secs(1));

    park_for(Duration::from_millis(2500));
    assert!(dumb.has_run());
    assert_eq!(dumb.handled_count(), 1);
}

#[test]
fn test_custom_tolerance() -> AnyResult<()> {
    let dumb = create_dumb_utilities();

    let timer = RescheduleTimerBuilder::default()
        .set_tolerance(Duration::from_secs(8))
        .set_outcome_handler(dumb.handler())
        .build_routine(DumbUtilities::body())?;
    timer.start()?;

    timer.after(Duration::from_secs(6));
    // Within 8 seconds of the armed deadline, the alarm stays at 6 seconds.
    timer.after(Duration::from_secs(1));

    park_for(Duration::from_secs(2));
    assert!(!dumb.has_run(), "ran tho shouldn't");

    park_for(Duration::from_secs(5));
    assert!(dumb.has_run() && timer.is_done(), "didn't run at all");
    Ok(())
}

#[test]
fn test_after_pushes_the_deadline_back() {
    let dumb = create_dumb_utilities();

    let timer = RescheduleTimer::with_handler(DumbUtilities::body(), dumb.handler());
    timer.after(Duration::from_secs(5));

    park_for(Duration::from_secs(3));
    assert!(!dumb.has_run() && !timer.is_done());

    // About 5 seconds out again, far beyond the tolerance of the armed deadline.
    timer.after(Duration::from_secs(5));

    park_for(Duration::from_secs(4));
    assert!(!dumb.has_run() && !timer.is_done());

    park_for(Duration::from_secs(2));
    assert!(dumb.has_run() && timer.is_done());
    assert_eq!(dumb.handled_count(), 1);
}

#[test]
fn test_past_deadline_runs_immediately() {
    let dumb = create_dumb_utilities();

    let timer = RescheduleTimer::with_handler(DumbUtilities::body(), dumb.handler());
    timer.until(Instant::now() - Duration::from_secs(5));

    park_for(Duration::from_secs(1));
    assert!(dumb.has_run());
    assert!(timer.is_done());
    assert_eq!(timer.get_time(), None);
}

#[test]
fn test_until_pushes_the_deadline_back() {
    let dumb = create_dumb_utilities();

    let timer = RescheduleTimer::with_handler(DumbUtilities::body(), dumb.handler());
    timer.until(Instant::now() + Duration::from_secs(5));

    park_for(Duration::from_secs(3));
    assert!(!dumb.has_run() && !timer.is_done());

    timer.until(Instant::now() + Duration::from_secs(5));
    park_for(Duration::from_secs(4));
    assert!(!dumb.has_run() && !timer.is_done());

    park_for(Duration::from_secs(3));
    assert!(dumb.has_run() && timer.is_done());
}

#[test]
fn test_add_burst_fires_near_the_cumulative_deadline() {
    let dumb = create_dumb_utilities();

    let timer = RescheduleTimer::with_handler(DumbUtilities::body(), dumb.handler());
    let beginning = Instant::now();
    for _ in 0..20 {
        timer.add(Duration::from_millis(500));
    }

    let deadline = timer.get_time().unwrap();
    assert!(deadline >= beginning + Duration::from_secs(10));

    park_for(Duration::from_secs(3));
    assert!(!dumb.has_run() && !timer.is_done(), "did run, tho hadn't");

    park_for(Duration::from_secs(8));
    assert!(dumb.has_run() && timer.is_done(), "didn't run at all");
    assert_eq!(dumb.handled_count(), 1);
}

#[test]
fn test_do_immediately() {
    let dumb = create_dumb_utilities();

    let timer = RescheduleTimer::with_handler(DumbUtilities::body(), dumb.handler());
    timer.after(Duration::from_secs(5)).do_immediately();

    park_for(Duration::from_secs(1));
    assert!(dumb.has_run() && timer.is_done());
    assert_eq!(timer.get_state(), state::timer::COMPLETED);
}

#[test]
fn test_cancel_then_reschedule() {
    let dumb = create_dumb_utilities();

    let timer = RescheduleTimer::with_handler(DumbUtilities::body(), dumb.handler());
    timer.after(Duration::from_secs(2));
    timer.cancel();

    park_for(Duration::from_secs(3));
    assert!(!dumb.has_run());
    assert!(!timer.is_done());
    assert_eq!(dumb.handled_count(), 0);
    assert_eq!(timer.get_state(), state::timer::CANCELLED);

    // Cancellation stops the run loop, not the timer.
    timer.after(Duration::from_secs(1));
    assert_eq!(timer.get_state(), state::timer::RUNNING);

    park_for(Duration::from_secs(2));
    assert!(dumb.has_run() && timer.is_done());
    assert_eq!(dumb.handled_count(), 1);
}

#[test]
fn test_trigger_right_after_cancel_still_fires() {
    let dumb = create_dumb_utilities();

    let timers: Vec<RescheduleTimer> = (0..20)
        .map(|i| {
            let timer = RescheduleTimer::with_handler(DumbUtilities::body(), dumb.handler());
            timer.after(Duration::from_secs(5));
            timer.cancel();
            if i % 2 == 0 {
                timer.do_immediately();
            } else {
                timer.until(Instant::now());
            }
            timer
        })
        .collect();

    park_for(Duration::from_secs(1));
    assert_eq!(timers.iter().filter(|timer| timer.is_done()).count(), 20);
    assert_eq!(dumb.handled_count(), 20);
}

#[test]
fn test_concurrent_adds_all_count() {
    let timer = RescheduleTimer::new(|| Ok(()));
    timer.after(Duration::from_secs(100));
    let first = timer.get_time().unwrap();

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let timer = timer.clone();
            std::thread::spawn(move || {
                for _ in 0..5000 {
                    timer.add(Duration::from_millis(1));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(timer.get_time(), Some(first + Duration::from_secs(40)));
    timer.cancel();
}

#[test]
fn test_signals_after_completion_never_block() {
    let dumb = create_dumb_utilities();

    let timer = RescheduleTimer::with_handler(DumbUtilities::body(), dumb.handler());
    timer.do_immediately();
    park_for(Duration::from_millis(500));
    assert!(timer.is_done());

    for _ in 0..10 {
        timer.do_immediately();
        timer.cancel();
        timer.after(Duration::from_millis(10));
    }

    park_for(Duration::from_millis(500));
    assert_eq!(dumb.handled_count(), 1);
    assert!(matches!(timer.start(), Err(TimerError::AlreadyFired)));
}

#[test]
fn test_concurrent_reschedules_fire_once() {
    let dumb = create_dumb_utilities();

    let timer = RescheduleTimerBuilder::default()
        .set_tolerance(Duration::from_millis(200))
        .set_outcome_handler(dumb.handler())
        .spawn_routine(DumbUtilities::body())
        .unwrap();

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let timer = timer.clone();
            std::thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..50 {
                    timer.after(Duration::from_millis(rng.gen_range(300..600)));
                    if rng.gen_bool(0.1) {
                        timer.add(Duration::from_millis(rng.gen_range(0..100)));
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    park_for(Duration::from_secs(2));
    assert!(timer.is_done());
    assert_eq!(dumb.handled_count(), 1);
}

#[test]
fn test_async_routine() -> AnyResult<()> {
    let runs = Arc::new(AtomicUsize::new(0));
    let runs_ref = runs.clone();

    let timer = RescheduleTimerBuilder::default()
        .set_outcome_handler(create_log_outcome_handler("test_async_routine"))
        .spawn_async_routine(reschedule_timer::create_async_fn_body!({
            smol::Timer::after(Duration::from_millis(100)).await;
            runs_ref.fetch_add(1, Release);
            Ok(())
        }))?;

    timer.after(Duration::from_millis(200));
    park_for(Duration::from_millis(100));
    assert_eq!(runs.load(Acquire), 0);

    park_for(Duration::from_millis(800));
    assert_eq!(runs.load(Acquire), 1);
    assert!(timer.is_done());
    Ok(())
}

#[test]
fn test_run_on_the_callers_task() -> AnyResult<()> {
    let dumb = create_dumb_utilities();
    let timer = RescheduleTimerBuilder::default()
        .set_tolerance(Duration::from_millis(50))
        .set_outcome_handler(dumb.handler())
        .build_routine(DumbUtilities::body())?;

    timer.after(Duration::from_millis(200));
    let canceler = timer.clone();
    smol::spawn(async move {
        smol::Timer::after(Duration::from_millis(50)).await;
        canceler.cancel();
    })
    .detach();
    let termination = smol::block_on(timer.run())?;

    assert_eq!(termination, Termination::Canceled);
    assert!(!dumb.has_run());

    // A canceled manual timer may be driven again.
    timer.after(Duration::from_millis(200));
    assert_eq!(smol::block_on(timer.run())?, Termination::Fired);
    assert!(dumb.has_run());
    Ok(())
}

#[cfg(feature = "status-report")]
#[test]
fn test_burst_arms_fewer_alarms_than_calls() -> AnyResult<()> {
    let mut timer = RescheduleTimerBuilder::default()
        .enable_status_report()
        .spawn_routine(|| Ok(()))?;
    let status_reporter = timer
        .take_status_reporter()
        .ok_or_else(|| anyhow!("Without `status_reporter`."))?;

    for _ in 0..20 {
        timer.add(Duration::from_millis(500));
    }
    timer.cancel();
    park_for(Duration::from_millis(200));

    let mut rescheduled = 0;
    while let Ok(event) = status_reporter.get_public_event() {
        if let PublicEvent::Rescheduled(..) = event {
            rescheduled += 1;
        }
    }

    assert!(rescheduled > 0 && rescheduled < 20, "{} alarms armed", rescheduled);
    Ok(())
}
