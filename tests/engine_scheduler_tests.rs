use adcbridge::engine::Pacer;
use std::time::Duration;
use tokio::time::Instant;

/// Drive the pacer against a zero-latency fetch
async fn run_ticks(pacer: &mut Pacer, ticks: usize) {
    let mut done = 0;
    while done < ticks {
        if pacer.until_next(Instant::now()).is_some() {
            pacer.wait().await;
            continue;
        }
        done += 1;
        pacer.advance(Instant::now());
    }
}

#[tokio::test(start_paused = true)]
async fn test_ten_ticks_at_five_hz() {
    let start = Instant::now();
    let mut pacer = Pacer::new(Duration::from_millis(200));

    run_ticks(&mut pacer, 10).await;

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(1800), "{:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(2200), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_no_drift_over_thousand_ticks() {
    let start = Instant::now();
    let mut pacer = Pacer::new(Duration::from_millis(200));

    run_ticks(&mut pacer, 1000).await;

    // Tick n is due at n * 200ms
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(199_800), "{:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(200_000), "{:?}", elapsed);
    assert_eq!(pacer.resyncs(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_fetches_stay_on_grid() {
    let start = Instant::now();
    let mut pacer = Pacer::new(Duration::from_millis(200));

    for _ in 0..10 {
        if let Some(wait) = pacer.until_next(Instant::now()) {
            tokio::time::sleep(wait).await;
        }
        // Fetch latency below the interval is absorbed
        tokio::time::sleep(Duration::from_millis(150)).await;
        pacer.advance(Instant::now());
    }

    assert_eq!(pacer.next_tick(), start + Duration::from_millis(2000));
    assert_eq!(pacer.resyncs(), 0);
}

#[test]
fn test_overrun_resyncs_instead_of_catching_up() {
    let start = Instant::now();
    let mut pacer = Pacer::starting_at(Duration::from_millis(200), start);

    // The fetch took 500ms
    let now = start + Duration::from_millis(500);
    pacer.advance(now);

    assert_eq!(pacer.next_tick(), now + Duration::from_millis(200));
    assert_eq!(pacer.resyncs(), 1);
    assert!(pacer.until_next(now).is_some());
}

#[test]
fn test_interval_change_applies_on_next_advance() {
    let start = Instant::now();
    let mut pacer = Pacer::starting_at(Duration::from_millis(200), start);

    pacer.set_interval(Duration::from_millis(50));
    pacer.advance(start);

    assert_eq!(pacer.interval(), Duration::from_millis(50));
    assert_eq!(pacer.next_tick(), start + Duration::from_millis(50));
}
