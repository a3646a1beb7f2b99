use std::time::Duration;

use event_window_counter::{Clock, Config, Counter, ManualClock};

fn main() {
    const BUCKET: Duration = Duration::from_secs(1);
    const HISTORY: Duration = Duration::from_secs(16);

    // Typically you want `Counter::new(config)`, which reads the system clock.
    let clock = ManualClock::new(1_700_000_000_000);
    let mut counter = Counter::with_clock(Config::new(HISTORY, BUCKET), &clock).unwrap();

    counter.record();

    clock.advance(BUCKET); // Simulate a second passing
    counter.record();

    assert_eq!(counter.query(HISTORY).unwrap(), 2);

    clock.advance(HISTORY + BUCKET); // Move forward...
    counter.record();
    // The counter forgot about the events older than 16 seconds
    assert_eq!(counter.query(HISTORY).unwrap(), 1);

    println!("now: {}ms, {:?}", clock.now_millis(), counter);
}
