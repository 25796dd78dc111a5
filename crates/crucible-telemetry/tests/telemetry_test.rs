use crucible_telemetry::logging::{init_logging, init_logging_json};
use crucible_telemetry::metrics::{MetricsCollector, INTERP_EXECUTIONS_TOTAL};

#[test]
fn logging_init_is_idempotent() {
    init_logging("crucible-telemetry-test", "info");
    // A second call (and a format switch) must not panic.
    init_logging("crucible-telemetry-test", "debug");
    init_logging_json("crucible-telemetry-test", "info");
}

#[test]
fn collector_tracks_per_language_executions() {
    let collector = MetricsCollector::new();
    collector.increment_counter(INTERP_EXECUTIONS_TOTAL, &[("language", "python")]);
    collector.increment_counter(INTERP_EXECUTIONS_TOTAL, &[("language", "python")]);
    collector.increment_counter(INTERP_EXECUTIONS_TOTAL, &[("language", "javascript")]);

    assert_eq!(
        collector.get_counter(INTERP_EXECUTIONS_TOTAL, &[("language", "python")]),
        2
    );
    assert_eq!(
        collector.get_counter(INTERP_EXECUTIONS_TOTAL, &[("language", "javascript")]),
        1
    );

    let export = collector.export_prometheus();
    assert!(export.contains("interp_executions_total{language=\"python\"} 2"));
}

#[test]
fn counters_are_safe_across_threads() {
    use std::sync::Arc;

    let collector = Arc::new(MetricsCollector::new());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let c = Arc::clone(&collector);
        handles.push(std::thread::spawn(move || {
            for _ in 0..100 {
                c.increment_counter("thread_test_total", &[]);
            }
        }));
    }
    for h in handles {
        h.join().expect("worker thread panicked");
    }
    assert_eq!(collector.get_counter("thread_test_total", &[]), 800);
}
