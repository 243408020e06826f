//! Integration coverage spanning the config loader, the data model, and the
//! classifier together — the pieces that don't need network access to
//! exercise meaningfully.

use gnm_collector::classifier::StreakTable;
use gnm_collector::config::Snapshot;
use gnm_collector::records::{CheckResult, CheckType};

fn write_minimal_snapshot(dir: &std::path::Path) {
    std::fs::write(
        dir.join("config.toml"),
        r#"
            [region]
            fallback_region = "eu-west"

            [db]
            host = "localhost"
            user = "gnm"
            password = "secret"
            database = "gnm"
            pool_mincached = 1
            pool_maxcached = 4
            pool_maxconnections = 10

            [collector]
            interval_sec = 30
            max_workers = 4

            [collector.timeouts]
            ping_timeout_sec = 2
            http_timeout_sec = 5
            dns_timeout_sec = 3
            tcp_timeout_sec = 3
            json_timeout_sec = 5

            [collector.thresholds]
            ping_warn_ms = 100
            ping_very_slow_ms = 500
            http_warn_ms = 300
            http_very_slow_ms = 1500
            dns_warn_ms = 200
            tcp_warn_ms = 200
            tcp_very_slow_ms = 1000
            json_warn_ms = 300
            json_very_slow_ms = 1500
        "#,
    )
    .unwrap();

    std::fs::write(
        dir.join("hosts.toml"),
        r#"
            [[host]]
            host_id = "web1"
            address = "example.com"
        "#,
    )
    .unwrap();

    std::fs::write(
        dir.join("services.toml"),
        r#"
            [[service]]
            service_id = "web1-http"
            host_id = "web1"
            type = "http"
            params = { url = "https://example.com/health" }

            [[service]]
            service_id = "web1-ping"
            host_id = "web1"
            type = "ping"
        "#,
    )
    .unwrap();
}

#[test]
fn a_full_snapshot_loads_and_every_service_parses_its_params() {
    let dir = tempfile::tempdir().unwrap();
    write_minimal_snapshot(dir.path());

    let snapshot = Snapshot::load(dir.path()).expect("the fixture is valid");
    assert_eq!(snapshot.services.len(), 2);

    for service in &snapshot.services {
        service.parsed_params().expect("every declared service should parse");
        assert!(snapshot.host_for(service.host_id.as_deref().unwrap()).is_some());
    }
}

#[test]
fn two_consecutive_ping_failures_escalate_to_crit_and_log_transitions() {
    let dir = tempfile::tempdir().unwrap();
    write_minimal_snapshot(dir.path());
    let snapshot = Snapshot::load(dir.path()).unwrap();

    let ping_service = snapshot
        .services
        .iter()
        .find(|s| s.check_type == CheckType::Ping)
        .unwrap();

    let mut streaks = StreakTable::new();
    let first = streaks.classify(&ping_service.service_id, &CheckResult::hard_failure());
    let second = streaks.classify(&ping_service.service_id, &CheckResult::hard_failure());
    let recovered = streaks.classify(&ping_service.service_id, &CheckResult::ok(12));

    assert_eq!(first.as_i16(), 1);
    assert_eq!(second.as_i16(), 2);
    assert_eq!(recovered.as_i16(), 0);
    assert_eq!(streaks.get(&ping_service.service_id), 0);
}
