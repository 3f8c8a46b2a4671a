//! End-to-end runs of the agent fleet on the local machine.

use std::time::Duration;

use drover_agent::{Config, Fleet};
use drover_reconcile::ApplicationState;

fn config(pairs: &[(&str, &str)]) -> Config {
    let pairs: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(move |key| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fleet_launches_every_instance() {
    let fleet = Fleet::from_config(&config(&[
        ("DROVER_INSTANCES", "3"),
        ("DROVER_LAUNCH_COMMAND", "sleep 30"),
        ("DROVER_SCANNERS", "status,deploy"),
        ("DROVER_STATUS_INTERVAL_MS", "50"),
        ("DROVER_DEPLOY_INTERVAL_MS", "50"),
    ]));
    fleet.start();

    fleet
        .network()
        .await_any_of_states_timeout(
            &[ApplicationState::Launched, ApplicationState::Running],
            Duration::from_secs(10),
        )
        .await
        .unwrap();

    fleet
        .network()
        .await_any_of_states_timeout(&[ApplicationState::Running], Duration::from_secs(10))
        .await
        .unwrap();

    fleet.shutdown().await;
    for descriptor in fleet.network().descriptors() {
        assert_eq!(descriptor.local_process_running().await, None);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_kill_scanner_stops_running_instances() {
    let fleet = Fleet::from_config(&config(&[
        ("DROVER_INSTANCES", "2"),
        ("DROVER_LAUNCH_COMMAND", "sleep 30"),
        ("DROVER_SCANNERS", "status,kill"),
        ("DROVER_STATUS_INTERVAL_MS", "50"),
        ("DROVER_KILL_INTERVAL_MS", "50"),
    ]));

    assert!(fleet
        .network()
        .deploy_all()
        .await
        .iter()
        .all(|(_, result)| result.is_ok()));
    fleet.start();

    fleet
        .network()
        .await_any_of_states_timeout(&[ApplicationState::Killed], Duration::from_secs(10))
        .await
        .unwrap();

    fleet.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_stops_after_configured_time() {
    let config = config(&[
        ("DROVER_INSTANCES", "1"),
        ("DROVER_SCANNERS", "status"),
        ("DROVER_RUN_SECS", "1"),
    ]);

    tokio::time::timeout(Duration::from_secs(10), drover_agent::run(config))
        .await
        .unwrap()
        .unwrap();
}
