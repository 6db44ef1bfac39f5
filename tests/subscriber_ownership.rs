// SPDX-License-Identifier: MIT
//! Runs in its own test binary: the global dispatcher can be set only once per process.
use service_tooling::telemetry::init;

#[tokio::test]
async fn disabled_logging_leaves_global_subscriber_to_host() {
    let telemetry = init("subscriber-test", "test", []).await.expect("init");

    let installed = tracing_subscriber::fmt().try_init();
    assert!(installed.is_ok(), "{installed:?}");
    telemetry.shutdown();
}
