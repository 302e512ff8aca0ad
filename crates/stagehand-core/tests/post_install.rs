//! Tests for the primary-side enrollment of secondaries and agents.

mod support;

use serde_json::json;
use stagehand_core::classifier::Group;
use stagehand_core::install::{InstallState, Provisioner};
use stagehand_core::types::Role;
use stagehand_core::{Error, ErrorCategory};
use support::{
    CountingSleeper, FakeCa, FakeClassifier, RecordingBridge, RecordingRunner, test_config,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const AGENT_RUN: &str = "puppet agent -t";

#[test]
fn first_enrollment_signs_pins_and_configures_pool() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let runner = RecordingRunner::default();
    let bridge = RecordingBridge::default();
    let ca = FakeCa::pending_after("compile1.vm", 1);
    let sleeper = CountingSleeper::default();
    let api = FakeClassifier::standard();

    let report = Provisioner::new(
        &config,
        "master.vm",
        &runner,
        &bridge,
        &ca,
        &sleeper,
        CancellationToken::new(),
    )
    .with_classifier(&api)
    .post_install(Role::Secondary, "compile1.vm")
    .unwrap();

    assert_eq!(
        *ca.sign_calls.borrow(),
        vec![("compile1.vm".to_string(), true)]
    );
    assert_eq!(sleeper.sleeps.borrow().len(), 1);

    let primary = api.group_named("Primary Group").unwrap();
    assert!(primary.is_pinned("compile1.vm"));

    let infra = api.group_named("Secondary Agent Group").unwrap();
    assert_eq!(infra.parent, "root");
    assert!(infra.is_pinned("master.vm"));
    assert!(infra.is_pinned("compile1.vm"));
    assert_eq!(
        infra.class_param("puppet_enterprise::profile::agent", "server_list"),
        Some(&json!(["master.vm:8140"]))
    );

    let agents = api.group_named("Agent Group").unwrap();
    assert_eq!(
        agents.class_param("puppet_enterprise::profile::agent", "server_list"),
        Some(&json!(["compile.vm:8140"]))
    );
    assert_eq!(
        agents.class_param("puppet_enterprise::profile::agent", "pcp_broker_list"),
        Some(&json!(["compile.vm:8142"]))
    );

    assert_eq!(runner.count(AGENT_RUN), 1);
    assert!(bridge.calls.borrow().is_empty());
    assert_eq!(
        report.states(),
        vec![
            InstallState::AwaitingSigning,
            InstallState::Signed,
            InstallState::PinnedToPrimaryGroup,
            InstallState::PoolAddressConfigured,
            InstallState::Ready,
        ]
    );
}

#[test]
fn signing_waits_for_the_subject_behind_a_stale_request() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let runner = RecordingRunner::default();
    let bridge = RecordingBridge::default();
    let ca = FakeCa::pending_after("agent1.vm", 1).with_stale("stale.vm");
    let sleeper = CountingSleeper::default();

    Provisioner::new(
        &config,
        "master.vm",
        &runner,
        &bridge,
        &ca,
        &sleeper,
        CancellationToken::new(),
    )
    .post_install(Role::Agent, "agent1.vm")
    .unwrap();

    assert_eq!(ca.pending_calls.get(), 2);
    assert_eq!(sleeper.sleeps.borrow().len(), 1);
    assert_eq!(
        *ca.sign_calls.borrow(),
        vec![("agent1.vm".to_string(), false)]
    );
}

#[test]
fn rerun_issues_no_writes_and_skips_reconvergence() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let runner = RecordingRunner::default();
    let bridge = RecordingBridge::default();
    let ca = FakeCa::pending_after("compile1.vm", 0);
    let sleeper = CountingSleeper::default();
    let api = FakeClassifier::standard();

    let provisioner = Provisioner::new(
        &config,
        "master.vm",
        &runner,
        &bridge,
        &ca,
        &sleeper,
        CancellationToken::new(),
    )
    .with_classifier(&api);

    provisioner
        .post_install(Role::Secondary, "compile1.vm")
        .unwrap();
    let posts_after_first = api.posts.get();
    let pending_after_first = ca.pending_calls.get();
    assert!(posts_after_first > 0);

    let report = provisioner
        .post_install(Role::Secondary, "compile1.vm")
        .unwrap();

    assert_eq!(api.posts.get(), posts_after_first);
    assert_eq!(ca.pending_calls.get(), pending_after_first);
    assert_eq!(ca.sign_calls.borrow().len(), 1);
    assert_eq!(runner.count(AGENT_RUN), 1);
    assert_eq!(report.steps[0].detail, "already signed");
}

#[test]
fn existing_consistent_settings_are_not_rewritten() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let runner = RecordingRunner::default();
    let bridge = RecordingBridge::default();
    let ca = FakeCa::default();
    ca.signed.borrow_mut().insert("compile2.vm".to_string());
    let sleeper = CountingSleeper::default();

    // Another secondary already configured the pool.
    let api = FakeClassifier::standard();
    let other = Provisioner::new(
        &config,
        "master.vm",
        &runner,
        &bridge,
        &ca,
        &sleeper,
        CancellationToken::new(),
    )
    .with_classifier(&api);
    ca.signed.borrow_mut().insert("compile1.vm".to_string());
    other.post_install(Role::Secondary, "compile1.vm").unwrap();
    let before = api.posts.get();

    other.post_install(Role::Secondary, "compile2.vm").unwrap();

    // one pin into each group, no class updates, no group creation
    assert_eq!(api.posts.get(), before + 2);
}

#[test]
fn duplicate_group_names_are_a_consistency_error() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let runner = RecordingRunner::default();
    let bridge = RecordingBridge::default();
    let ca = FakeCa::pending_after("compile1.vm", 0);
    let sleeper = CountingSleeper::default();
    let api = FakeClassifier::standard();
    api.push(Group {
        id: "primary-copy".to_string(),
        name: "Primary Group".to_string(),
        environment: "production".to_string(),
        parent: "root".to_string(),
        rule: None,
        classes: Default::default(),
    });

    let err = Provisioner::new(
        &config,
        "master.vm",
        &runner,
        &bridge,
        &ca,
        &sleeper,
        CancellationToken::new(),
    )
    .with_classifier(&api)
    .post_install(Role::Secondary, "compile1.vm")
    .unwrap_err();

    assert!(matches!(err, Error::AmbiguousGroup { count: 2, .. }));
    assert_eq!(err.category(), ErrorCategory::Consistency);
    assert_eq!(api.posts.get(), 0);
}

#[test]
fn missing_primary_group_is_reported() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let runner = RecordingRunner::default();
    let bridge = RecordingBridge::default();
    let ca = FakeCa::pending_after("compile1.vm", 0);
    let sleeper = CountingSleeper::default();
    let api = FakeClassifier::default();

    let err = Provisioner::new(
        &config,
        "master.vm",
        &runner,
        &bridge,
        &ca,
        &sleeper,
        CancellationToken::new(),
    )
    .with_classifier(&api)
    .post_install(Role::Secondary, "compile1.vm")
    .unwrap_err();

    assert!(matches!(err, Error::GroupNotFound { .. }));
}

#[test]
fn agent_post_install_only_signs() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let runner = RecordingRunner::default();
    let bridge = RecordingBridge::default();
    let ca = FakeCa::pending_after("agent1.vm", 0);
    let sleeper = CountingSleeper::default();

    let report = Provisioner::new(
        &config,
        "master.vm",
        &runner,
        &bridge,
        &ca,
        &sleeper,
        CancellationToken::new(),
    )
    .post_install(Role::Agent, "agent1.vm")
    .unwrap();

    assert_eq!(
        *ca.sign_calls.borrow(),
        vec![("agent1.vm".to_string(), false)]
    );
    assert!(runner.commands.borrow().is_empty());
    assert!(report.reached(InstallState::Ready));
}

#[test]
fn post_install_off_primary_is_a_usage_error() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let runner = RecordingRunner::default();
    let bridge = RecordingBridge::default();
    let ca = FakeCa::pending_after("compile1.vm", 0);
    let sleeper = CountingSleeper::default();

    let err = Provisioner::new(
        &config,
        "compile1.vm",
        &runner,
        &bridge,
        &ca,
        &sleeper,
        CancellationToken::new(),
    )
    .post_install(Role::Secondary, "compile1.vm")
    .unwrap_err();

    assert!(matches!(err, Error::NotOnPrimary { .. }));
    assert_eq!(err.category().exit_code(), 1);
    assert_eq!(ca.pending_calls.get(), 0);
}

#[test]
fn no_enrollment_request_is_fatal() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let runner = RecordingRunner::default();
    let bridge = RecordingBridge::default();
    let ca = FakeCa::never_pending();
    let sleeper = CountingSleeper::default();
    let api = FakeClassifier::standard();

    let err = Provisioner::new(
        &config,
        "master.vm",
        &runner,
        &bridge,
        &ca,
        &sleeper,
        CancellationToken::new(),
    )
    .with_classifier(&api)
    .post_install(Role::Secondary, "compile1.vm")
    .unwrap_err();

    assert!(matches!(err, Error::NoEnrollmentRequest { attempts: 3 }));
    assert_eq!(err.category(), ErrorCategory::External);
    assert!(ca.sign_calls.borrow().is_empty());
    assert_eq!(api.posts.get(), 0);
}
