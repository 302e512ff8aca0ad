//! Tests for the pending-certificate poller.

mod support;

use std::time::Duration;

use stagehand_core::Error;
use stagehand_core::certs::{PollPolicy, await_pending_certificate, await_subject_certificate};
use support::{CountingSleeper, FakeCa};
use tokio_util::sync::CancellationToken;

fn policy() -> PollPolicy {
    PollPolicy {
        max_attempts: 3,
        interval: Duration::from_secs(5),
    }
}

#[test]
fn returns_subject_found_on_third_attempt_after_two_sleeps() {
    let ca = FakeCa::pending_after("compile1.vm", 2);
    let sleeper = CountingSleeper::default();

    let subject =
        await_pending_certificate(&ca, &policy(), &sleeper, &CancellationToken::new()).unwrap();

    assert_eq!(subject, "compile1.vm");
    assert_eq!(ca.pending_calls.get(), 3);
    assert_eq!(
        *sleeper.sleeps.borrow(),
        vec![Duration::from_secs(5), Duration::from_secs(5)]
    );
}

#[test]
fn immediate_hit_never_sleeps() {
    let ca = FakeCa::pending_after("agent1.vm", 0);
    let sleeper = CountingSleeper::default();

    await_pending_certificate(&ca, &policy(), &sleeper, &CancellationToken::new()).unwrap();

    assert_eq!(ca.pending_calls.get(), 1);
    assert!(sleeper.sleeps.borrow().is_empty());
}

#[test]
fn gives_up_after_exactly_max_attempts() {
    let ca = FakeCa::never_pending();
    let sleeper = CountingSleeper::default();

    let err = await_pending_certificate(&ca, &policy(), &sleeper, &CancellationToken::new())
        .unwrap_err();

    assert!(matches!(err, Error::NoEnrollmentRequest { attempts: 3 }));
    assert_eq!(ca.pending_calls.get(), 3);
    // no sleep after the final attempt
    assert_eq!(sleeper.sleeps.borrow().len(), 2);
}

#[test]
fn single_attempt_policy_never_sleeps() {
    let ca = FakeCa::never_pending();
    let sleeper = CountingSleeper::default();
    let policy = PollPolicy {
        max_attempts: 1,
        interval: Duration::from_secs(5),
    };

    assert!(await_pending_certificate(&ca, &policy, &sleeper, &CancellationToken::new()).is_err());
    assert!(sleeper.sleeps.borrow().is_empty());
}

#[test]
fn stale_request_from_another_node_does_not_end_the_wait() {
    let ca = FakeCa::pending_after("compile1.vm", 1).with_stale("stale.vm");
    let sleeper = CountingSleeper::default();

    let subject = await_subject_certificate(
        &ca,
        "compile1.vm",
        &policy(),
        &sleeper,
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(subject, "compile1.vm");
    assert_eq!(ca.pending_calls.get(), 2);
    assert_eq!(sleeper.sleeps.borrow().len(), 1);
}

#[test]
fn any_subject_poll_takes_the_first_request() {
    let ca = FakeCa::pending_after("compile1.vm", 1).with_stale("stale.vm");
    let sleeper = CountingSleeper::default();

    let subject =
        await_pending_certificate(&ca, &policy(), &sleeper, &CancellationToken::new()).unwrap();

    assert_eq!(subject, "stale.vm");
    assert!(sleeper.sleeps.borrow().is_empty());
}

#[test]
fn only_stale_requests_exhaust_the_attempts() {
    let ca = FakeCa::never_pending().with_stale("stale.vm");
    let sleeper = CountingSleeper::default();

    let err = await_subject_certificate(
        &ca,
        "compile1.vm",
        &policy(),
        &sleeper,
        &CancellationToken::new(),
    )
    .unwrap_err();

    assert!(matches!(err, Error::NoEnrollmentRequest { attempts: 3 }));
    assert_eq!(ca.pending_calls.get(), 3);
    assert_eq!(sleeper.sleeps.borrow().len(), 2);
}

#[test]
fn cancelled_poll_stops_before_querying() {
    let ca = FakeCa::pending_after("compile1.vm", 0);
    let sleeper = CountingSleeper::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = await_pending_certificate(&ca, &policy(), &sleeper, &cancel).unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(ca.pending_calls.get(), 0);
}
