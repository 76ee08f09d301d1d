use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Result;
use driftlog::error::{RemoteRejected, RemoteRetryExhausted, RemoteUnavailable};
use driftlog::model::Collection;
use driftlog::remote::{call_with_retry, RetryPolicy};

fn transport_err() -> anyhow::Error {
    RemoteUnavailable {
        reason: "flaky".to_string(),
    }
    .into()
}

#[test]
fn transient_failure_is_retried_and_succeeds() {
    let attempts = AtomicU32::new(0);
    let result: Result<&str> = call_with_retry(&RetryPolicy::for_test(), || true, || {
        if attempts.fetch_add(1, Ordering::SeqCst) < 1 {
            Err(transport_err())
        } else {
            Ok("done")
        }
    });

    assert_eq!(result.expect("eventually succeeds"), "done");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn exhausted_attempts_surface_remote_retry_exhausted() {
    let attempts = AtomicU32::new(0);
    let result: Result<()> = call_with_retry(&RetryPolicy::for_test(), || true, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err(transport_err())
    });

    let err = result.expect_err("must exhaust");
    assert!(err.is::<RemoteRetryExhausted>());
    assert_eq!(attempts.load(Ordering::SeqCst), 3, "bounded at max_attempts");
}

#[test]
fn connectivity_drop_mid_retry_fails_fast() {
    // Online for the first attempt only; the wrapper must not sleep and
    // spin once the device reports offline.
    let probes = AtomicU32::new(0);
    let attempts = AtomicU32::new(0);

    let result: Result<()> = call_with_retry(
        &RetryPolicy::for_test(),
        || probes.fetch_add(1, Ordering::SeqCst) == u32::MAX, // always false
        || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(transport_err())
        },
    );

    let err = result.expect_err("fails fast");
    assert!(err.is::<RemoteUnavailable>(), "original transport error, not exhaustion");
    assert_eq!(attempts.load(Ordering::SeqCst), 1, "no retry while offline");
}

#[test]
fn rejection_is_not_retried() {
    let attempts = AtomicU32::new(0);
    let result: Result<()> = call_with_retry(&RetryPolicy::for_test(), || true, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err(RemoteRejected {
            collection: Collection::JournalEntries,
            id: "e1".to_string(),
            reason: "constraint violation".to_string(),
        }
        .into())
    });

    let err = result.expect_err("rejected");
    assert!(err.is::<RemoteRejected>());
    assert_eq!(attempts.load(Ordering::SeqCst), 1, "rejections are not retried");
}
