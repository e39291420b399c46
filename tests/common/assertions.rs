//! Assertion helpers for batch results

use replicate_dl::{BatchResult, Error, Outcome, RequestId, StoredArtifact};

/// Assert that `id` completed and return its stored artifacts
pub fn assert_completed<'a>(result: &'a BatchResult, id: &str) -> &'a [StoredArtifact] {
    match result.get(&RequestId::from(id)) {
        Some(Outcome::Completed { artifacts, .. }) => artifacts,
        Some(Outcome::Failed(e)) => panic!("expected {id} to complete, but it failed: {e}"),
        None => panic!("no outcome recorded for {id}"),
    }
}

/// Assert that `id` failed with the given error code and return the error
pub fn assert_failed_with<'a>(result: &'a BatchResult, id: &str, code: &str) -> &'a Error {
    match result.get(&RequestId::from(id)) {
        Some(Outcome::Failed(e)) => {
            assert_eq!(e.code(), code, "unexpected error for {id}: {e}");
            e
        }
        Some(Outcome::Completed { .. }) => panic!("expected {id} to fail with {code}"),
        None => panic!("no outcome recorded for {id}"),
    }
}
