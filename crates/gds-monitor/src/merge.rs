//! Sequencing of multi-step remote operations.

use crate::remote::{RemoteResult, RemoteStatus};

/// One remote call of a protocol sequence.
pub type Step<'a> = &'a dyn Fn() -> RemoteResult<RemoteStatus>;

/// Run `steps` in order and return the first status that is not
/// [`RemoteStatus::Success`]. Later steps are not invoked once one fails.
///
/// Transport faults are not caught; they abort the sequence and propagate to
/// the caller.
pub fn merge_results(steps: &[Step<'_>]) -> RemoteResult<RemoteStatus> {
    for step in steps {
        let status = step()?;
        if !status.is_success() {
            return Ok(status);
        }
    }
    Ok(RemoteStatus::Success)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::remote::RemoteFault;

    #[test]
    fn merge_stops_at_first_error() {
        let calls = Cell::new(0u32);
        let result = merge_results(&[
            &|| {
                calls.set(calls.get() + 1);
                Ok(RemoteStatus::Success)
            },
            &|| {
                calls.set(calls.get() + 1);
                Ok(RemoteStatus::Other(17))
            },
            &|| {
                calls.set(calls.get() + 1);
                Ok(RemoteStatus::Success)
            },
        ]);
        assert_eq!(result, Ok(RemoteStatus::Other(17)));
        assert_eq!(calls.get(), 2, "third step must not run");
    }

    #[test]
    fn merge_of_successes_is_success() {
        let result = merge_results(&[&|| Ok(RemoteStatus::Success), &|| Ok(RemoteStatus::Success)]);
        assert_eq!(result, Ok(RemoteStatus::Success));
        assert_eq!(merge_results(&[]), Ok(RemoteStatus::Success));
    }

    #[test]
    fn merge_propagates_faults() {
        let reached = Cell::new(false);
        let result = merge_results(&[
            &|| Err(RemoteFault::new("connection reset")),
            &|| {
                reached.set(true);
                Ok(RemoteStatus::Success)
            },
        ]);
        assert_eq!(result, Err(RemoteFault::new("connection reset")));
        assert!(!reached.get());
    }
}
