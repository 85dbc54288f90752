// SPDX-License-Identifier: MIT

use crate::domain::error::AppError;
use dashmap::DashSet;

/// In-process mutual exclusion for proposal execution. The store keeps a
/// proposal `approved` until its outcome is known, so a crash can never
/// lose an in-flight marker; within the process, only the caller holding
/// the permit may talk to the relayer for that id.
#[derive(Default, Debug)]
pub struct ExecutionGuard {
    in_flight: DashSet<String>,
}

impl ExecutionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim exclusive execution rights for a proposal id. The loser of a
    /// race gets `AlreadyExecuting`; the permit releases on drop.
    pub fn begin(&self, id: &str) -> Result<ExecutionPermit<'_>, AppError> {
        if self.in_flight.insert(id.to_string()) {
            Ok(ExecutionPermit {
                guard: self,
                id: id.to_string(),
            })
        } else {
            Err(AppError::AlreadyExecuting(id.to_string()))
        }
    }
}

#[derive(Debug)]
pub struct ExecutionPermit<'a> {
    guard: &'a ExecutionGuard,
    id: String,
}

impl Drop for ExecutionPermit<'_> {
    fn drop(&mut self) {
        self.guard.in_flight.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_on_same_id_loses() {
        let guard = ExecutionGuard::new();
        let permit = guard.begin("p-1").expect("first claim wins");

        let err = guard.begin("p-1").unwrap_err();
        assert!(matches!(err, AppError::AlreadyExecuting(id) if id == "p-1"));

        drop(permit);
        assert!(guard.begin("p-1").is_ok());
    }

    #[test]
    fn distinct_ids_do_not_contend() {
        let guard = ExecutionGuard::new();
        let _a = guard.begin("p-1").unwrap();
        assert!(guard.begin("p-2").is_ok());
    }
}
