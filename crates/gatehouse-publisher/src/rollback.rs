//! Compensation stack
//!
//! Each workflow step that creates or changes something pushes an action
//! undoing it. On failure the actions run newest-first; their own failures
//! are logged and never replace the original error. On success the stack is
//! committed and nothing runs.

use futures::future::BoxFuture;
use tracing::{info, warn};

type Action = Box<dyn FnOnce() -> BoxFuture<'static, gatehouse_common::Result<()>> + Send>;

struct Step {
    description: String,
    action: Action,
}

/// Undo actions for the steps completed so far
#[derive(Default)]
pub struct Compensator {
    steps: Vec<Step>,
}

impl Compensator {
    /// Empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the undo action for a completed step
    pub fn push<F>(&mut self, description: impl Into<String>, action: F)
    where
        F: FnOnce() -> BoxFuture<'static, gatehouse_common::Result<()>> + Send + 'static,
    {
        self.steps.push(Step {
            description: description.into(),
            action: Box::new(action),
        });
    }

    /// Number of registered actions
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every action, newest first. Returns how many failed.
    pub async fn rollback(self) -> usize {
        let total = self.steps.len();
        let mut failed = 0;
        for step in self.steps.into_iter().rev() {
            if let Err(e) = (step.action)().await {
                failed += 1;
                warn!(step = %step.description, error = %e, "rollback step failed");
            }
        }
        if total > 0 {
            info!(steps = total, failed, "rolled back workflow");
        }
        failed
    }

    /// Drop every action without running it
    pub fn commit(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn recorder(
        log: &Log,
        name: &'static str,
        fail: bool,
    ) -> impl FnOnce() -> BoxFuture<'static, gatehouse_common::Result<()>> + Send + 'static {
        let log = log.clone();
        move || {
            async move {
                log.lock().push(name);
                if fail {
                    Err(gatehouse_common::Error::internal(name))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn runs_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut comp = Compensator::new();
        comp.push("first", recorder(&log, "first", false));
        comp.push("second", recorder(&log, "second", false));
        comp.push("third", recorder(&log, "third", false));
        assert_eq!(comp.len(), 3);

        assert_eq!(comp.rollback().await, 0);
        assert_eq!(*log.lock(), vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn failures_do_not_stop_remaining_steps() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut comp = Compensator::new();
        comp.push("first", recorder(&log, "first", false));
        comp.push("second", recorder(&log, "second", true));

        assert_eq!(comp.rollback().await, 1);
        assert_eq!(*log.lock(), vec!["second", "first"]);
    }

    #[tokio::test]
    async fn commit_runs_nothing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut comp = Compensator::new();
        comp.push("first", recorder(&log, "first", false));
        comp.commit();
        assert!(log.lock().is_empty());
    }
}
