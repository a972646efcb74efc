use std::collections::HashMap;
use std::time::Duration;

/// Error classification used to pick a recovery strategy. Kinds, not types:
/// many concrete errors map onto one recovery behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    FileWatchFailed,
    ChangeDetectionFailed,
    IndexUpdateFailed,
    PermissionDenied,
    FileTooLarge,
    ProjectNotFound,
    TransientIo,
    OversizeInput,
    ParseFailure,
    EmbedderUnavailable,
    VectorStoreFailure,
    ConsistencyFailure,
    ProgrammerError,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::FileWatchFailed => "FILE_WATCH_FAILED",
            ErrorKind::ChangeDetectionFailed => "CHANGE_DETECTION_FAILED",
            ErrorKind::IndexUpdateFailed => "INDEX_UPDATE_FAILED",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::FileTooLarge => "FILE_TOO_LARGE",
            ErrorKind::ProjectNotFound => "PROJECT_NOT_FOUND",
            ErrorKind::TransientIo => "TRANSIENT_IO",
            ErrorKind::OversizeInput => "OVERSIZE_INPUT",
            ErrorKind::ParseFailure => "PARSE_FAILURE",
            ErrorKind::EmbedderUnavailable => "EMBEDDER_UNAVAILABLE",
            ErrorKind::VectorStoreFailure => "VECTOR_STORE_FAILURE",
            ErrorKind::ConsistencyFailure => "CONSISTENCY_FAILURE",
            ErrorKind::ProgrammerError => "PROGRAMMER_ERROR",
        }
    }
}

/// Retry budget and pacing for one error kind. The registry only decides
/// whether and when to retry; the component owning the affected resource
/// performs the actual restart.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryPlan {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub retryable: bool,
}

impl RecoveryPlan {
    const fn retry(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            retryable: true,
        }
    }

    const fn terminal() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            retryable: false,
        }
    }
}

/// Immutable registry of recovery plans, one per error kind, built once at
/// startup.
pub struct RecoveryRegistry {
    plans: HashMap<ErrorKind, RecoveryPlan>,
}

impl RecoveryRegistry {
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut plans = HashMap::new();
        plans.insert(
            ErrorKind::FileWatchFailed,
            RecoveryPlan::retry(3, Duration::from_secs(1)),
        );
        plans.insert(
            ErrorKind::ChangeDetectionFailed,
            RecoveryPlan::retry(2, Duration::from_secs(2)),
        );
        plans.insert(
            ErrorKind::IndexUpdateFailed,
            RecoveryPlan::retry(1, Duration::from_secs(1)),
        );
        plans.insert(ErrorKind::PermissionDenied, RecoveryPlan::terminal());
        plans.insert(ErrorKind::FileTooLarge, RecoveryPlan::terminal());
        plans.insert(
            ErrorKind::ProjectNotFound,
            RecoveryPlan::retry(1, Duration::from_secs(1)),
        );
        plans.insert(
            ErrorKind::TransientIo,
            RecoveryPlan::retry(3, Duration::from_millis(500)),
        );
        plans.insert(ErrorKind::OversizeInput, RecoveryPlan::terminal());
        plans.insert(ErrorKind::ParseFailure, RecoveryPlan::terminal());
        plans.insert(
            ErrorKind::EmbedderUnavailable,
            RecoveryPlan::retry(3, Duration::from_secs(1)),
        );
        plans.insert(
            ErrorKind::VectorStoreFailure,
            RecoveryPlan::retry(3, Duration::from_secs(1)),
        );
        plans.insert(ErrorKind::ConsistencyFailure, RecoveryPlan::terminal());
        plans.insert(ErrorKind::ProgrammerError, RecoveryPlan::terminal());
        Self { plans }
    }

    /// The plan for a kind; unknown kinds are terminal.
    #[must_use]
    pub fn plan_for(&self, kind: ErrorKind) -> RecoveryPlan {
        self.plans
            .get(&kind)
            .copied()
            .unwrap_or_else(RecoveryPlan::terminal)
    }

    /// Whether another attempt is allowed after `attempt` failures
    /// (1-indexed: the first failure is attempt 1).
    #[must_use]
    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> bool {
        let plan = self.plan_for(kind);
        plan.retryable && attempt <= plan.max_retries
    }
}

impl Default for RecoveryRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_plan_budgets() {
        let registry = RecoveryRegistry::with_defaults();

        let watch = registry.plan_for(ErrorKind::FileWatchFailed);
        assert_eq!(watch.max_retries, 3);
        assert_eq!(watch.base_delay, Duration::from_secs(1));

        let detect = registry.plan_for(ErrorKind::ChangeDetectionFailed);
        assert_eq!(detect.max_retries, 2);
        assert_eq!(detect.base_delay, Duration::from_secs(2));

        let index = registry.plan_for(ErrorKind::IndexUpdateFailed);
        assert_eq!(index.max_retries, 1);
    }

    #[test]
    fn non_retryable_kinds_have_zero_budget() {
        let registry = RecoveryRegistry::with_defaults();
        for kind in [
            ErrorKind::PermissionDenied,
            ErrorKind::FileTooLarge,
            ErrorKind::OversizeInput,
            ErrorKind::ParseFailure,
            ErrorKind::ProgrammerError,
        ] {
            let plan = registry.plan_for(kind);
            assert!(!plan.retryable, "{} must not retry", kind.as_str());
            assert_eq!(plan.max_retries, 0);
        }
    }

    #[test]
    fn retry_budget_is_bounded() {
        let registry = RecoveryRegistry::with_defaults();
        assert!(registry.should_retry(ErrorKind::FileWatchFailed, 1));
        assert!(registry.should_retry(ErrorKind::FileWatchFailed, 3));
        assert!(!registry.should_retry(ErrorKind::FileWatchFailed, 4));
        assert!(!registry.should_retry(ErrorKind::PermissionDenied, 1));
    }
}
