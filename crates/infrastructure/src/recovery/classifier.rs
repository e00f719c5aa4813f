//! Error classification and the per-category recovery playbook.

use chrono::{DateTime, Utc};
use serde::Serialize;

use harvester_core::HarvesterError;

/// Broad failure category driving the recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Scraping,
    System,
    Validation,
}

/// Where and when a classified error happened. Immutable once attached.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorContext {
    pub operation: String,
    pub url: Option<String>,
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
}

impl ErrorContext {
    pub fn new(operation: &str, url: Option<&str>, attempt: u32) -> Self {
        Self {
            operation: operation.to_string(),
            url: url.map(str::to_string),
            attempt,
            timestamp: Utc::now(),
        }
    }
}

/// A single step in a category's recovery playbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryActionKind {
    WaitAndRetry,
    RotateIdentity,
    FallbackSelector,
    RestartBrowser,
    ClearCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryAction {
    pub kind: RecoveryActionKind,
    pub description: &'static str,
}

const NETWORK_ACTIONS: &[RecoveryAction] = &[
    RecoveryAction {
        kind: RecoveryActionKind::WaitAndRetry,
        description: "wait with backoff and retry the request",
    },
    RecoveryAction {
        kind: RecoveryActionKind::RotateIdentity,
        description: "rotate user agent and proxy before retrying",
    },
];

const SCRAPING_ACTIONS: &[RecoveryAction] = &[
    RecoveryAction {
        kind: RecoveryActionKind::FallbackSelector,
        description: "try the fallback selector set",
    },
    RecoveryAction {
        kind: RecoveryActionKind::RestartBrowser,
        description: "restart the browser and re-open the page",
    },
];

const SYSTEM_ACTIONS: &[RecoveryAction] = &[
    RecoveryAction {
        kind: RecoveryActionKind::ClearCache,
        description: "clear caches to release memory",
    },
    RecoveryAction {
        kind: RecoveryActionKind::RestartBrowser,
        description: "restart the browser to reclaim resources",
    },
];

/// Validation failures have no recovery path; they surface immediately.
const VALIDATION_ACTIONS: &[RecoveryAction] = &[];

impl ErrorCategory {
    /// Ordered recovery actions for this category.
    pub fn recovery_actions(&self) -> &'static [RecoveryAction] {
        match self {
            ErrorCategory::Network => NETWORK_ACTIONS,
            ErrorCategory::Scraping => SCRAPING_ACTIONS,
            ErrorCategory::System => SYSTEM_ACTIONS,
            ErrorCategory::Validation => VALIDATION_ACTIONS,
        }
    }
}

/// Map an error to its category: the variant decides where it can, the
/// message heuristics catch wrapped and foreign errors.
pub fn classify(error: &HarvesterError) -> ErrorCategory {
    match error {
        HarvesterError::Network(_) | HarvesterError::Timeout(_) => ErrorCategory::Network,
        HarvesterError::Scraping(_) => ErrorCategory::Scraping,
        HarvesterError::System(_)
        | HarvesterError::ResourceExhausted(_)
        | HarvesterError::Io(_) => ErrorCategory::System,
        HarvesterError::DataValidation(_) | HarvesterError::Serialization(_) => {
            ErrorCategory::Validation
        }
        other => classify_message(&other.to_string()),
    }
}

fn classify_message(message: &str) -> ErrorCategory {
    let message = message.to_lowercase();
    const NETWORK_MARKERS: &[&str] = &[
        "timeout",
        "timed out",
        "connection",
        "refused",
        "reset",
        "dns",
        "socket",
        "unreachable",
    ];
    const SCRAPING_MARKERS: &[&str] = &[
        "selector",
        "element",
        "not found on page",
        "navigation",
        "page crash",
        "detached",
    ];
    const VALIDATION_MARKERS: &[&str] = &["validation", "invalid data", "schema", "missing field"];

    if NETWORK_MARKERS.iter().any(|m| message.contains(m)) {
        ErrorCategory::Network
    } else if SCRAPING_MARKERS.iter().any(|m| message.contains(m)) {
        ErrorCategory::Scraping
    } else if VALIDATION_MARKERS.iter().any(|m| message.contains(m)) {
        ErrorCategory::Validation
    } else {
        ErrorCategory::System
    }
}

/// Recoverable means the category has actions AND the error itself is
/// retryable; boundary and validation errors never qualify.
pub fn can_recover(error: &HarvesterError) -> bool {
    !classify(error).recovery_actions().is_empty() && error.is_retryable()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_classification() {
        assert_eq!(
            classify(&HarvesterError::Network("reset".into())),
            ErrorCategory::Network
        );
        assert_eq!(
            classify(&HarvesterError::Timeout("fetch".into())),
            ErrorCategory::Network
        );
        assert_eq!(
            classify(&HarvesterError::Scraping("selector gone".into())),
            ErrorCategory::Scraping
        );
        assert_eq!(
            classify(&HarvesterError::System("oom".into())),
            ErrorCategory::System
        );
        assert_eq!(
            classify(&HarvesterError::DataValidation("bad shape".into())),
            ErrorCategory::Validation
        );
    }

    #[test]
    fn test_message_heuristics_for_wrapped_errors() {
        assert_eq!(
            classify(&HarvesterError::Internal("connection refused by host".into())),
            ErrorCategory::Network
        );
        assert_eq!(
            classify(&HarvesterError::Internal("element detached from DOM".into())),
            ErrorCategory::Scraping
        );
        assert_eq!(
            classify(&HarvesterError::Internal("something odd".into())),
            ErrorCategory::System
        );
    }

    #[test]
    fn test_playbooks_are_ordered() {
        let actions = ErrorCategory::Network.recovery_actions();
        assert_eq!(actions[0].kind, RecoveryActionKind::WaitAndRetry);
        assert_eq!(actions[1].kind, RecoveryActionKind::RotateIdentity);

        let actions = ErrorCategory::Scraping.recovery_actions();
        assert_eq!(actions[0].kind, RecoveryActionKind::FallbackSelector);
        assert_eq!(actions[1].kind, RecoveryActionKind::RestartBrowser);

        let actions = ErrorCategory::System.recovery_actions();
        assert_eq!(actions[0].kind, RecoveryActionKind::ClearCache);

        assert!(ErrorCategory::Validation.recovery_actions().is_empty());
    }

    #[test]
    fn test_can_recover_requires_actions_and_retryability() {
        assert!(can_recover(&HarvesterError::Network("reset".into())));
        assert!(can_recover(&HarvesterError::Scraping("selector".into())));
        // validation: no actions, not retryable
        assert!(!can_recover(&HarvesterError::DataValidation("bad".into())));
        // boundary error: actions exist for its category but it is not retryable
        assert!(!can_recover(&HarvesterError::unknown_task_type("x")));
    }

    #[test]
    fn test_error_context_is_stamped() {
        let ctx = ErrorContext::new("fetch_match", Some("https://example.com"), 2);
        assert_eq!(ctx.operation, "fetch_match");
        assert_eq!(ctx.url.as_deref(), Some("https://example.com"));
        assert_eq!(ctx.attempt, 2);
    }
}
