//! Graceful degradation: fallback results and partial-result collection.

use std::future::Future;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use harvester_core::{HarvesterError, HarvesterResult};

/// Run `primary`; on failure run `fallback` and accept its result only if
/// every required field is present and non-null. Otherwise the ORIGINAL
/// error surfaces — a fallback that cannot satisfy the contract never
/// masks the real failure.
pub async fn execute_with_fallback<T, P, PF, F, FF>(
    primary: P,
    fallback: F,
    required_fields: &[&str],
) -> HarvesterResult<T>
where
    T: Serialize,
    P: FnOnce() -> PF,
    PF: Future<Output = HarvesterResult<T>>,
    F: FnOnce() -> FF,
    FF: Future<Output = HarvesterResult<T>>,
{
    let original_error = match primary().await {
        Ok(value) => return Ok(value),
        Err(error) => error,
    };
    debug!("primary operation failed, trying fallback: {original_error}");

    match fallback().await {
        Ok(value) if has_required_fields(&value, required_fields) => {
            warn!("serving degraded fallback result");
            Ok(value)
        }
        Ok(_) => {
            warn!("fallback result missing required fields, surfacing original error");
            Err(original_error)
        }
        Err(fallback_error) => {
            warn!("fallback also failed: {fallback_error}");
            Err(original_error)
        }
    }
}

fn has_required_fields<T: Serialize>(value: &T, required_fields: &[&str]) -> bool {
    let Ok(value) = serde_json::to_value(value) else {
        return false;
    };
    required_fields
        .iter()
        .all(|field| value.get(field).map(|v| !v.is_null()).unwrap_or(false))
}

/// Successes and failures of a concurrent batch, kept independently.
#[derive(Debug)]
pub struct PartialResults<T> {
    pub successful: Vec<T>,
    pub failed: Vec<HarvesterError>,
    pub success_rate: f64,
}

/// Run all operations concurrently and collect what succeeded. Errors only
/// when fewer than `minimum_success` operations came through.
pub async fn collect_partial_results<T, Fut>(
    operations: Vec<Fut>,
    minimum_success: usize,
) -> HarvesterResult<PartialResults<T>>
where
    Fut: Future<Output = HarvesterResult<T>>,
{
    let total = operations.len();
    let mut successful = Vec::new();
    let mut failed = Vec::new();

    for result in join_all(operations).await {
        match result {
            Ok(value) => successful.push(value),
            Err(error) => failed.push(error),
        }
    }

    if successful.len() < minimum_success {
        return Err(HarvesterError::InsufficientResults {
            successes: successful.len(),
            required: minimum_success,
        });
    }

    let success_rate = if total == 0 {
        0.0
    } else {
        successful.len() as f64 / total as f64
    };

    Ok(PartialResults {
        successful,
        failed,
        success_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let result = execute_with_fallback(
            || async { Ok::<_, HarvesterError>(json!({"home": "arsenal"})) },
            || async { panic!("fallback must not run") },
            &["home"],
        )
        .await
        .unwrap();
        assert_eq!(result["home"], "arsenal");
    }

    #[tokio::test]
    async fn test_fallback_accepted_when_fields_present() {
        let result = execute_with_fallback(
            || async {
                Err::<serde_json::Value, _>(HarvesterError::Network("primary down".into()))
            },
            || async { Ok(json!({"home": "arsenal", "away": "chelsea"})) },
            &["home", "away"],
        )
        .await
        .unwrap();
        assert_eq!(result["away"], "chelsea");
    }

    #[tokio::test]
    async fn test_fallback_missing_field_surfaces_original_error() {
        let err = execute_with_fallback(
            || async {
                Err::<serde_json::Value, _>(HarvesterError::Network("primary down".into()))
            },
            || async { Ok(json!({"home": "arsenal", "away": null})) },
            &["home", "away"],
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Network error: primary down");
    }

    #[tokio::test]
    async fn test_fallback_failure_surfaces_original_error() {
        let err = execute_with_fallback(
            || async {
                Err::<serde_json::Value, _>(HarvesterError::Scraping("selector gone".into()))
            },
            || async { Err(HarvesterError::Network("fallback down".into())) },
            &[],
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Scraping error: selector gone");
    }

    #[tokio::test]
    async fn test_partial_results_mixed_outcome() {
        let ops = vec![
            futures::future::ready(Ok::<_, HarvesterError>(json!(1))),
            futures::future::ready(Err(HarvesterError::Network("down".into()))),
        ];
        let results = collect_partial_results(ops, 1).await.unwrap();
        assert_eq!(results.successful.len(), 1);
        assert_eq!(results.failed.len(), 1);
        assert!((results.success_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_partial_results_below_minimum_errors() {
        let ops = vec![futures::future::ready(Err::<serde_json::Value, _>(
            HarvesterError::Network("down".into()),
        ))];
        let err = collect_partial_results(ops, 1).await.unwrap_err();
        assert!(matches!(
            err,
            HarvesterError::InsufficientResults {
                successes: 0,
                required: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_partial_results_all_success() {
        let ops: Vec<_> = (0..4)
            .map(|i| futures::future::ready(Ok::<_, HarvesterError>(i)))
            .collect();
        let results = collect_partial_results(ops, 4).await.unwrap();
        assert_eq!(results.successful.len(), 4);
        assert!(results.failed.is_empty());
        assert!((results.success_rate - 1.0).abs() < f64::EPSILON);
    }
}
