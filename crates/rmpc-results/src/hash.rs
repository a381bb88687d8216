//! Content-based hashing for run IDs.

use crate::ResultsResult;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 over the serialized run configuration and solver version.
pub fn compute_run_id<C: Serialize>(config: &C, solver_version: &str) -> ResultsResult<String> {
    let mut hasher = Sha256::new();

    let config_json = serde_json::to_string(config)?;
    hasher.update(config_json.as_bytes());

    hasher.update(solver_version.as_bytes());

    let result = hasher.finalize();
    Ok(format!("{:x}", result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Config {
        horizon: usize,
        realizations: Vec<f64>,
    }

    #[test]
    fn hash_stability() {
        let c = Config {
            horizon: 5,
            realizations: vec![1.0, 1.1],
        };
        let hash1 = compute_run_id(&c, "v1").unwrap();
        let hash2 = compute_run_id(&c, "v1").unwrap();
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn hash_differs_for_different_inputs() {
        let a = Config {
            horizon: 5,
            realizations: vec![1.0, 1.1],
        };
        let b = Config {
            horizon: 6,
            realizations: vec![1.0, 1.1],
        };
        assert_ne!(
            compute_run_id(&a, "v1").unwrap(),
            compute_run_id(&b, "v1").unwrap()
        );
        assert_ne!(
            compute_run_id(&a, "v1").unwrap(),
            compute_run_id(&a, "v2").unwrap()
        );
    }
}
