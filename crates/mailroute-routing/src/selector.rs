//! Deterministic weighted backend selection
//!
//! A weighted option list encodes relative weight by repetition, so selection
//! is a plain modulo over the list:
//!
//! ```rust
//! use mailroute_core::WeightedOption;
//! use mailroute_routing::select;
//!
//! let options = WeightedOption::from(vec!["sendgrid", "sendgrid", "mailgun", "directSend"]);
//!
//! assert_eq!(select(&options, 0).unwrap(), "sendgrid");
//! assert_eq!(select(&options, 2).unwrap(), "mailgun");
//! assert_eq!(select(&options, 7).unwrap(), "directSend");
//! // Negative keys wrap the mathematical way
//! assert_eq!(select(&options, -1).unwrap(), "directSend");
//! ```
//!
//! ## Stickiness
//!
//! The same key against the same list always yields the same backend, so
//! repeated requests from one user stay on one provider. There is no counter
//! or other hidden state; selection is safe to call from any thread.

use mailroute_core::{Error, Result, WeightedOption};

/// Pick the option at `key mod len(options)`
///
/// # Errors
/// - `Error::EmptyPolicy` if `options` is empty
pub fn select(options: &WeightedOption, key: i64) -> Result<&str> {
    let index = slot(options.len(), key)
        .ok_or_else(|| Error::EmptyPolicy("<no options>".to_string()))?;
    Ok(options.as_slice()[index].as_str())
}

/// Index into a list of `len` slots for `key`
///
/// Uses Euclidean remainder so the result is never negative, unlike `%`.
/// Returns `None` for an empty list.
pub fn slot(len: usize, key: i64) -> Option<usize> {
    if len == 0 {
        return None;
    }

    // Lists longer than i64::MAX cannot exist in memory; clamp for the conversion
    let modulus = i64::try_from(len).unwrap_or(i64::MAX);
    let index = key.rem_euclid(modulus);
    usize::try_from(index).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn options(ids: &[&str]) -> WeightedOption {
        WeightedOption::from(ids.to_vec())
    }

    #[test]
    fn test_select_basic() {
        let opts = options(&["p1", "p2", "p3"]);

        assert_eq!(select(&opts, 0).unwrap(), "p1");
        assert_eq!(select(&opts, 1).unwrap(), "p2");
        assert_eq!(select(&opts, 2).unwrap(), "p3");
        assert_eq!(select(&opts, 3).unwrap(), "p1"); // Wraps around
        assert_eq!(select(&opts, 4).unwrap(), "p2");
    }

    #[test]
    fn test_select_single_option() {
        let opts = options(&["only-one"]);

        for key in [-5, 0, 1, 42, i64::MAX, i64::MIN] {
            assert_eq!(select(&opts, key).unwrap(), "only-one");
        }
    }

    #[test]
    fn test_select_empty_is_error() {
        let opts = WeightedOption::default();
        let result = select(&opts, 1);
        assert!(matches!(result.unwrap_err(), Error::EmptyPolicy(_)));
    }

    #[test]
    fn test_congruent_keys_select_same_option() {
        let opts = options(&["a", "a", "b", "c", "b"]);
        let len = opts.len() as i64;

        for k in -20..20 {
            let expected = select(&opts, k).unwrap();
            for m in [-3, -1, 1, 2, 1000] {
                assert_eq!(select(&opts, k + m * len).unwrap(), expected);
            }
        }
    }

    #[test]
    fn test_negative_keys_never_panic() {
        let opts = options(&["x", "y", "z"]);

        assert_eq!(select(&opts, -1).unwrap(), "z");
        assert_eq!(select(&opts, -2).unwrap(), "y");
        assert_eq!(select(&opts, -3).unwrap(), "x");
        // i64::MIN = -9223372036854775808 ≡ 1 (mod 3)
        assert_eq!(select(&opts, i64::MIN).unwrap(), "y");
        // i64::MAX = 9223372036854775807 ≡ 1 (mod 3)
        assert_eq!(select(&opts, i64::MAX).unwrap(), "y");
    }

    #[test]
    fn test_repetition_encodes_weight() {
        let mut list = vec!["p1"; 70];
        list.extend(vec!["p2"; 20]);
        list.extend(vec!["p3"; 10]);
        let opts = options(&list);

        let mut counts = HashMap::new();
        for key in 0..100 {
            let backend = select(&opts, key).unwrap();
            *counts.entry(backend).or_insert(0) += 1;
        }

        // Check distribution matches repetition counts
        assert_eq!(counts.get("p1").unwrap(), &70);
        assert_eq!(counts.get("p2").unwrap(), &20);
        assert_eq!(counts.get("p3").unwrap(), &10);
    }

    #[test]
    fn test_slot_bounds() {
        assert_eq!(slot(0, 5), None);
        for len in 1..10usize {
            for key in -50..50 {
                let index = slot(len, key).unwrap();
                assert!(index < len);
            }
        }
    }
}
