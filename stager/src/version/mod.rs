//! Version selection.
//!
//! Parcel versions are opaque vendor strings like `5.13.0-1.cdh5.13.0.p0.29`
//! rather than semver, so "latest" is picked with a natural ordering that
//! compares embedded digit runs as integers instead of character sequences
//! (`5.13.0-1` sorts after `5.9.0-1`, where plain lexical ordering would
//! get it wrong).

use std::cmp::Ordering;

use crate::errors::{Result, StagerError};

/// Sentinel version token meaning "the newest available version".
pub const LATEST: &str = "latest";

/// Resolves a requested version token against the available set.
///
/// `"latest"` picks the maximum of `available` under [`natural_cmp`] and
/// fails if the set is empty. Any other token is returned verbatim with no
/// existence check; a missing version surfaces later as a parcel lookup
/// error.
pub fn resolve(requested: &str, available: &[String], product: &str) -> Result<String> {
    if requested != LATEST {
        return Ok(requested.to_string());
    }
    available
        .iter()
        .max_by(|a, b| natural_cmp(a, b))
        .cloned()
        .ok_or_else(|| StagerError::VersionResolution {
            product: product.to_string(),
        })
}

/// Total order over version strings treating digit runs as integers.
///
/// Strings are compared run by run, where a run is either a maximal span of
/// ASCII digits or a maximal span of non-digits. Digit runs compare
/// numerically (leading zeros stripped, with run length as a final
/// tiebreaker so the order stays total); other runs compare lexically. A
/// digit run sorts before a non-digit run, and a prefix sorts before its
/// extensions.
#[must_use]
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = runs(a);
    let mut right = runs(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x, y) {
                    (Run::Digits(x), Run::Digits(y)) => cmp_digit_runs(x, y),
                    (Run::Text(x), Run::Text(y)) => x.cmp(y),
                    (Run::Digits(_), Run::Text(_)) => Ordering::Less,
                    (Run::Text(_), Run::Digits(_)) => Ordering::Greater,
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Run<'a> {
    Digits(&'a str),
    Text(&'a str),
}

fn runs(s: &str) -> impl Iterator<Item = Run<'_>> {
    let mut rest = s;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let digits = rest.starts_with(|c: char| c.is_ascii_digit());
        let end = rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(rest.len());
        let (run, tail) = rest.split_at(end);
        rest = tail;
        Some(if digits { Run::Digits(run) } else { Run::Text(run) })
    })
}

/// Compares two all-digit runs numerically without parsing into integers,
/// so arbitrarily long runs cannot overflow.
fn cmp_digit_runs(a: &str, b: &str) -> Ordering {
    let sa = a.trim_start_matches('0');
    let sb = b.trim_start_matches('0');
    sa.len()
        .cmp(&sb.len())
        .then_with(|| sa.cmp(sb))
        // Equal values with different zero padding still need a stable order.
        .then_with(|| a.len().cmp(&b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn owned(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_latest_uses_natural_order() {
        let available = owned(&["5.9.0-1", "5.13.0-1", "5.2.0-1"]);
        let resolved = resolve("latest", &available, "CDH").unwrap();
        // Lexical ordering would have picked 5.9.0-1.
        assert_eq!(resolved, "5.13.0-1");
    }

    #[test]
    fn test_exact_version_returned_verbatim() {
        let available = owned(&["5.9.0-1"]);
        let resolved = resolve("4.0.0-nonexistent", &available, "CDH").unwrap();
        assert_eq!(resolved, "4.0.0-nonexistent");

        // Membership is not checked even against an empty set.
        let resolved = resolve("1.2.3", &[], "CDH").unwrap();
        assert_eq!(resolved, "1.2.3");
    }

    #[test]
    fn test_latest_with_no_versions_fails() {
        let err = resolve("latest", &[], "CDH").unwrap_err();
        assert!(matches!(
            err,
            StagerError::VersionResolution { ref product } if product == "CDH"
        ));
    }

    #[test]
    fn test_full_vendor_version_strings() {
        let available = owned(&[
            "5.13.0-1.cdh5.13.0.p0.29",
            "5.9.0-1.cdh5.9.0.p0.23",
            "5.13.0-1.cdh5.13.0.p0.3",
        ]);
        let resolved = resolve("latest", &available, "CDH").unwrap();
        assert_eq!(resolved, "5.13.0-1.cdh5.13.0.p0.29");
    }

    #[test]
    fn test_natural_cmp_digit_runs() {
        assert_eq!(natural_cmp("5.9.0", "5.13.0"), Ordering::Less);
        assert_eq!(natural_cmp("5.13.0", "5.13.0"), Ordering::Equal);
        assert_eq!(natural_cmp("10", "9"), Ordering::Greater);
        assert_eq!(natural_cmp("2", "10"), Ordering::Less);
    }

    #[test]
    fn test_natural_cmp_leading_zeros() {
        assert_eq!(natural_cmp("1.02", "1.3"), Ordering::Less);
        // Equal numeric value, shorter run sorts first for a total order.
        assert_eq!(natural_cmp("1.2", "1.02"), Ordering::Less);
    }

    #[test]
    fn test_natural_cmp_mixed_runs() {
        assert_eq!(natural_cmp("1.0-rc1", "1.0-rc2"), Ordering::Less);
        assert_eq!(natural_cmp("1.0", "1.0-rc1"), Ordering::Less);
        // Digit runs sort before text runs.
        assert_eq!(natural_cmp("1.0.1", "1.0.beta"), Ordering::Less);
    }

    #[test]
    fn test_natural_cmp_overlong_digit_runs() {
        let a = "1.184467440737095516160"; // past u64
        let b = "1.184467440737095516159";
        assert_eq!(natural_cmp(a, b), Ordering::Greater);
    }
}
