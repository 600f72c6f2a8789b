// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subject validation and wildcard matching.
//!
//! Subjects are dot-separated elements (`GMSEC.MISSION.SAT1.MSG`).
//! Subscription patterns may additionally use:
//!
//! | Token | Position | Matches |
//! |-------|----------|---------|
//! | `*`   | any      | exactly one element |
//! | `>`   | last     | one or more trailing elements |
//! | `+`   | last     | zero or more trailing elements |

use crate::error::{Error, Result};

fn valid_element(element: &str) -> bool {
    !element.is_empty()
        && element
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Validate a concrete subject used for publishing.
pub fn validate_subject(subject: &str) -> Result<()> {
    if subject.is_empty() || !subject.split('.').all(valid_element) {
        return Err(Error::InvalidSubject(subject.to_string()));
    }
    Ok(())
}

/// Validate a subscription pattern.
pub fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(Error::InvalidSubject(pattern.to_string()));
    }
    let elements: Vec<&str> = pattern.split('.').collect();
    let last = elements.len() - 1;
    for (i, element) in elements.iter().enumerate() {
        let ok = match *element {
            "*" => true,
            ">" | "+" => i == last,
            other => valid_element(other),
        };
        if !ok {
            return Err(Error::InvalidSubject(pattern.to_string()));
        }
    }
    Ok(())
}

/// Check whether `subject` is selected by `pattern`.
pub fn matches(pattern: &str, subject: &str) -> bool {
    let subject: Vec<&str> = subject.split('.').collect();
    for (i, element) in pattern.split('.').enumerate() {
        match element {
            ">" => return subject.len() > i,
            "+" => return true,
            "*" => {
                if i >= subject.len() {
                    return false;
                }
            }
            literal => {
                if subject.get(i) != Some(&literal) {
                    return false;
                }
            }
        }
    }
    pattern.split('.').count() == subject.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_subject() {
        assert!(validate_subject("GMSEC.MISSION.SAT-1.MSG_X").is_ok());
        assert!(validate_subject("").is_err());
        assert!(validate_subject("A..B").is_err());
        assert!(validate_subject("A.*").is_err());
        assert!(validate_subject("A.B ").is_err());
    }

    #[test]
    fn test_validate_pattern() {
        assert!(validate_pattern("GMSEC.*.SAT1.>").is_ok());
        assert!(validate_pattern("GMSEC.+").is_ok());
        assert!(validate_pattern("GMSEC.>.X").is_err());
        assert!(validate_pattern("GMSEC.+.X").is_err());
        assert!(validate_pattern("").is_err());
    }

    #[test]
    fn test_matches() {
        assert!(matches("A.B.C", "A.B.C"));
        assert!(!matches("A.B.C", "A.B"));
        assert!(!matches("A.B", "A.B.C"));
        assert!(matches("A.*.C", "A.X.C"));
        assert!(!matches("A.*", "A"));
        assert!(matches("A.>", "A.B.C"));
        assert!(!matches("A.>", "A"));
        assert!(matches("A.+", "A"));
        assert!(matches("A.+", "A.B.C"));
        assert!(!matches("A.+", "B.C"));
    }
}
