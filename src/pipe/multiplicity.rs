// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Output multiplicity
//!
//! A pipe produces one item, a variable number of items or an exact
//! number of items. Callers may override what the pipe declares.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::errors::{PipeflowError, PipeflowResult};

/// Declared or requested number of outputs
///
/// `Flag(false)` is a single output, `Flag(true)` a list of any length and
/// `Count(n)` a list of exactly `n` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputMultiplicity {
    Flag(bool),
    Count(u32),
}

impl OutputMultiplicity {
    pub fn is_multiple(&self) -> bool {
        match self {
            Self::Flag(multiple) => *multiple,
            Self::Count(_) => true,
        }
    }

    pub fn count(&self) -> Option<u32> {
        match self {
            Self::Count(n) => Some(*n),
            Self::Flag(_) => None,
        }
    }
}

impl fmt::Display for OutputMultiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(false) => Ok(()),
            Self::Flag(true) => write!(f, "[]"),
            Self::Count(n) => write!(f, "[{}]", n),
        }
    }
}

/// Outcome of combining a base multiplicity with an override
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiplicityResolution {
    pub resolved: Option<OutputMultiplicity>,
    pub is_multiple_enabled: bool,
    pub exact_count: Option<u32>,
}

impl MultiplicityResolution {
    fn from_resolved(resolved: Option<OutputMultiplicity>) -> Self {
        Self {
            resolved,
            is_multiple_enabled: resolved.map_or(false, |m| m.is_multiple()),
            exact_count: resolved.and_then(|m| m.count()),
        }
    }
}

/// Combine a pipe's declared multiplicity with a caller override
///
/// - no override keeps the base
/// - `false` forces a single output
/// - `true` enables multiple outputs, keeping the base count if there is one
/// - a count always wins
pub fn resolve_output_multiplicity(
    base: Option<OutputMultiplicity>,
    override_value: Option<OutputMultiplicity>,
) -> MultiplicityResolution {
    let resolved = match override_value {
        None => base,
        Some(OutputMultiplicity::Flag(false)) => Some(OutputMultiplicity::Flag(false)),
        Some(OutputMultiplicity::Flag(true)) => match base {
            Some(OutputMultiplicity::Count(n)) => Some(OutputMultiplicity::Count(n)),
            _ => Some(OutputMultiplicity::Flag(true)),
        },
        Some(count @ OutputMultiplicity::Count(_)) => Some(count),
    };
    MultiplicityResolution::from_resolved(resolved)
}

fn concept_multiplicity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)(?:\[(\d*)\])?$")
            .expect("valid multiplicity regex")
    })
}

/// Concept reference with its bracket suffix split off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptWithMultiplicity {
    pub concept: String,
    pub multiplicity: Option<OutputMultiplicity>,
}

/// Parse `Text`, `Text[]` or `domain.Text[3]`
pub fn parse_concept_with_multiplicity(value: &str) -> PipeflowResult<ConceptWithMultiplicity> {
    let caps = concept_multiplicity_re()
        .captures(value.trim())
        .ok_or_else(|| PipeflowError::InvalidConcept {
            value: value.to_string(),
            reason: "expected 'Concept', 'Concept[]' or 'Concept[N]'".into(),
        })?;

    let multiplicity = match caps.get(2).map(|m| m.as_str()) {
        None => None,
        Some("") => Some(OutputMultiplicity::Flag(true)),
        Some(digits) => {
            let count: u32 = digits.parse().map_err(|_| PipeflowError::InvalidConcept {
                value: value.to_string(),
                reason: "multiplicity is too large".into(),
            })?;
            if count == 0 {
                return Err(PipeflowError::InvalidConcept {
                    value: value.to_string(),
                    reason: "multiplicity must be at least 1".into(),
                });
            }
            Some(OutputMultiplicity::Count(count))
        }
    };

    Ok(ConceptWithMultiplicity {
        concept: caps[1].to_string(),
        multiplicity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use OutputMultiplicity::{Count, Flag};

    #[test]
    fn test_no_override_keeps_base() {
        for base in [None, Some(Flag(false)), Some(Flag(true)), Some(Count(4))] {
            assert_eq!(resolve_output_multiplicity(base, None).resolved, base);
        }
        let r = resolve_output_multiplicity(Some(Count(4)), None);
        assert!(r.is_multiple_enabled);
        assert_eq!(r.exact_count, Some(4));
    }

    #[test]
    fn test_false_override_forces_single() {
        let r = resolve_output_multiplicity(Some(Count(3)), Some(Flag(false)));
        assert_eq!(r.resolved, Some(Flag(false)));
        assert!(!r.is_multiple_enabled);
        assert_eq!(r.exact_count, None);
    }

    #[test]
    fn test_true_override_keeps_base_count() {
        let r = resolve_output_multiplicity(Some(Count(5)), Some(Flag(true)));
        assert_eq!(
            r,
            MultiplicityResolution {
                resolved: Some(Count(5)),
                is_multiple_enabled: true,
                exact_count: Some(5),
            }
        );

        let r = resolve_output_multiplicity(None, Some(Flag(true)));
        assert_eq!(r.resolved, Some(Flag(true)));
        assert!(r.is_multiple_enabled);
        assert_eq!(r.exact_count, None);
    }

    #[test]
    fn test_count_override_wins() {
        for base in [None, Some(Flag(false)), Some(Flag(true)), Some(Count(9))] {
            let r = resolve_output_multiplicity(base, Some(Count(2)));
            assert_eq!(r.resolved, Some(Count(2)));
            assert_eq!(r.exact_count, Some(2));
            assert!(r.is_multiple_enabled);
        }
    }

    #[test]
    fn test_parse_concept_with_multiplicity() {
        let plain = parse_concept_with_multiplicity("Text").unwrap();
        assert_eq!(plain.concept, "Text");
        assert_eq!(plain.multiplicity, None);

        let any = parse_concept_with_multiplicity("docs.Summary[]").unwrap();
        assert_eq!(any.concept, "docs.Summary");
        assert_eq!(any.multiplicity, Some(Flag(true)));

        let exact = parse_concept_with_multiplicity("Image[3]").unwrap();
        assert_eq!(exact.multiplicity, Some(Count(3)));

        assert!(parse_concept_with_multiplicity("Image[0]").is_err());
        assert!(parse_concept_with_multiplicity("Image[x]").is_err());
        assert!(parse_concept_with_multiplicity("a.b.C").is_err());
    }

    #[test]
    fn test_untagged_serde() {
        let flag: OutputMultiplicity = serde_json::from_str("true").unwrap();
        let count: OutputMultiplicity = serde_json::from_str("3").unwrap();
        assert_eq!(flag, Flag(true));
        assert_eq!(count, Count(3));
        assert_eq!(Count(3).to_string(), "[3]");
    }
}
