//! The per-parameter constraint language shared by every estimator and by the fit driver.

use serde::{Deserialize, Serialize};

/// A single parameter's restriction or relation to another parameter.
///
/// `c1`/`c2` carry payload whose meaning depends on `code` (see each variant).
/// `j` indices inside [`Constraint::Factor`], [`Constraint::Delta`] and
/// [`Constraint::Sum`] refer to a position in the **global** parameter list
/// (background parameters first); estimators that work peak-locally return
/// indices relative to their own block and must be rebased by the driver
/// when the blocks are merged (see [`crate::constraint::rebase`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    /// Unconstrained.
    Free,
    /// Value held `>= 0`.
    Positive,
    /// Value held in `[min, max]`.
    Quoted { min: f64, max: f64 },
    /// Value held fixed, not varied by the solver.
    Fixed,
    /// `p_i = ratio * p_j`.
    Factor { j: usize, ratio: f64 },
    /// `p_i = p_j - delta`.
    Delta { j: usize, delta: f64 },
    /// `p_i = sum - p_j`.
    Sum { j: usize, sum: f64 },
    /// Not part of the model; excluded from both the solver and the result.
    Ignore,
}

impl Constraint {
    /// Numeric code matching the source engine's `{FREE=0 .. IGNORE=7}` table.
    pub fn code(&self) -> u8 {
        match self {
            Constraint::Free => 0,
            Constraint::Positive => 1,
            Constraint::Quoted { .. } => 2,
            Constraint::Fixed => 3,
            Constraint::Factor { .. } => 4,
            Constraint::Delta { .. } => 5,
            Constraint::Sum { .. } => 6,
            Constraint::Ignore => 7,
        }
    }

    /// True for the three relations that reference another parameter by
    /// global index and therefore need rebasing when blocks are merged.
    pub fn references_index(&self) -> Option<usize> {
        match *self {
            Constraint::Factor { j, .. } | Constraint::Delta { j, .. } | Constraint::Sum { j, .. } => Some(j),
            _ => None,
        }
    }

    /// Returns a copy of this constraint with any referenced index shifted by `offset`.
    #[must_use]
    pub fn rebased(self, offset: usize) -> Self {
        match self {
            Constraint::Factor { j, ratio } => Constraint::Factor { j: j + offset, ratio },
            Constraint::Delta { j, delta } => Constraint::Delta { j: j + offset, delta },
            Constraint::Sum { j, sum } => Constraint::Sum { j: j + offset, sum },
            other => other,
        }
    }
}

/// Rebase every `Factor`/`Delta`/`Sum` constraint in `constraints` by `offset`,
/// used when merging a peak-local block after the background block.
pub fn rebase(constraints: &mut [Constraint], offset: usize) {
    for c in constraints.iter_mut() {
        *c = c.rebased(offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_the_documented_table() {
        assert_eq!(Constraint::Free.code(), 0);
        assert_eq!(Constraint::Positive.code(), 1);
        assert_eq!(Constraint::Quoted { min: 0.0, max: 1.0 }.code(), 2);
        assert_eq!(Constraint::Fixed.code(), 3);
        assert_eq!(Constraint::Factor { j: 0, ratio: 1.0 }.code(), 4);
        assert_eq!(Constraint::Delta { j: 0, delta: 0.0 }.code(), 5);
        assert_eq!(Constraint::Sum { j: 0, sum: 0.0 }.code(), 6);
        assert_eq!(Constraint::Ignore.code(), 7);
    }

    #[test]
    fn rebase_only_touches_referencing_variants() {
        let mut cons = vec![
            Constraint::Free,
            Constraint::Factor { j: 2, ratio: 1.0 },
            Constraint::Delta { j: 1, delta: 0.5 },
            Constraint::Sum { j: 0, sum: 3.0 },
            Constraint::Positive,
        ];
        rebase(&mut cons, 4);
        assert_eq!(cons[0], Constraint::Free);
        assert_eq!(cons[1], Constraint::Factor { j: 6, ratio: 1.0 });
        assert_eq!(cons[2], Constraint::Delta { j: 5, delta: 0.5 });
        assert_eq!(cons[3], Constraint::Sum { j: 4, sum: 3.0 });
        assert_eq!(cons[4], Constraint::Positive);
    }
}
