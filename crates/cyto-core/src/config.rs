//! Simulation parameters consumed by the mutation engine.

use serde::{Deserialize, Serialize};

/// Number of entries in the fixed cell color palette.
pub const MAX_COLORS: usize = 7;

/// Boolean adjacency matrix over the color palette.
///
/// `allows(from, to)` gates the Color mutation: a cell colored `from` may
/// only be recolored to `to` if the entry is set. The matrix is supplied
/// whole by the simulation parameters; the engine never infers entries.
/// Lookups outside the palette answer `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorTransitions(pub [[bool; MAX_COLORS]; MAX_COLORS]);

impl ColorTransitions {
    /// Matrix with every transition permitted.
    pub fn complete() -> Self {
        Self([[true; MAX_COLORS]; MAX_COLORS])
    }

    /// Matrix with no transition permitted.
    pub fn none() -> Self {
        Self([[false; MAX_COLORS]; MAX_COLORS])
    }

    pub fn allow(&mut self, from: u8, to: u8) -> &mut Self {
        self.0[from as usize][to as usize] = true;
        self
    }

    pub fn allows(&self, from: u8, to: u8) -> bool {
        self.0
            .get(from as usize)
            .and_then(|row| row.get(to as usize))
            .copied()
            .unwrap_or(false)
    }

    /// Colors reachable from `from` in a single transition.
    pub fn targets(&self, from: u8) -> Vec<u8> {
        (0..MAX_COLORS as u8)
            .filter(|&to| self.allows(from, to))
            .collect()
    }
}

impl Default for ColorTransitions {
    fn default() -> Self {
        Self::complete()
    }
}

/// Knobs the mutation engine consults.
///
/// Owned by the simulation parameters and passed whole into every engine
/// call; the engine keeps no state of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationParameters {
    /// Permitted color transitions for the Color mutation.
    pub color_transitions: ColorTransitions,
    /// When set, Deletion and CellFunction mutations leave constructor and
    /// injector cells untouched, so a lineage cannot mutate away its
    /// ability to reproduce.
    pub preserve_self_replicators: bool,
    /// Growth operators (Insertion, Duplication) become no-ops once the
    /// encoded genome would exceed this many bytes.
    pub max_genome_bytes: usize,
}

impl Default for MutationParameters {
    fn default() -> Self {
        Self {
            color_transitions: ColorTransitions::default(),
            preserve_self_replicators: true,
            max_genome_bytes: 8192,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_transitions_are_complete() {
        let transitions = ColorTransitions::default();
        for from in 0..MAX_COLORS as u8 {
            assert_eq!(transitions.targets(from).len(), MAX_COLORS);
        }
    }

    #[test]
    fn test_restricted_transitions() {
        let mut transitions = ColorTransitions::none();
        transitions.allow(0, 3).allow(0, 5);

        assert!(transitions.allows(0, 3));
        assert!(!transitions.allows(3, 0));
        assert_eq!(transitions.targets(0), vec![3, 5]);
        assert!(transitions.targets(1).is_empty());
    }

    #[test]
    fn test_out_of_palette_lookups_are_denied() {
        let transitions = ColorTransitions::complete();
        assert!(!transitions.allows(7, 0));
        assert!(!transitions.allows(0, 200));
        assert!(transitions.targets(200).is_empty());
    }

    #[test]
    fn test_parameters_serialization() {
        let params = MutationParameters::default();
        let json = serde_json::to_string(&params).unwrap();
        let deserialized: MutationParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(params, deserialized);
    }
}
