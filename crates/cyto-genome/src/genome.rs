//! Genome container and structural helpers.

use serde::{Deserialize, Serialize};

use crate::cell::{CellGene, ReplicatorGene};
use crate::codec;
use cyto_core::Result;

/// A complete genome: the ordered construction program for one organism.
///
/// Order is meaningful (it is the construction order). A genome is
/// tree-shaped: every non-marker constructor/injector cell owns a complete,
/// independently encodable sub-genome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub cells: Vec<CellGene>,
}

impl Genome {
    pub fn new() -> Self {
        Self { cells: Vec::new() }
    }

    pub fn from_cells(cells: Vec<CellGene>) -> Self {
        Self { cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn push(&mut self, cell: CellGene) {
        self.cells.push(cell);
    }

    /// Serialize with the genome codec.
    pub fn to_bytes(&self) -> Vec<u8> {
        codec::encode_genome(self)
    }

    /// Deserialize with the genome codec.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        codec::decode_genome(bytes)
    }

    /// Encoded length in bytes, without encoding.
    pub fn byte_len(&self) -> usize {
        self.cells.iter().map(codec::record_len).sum()
    }

    /// Byte offset at which the record of cell `index` starts; the encoded
    /// length for an out-of-range index (end sentinel).
    pub fn byte_offset_of(&self, index: usize) -> usize {
        self.cells
            .iter()
            .take(index)
            .map(codec::record_len)
            .sum()
    }

    /// Index of the cell whose record encloses `offset`; the cell count for
    /// an offset at or past the end.
    pub fn cell_index_at(&self, offset: usize) -> usize {
        let mut pos = 0;
        for (index, cell) in self.cells.iter().enumerate() {
            pos += codec::record_len(cell);
            if pos > offset {
                return index;
            }
        }
        self.cells.len()
    }

    /// Snap `offset` to the nearest valid record boundary: clamped to the
    /// encoded length, mid-record offsets moved back to the record start.
    pub fn snap_offset(&self, offset: usize) -> usize {
        if offset >= self.byte_len() {
            return self.byte_len();
        }
        self.byte_offset_of(self.cell_index_at(offset))
    }

    /// Set of colors used anywhere in the genome, sub-genomes included.
    pub fn color_set(&self) -> Vec<u8> {
        let mut colors = Vec::new();
        self.collect_colors(&mut colors);
        colors.sort_unstable();
        colors.dedup();
        colors
    }

    fn collect_colors(&self, out: &mut Vec<u8>) {
        for cell in &self.cells {
            out.push(cell.color);
            if let Some(sub) = cell.sub_genome() {
                sub.collect_colors(out);
            }
        }
    }

    /// Recursively inline every embedded sub-genome into a flat cell list
    /// for structural comparison. Cells owning a sub-genome are kept, with
    /// the sub-genome emptied and its cursor reset so only heritable
    /// structure takes part in the comparison.
    pub fn rollout(&self) -> Vec<CellGene> {
        let mut out = Vec::new();
        self.rollout_into(&mut out);
        out
    }

    fn rollout_into(&self, out: &mut Vec<CellGene>) {
        for cell in &self.cells {
            match cell.sub_genome() {
                Some(sub) => {
                    sub.rollout_into(out);
                    let mut clone = cell.clone();
                    if let Some(rep) = clone.function.replicator_mut() {
                        if let ReplicatorGene::Embedded {
                            genome, genome_pos, ..
                        } = rep
                        {
                            *genome = Genome::new();
                            *genome_pos = 0;
                        }
                    }
                    out.push(clone);
                }
                None => out.push(cell.clone()),
            }
        }
    }
}

impl From<Vec<CellGene>> for Genome {
    fn from(cells: Vec<CellGene>) -> Self {
        Self::from_cells(cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellFunction, CellFunctionKind, NeuronGene};

    fn two_level_genome() -> Genome {
        let sub = Genome::from_cells(vec![
            CellGene::new().with_color(4),
            CellGene::new()
                .with_color(5)
                .with_function(CellFunction::Neuron(NeuronGene::zeroed())),
        ]);
        Genome::from_cells(vec![
            CellGene::new().with_color(1),
            CellGene::new()
                .with_color(1)
                .with_function(CellFunction::Constructor(ReplicatorGene::embedded(sub))),
        ])
    }

    #[test]
    fn test_rollout_inlines_sub_genomes() {
        let genome = two_level_genome();
        let rollout = genome.rollout();

        assert_eq!(rollout.len(), 4);
        let constructors = rollout
            .iter()
            .filter(|cell| cell.function.kind() == CellFunctionKind::Constructor)
            .count();
        assert_eq!(constructors, 1);
        // the kept constructor no longer references its sub-genome
        for cell in &rollout {
            assert!(cell.sub_genome().map_or(true, Genome::is_empty));
        }
    }

    #[test]
    fn test_color_set_is_flattened() {
        assert_eq!(two_level_genome().color_set(), vec![1, 4, 5]);
    }

    #[test]
    fn test_byte_offsets_match_codec() {
        let genome = two_level_genome();
        let bytes = genome.to_bytes();

        assert_eq!(genome.byte_len(), bytes.len());
        for index in 0..=genome.len() {
            assert_eq!(
                genome.byte_offset_of(index),
                codec::cell_index_to_byte_offset(&bytes, index).unwrap()
            );
        }
    }

    #[test]
    fn test_description_serialization() {
        let genome = two_level_genome();
        let json = serde_json::to_string(&genome).unwrap();
        let deserialized: Genome = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, genome);
    }

    #[test]
    fn test_snap_offset() {
        let genome = two_level_genome();
        let first_len = codec::record_len(&genome.cells[0]);

        assert_eq!(genome.snap_offset(0), 0);
        assert_eq!(genome.snap_offset(first_len - 1), 0);
        assert_eq!(genome.snap_offset(first_len), first_len);
        assert_eq!(genome.snap_offset(genome.byte_len() + 10), genome.byte_len());
    }
}
