//! Genome representation, codec, and mutation engine.
//!
//! A genome is the construction program of a self-replicating organism: an
//! ordered, recursively nested sequence of cell descriptions. The format is
//! designed to be:
//! - Self-describing: nested sub-genomes are length-prefixed, so records
//!   can be walked without parsing their content
//! - Cursor-friendly: an executing constructor tracks its read position as
//!   a byte offset, and every mutation keeps that position consistent
//! - Mutation-friendly: nine operators with per-operator preservation
//!   guarantees, applicable at any nesting depth

pub mod cell;
pub mod codec;
pub mod genome;
pub mod mutation;

pub use cell::{CellFunction, CellFunctionKind, CellGene, ReplicatorGene};
pub use codec::{
    byte_offset_to_cell_index, cell_index_to_byte_offset, decode_genome, encode_genome,
    normalize_cursor, MAX_NESTING_DEPTH,
};
pub use genome::Genome;
pub use mutation::{MutationKind, Mutator};
