//! Mutation operators over encoded genomes.
//!
//! Each call applies exactly one mutation of a requested kind to a genome
//! buffer and returns the replacement buffer together with an adjusted
//! construction cursor. Operators work on the decoded tree and may target
//! cells at any nesting depth; the cursor bookkeeping keeps the top-level
//! cursor and every nested sub-genome cursor on a record boundary across
//! length-changing edits.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use cyto_core::{MutationParameters, Result, MAX_COLORS};

use crate::cell::{
    AttackerGene, CellFunction, CellFunctionKind, CellGene, DefenderGene, MuscleGene, NerveGene,
    NeuronGene, ReplicatorGene, SensorGene, TransmitterGene, MAX_REQUIRED_CONNECTIONS,
    NEURON_DATA_LEN, NUM_CONSTRUCTION_MODES, NUM_EXECUTION_SLOTS,
};
use crate::codec;
use crate::genome::Genome;

/// The kinds of mutation the engine can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    Properties,
    NeuronData,
    Structure,
    CellFunction,
    Insertion,
    Deletion,
    Duplication,
    Translation,
    Color,
}

impl MutationKind {
    pub const ALL: [MutationKind; 9] = [
        MutationKind::Properties,
        MutationKind::NeuronData,
        MutationKind::Structure,
        MutationKind::CellFunction,
        MutationKind::Insertion,
        MutationKind::Deletion,
        MutationKind::Duplication,
        MutationKind::Translation,
        MutationKind::Color,
    ];
}

/// Stateless mutation engine, parameterized by the simulation's mutation
/// settings.
pub struct Mutator {
    params: MutationParameters,
}

impl Mutator {
    pub fn new(params: MutationParameters) -> Self {
        Self { params }
    }

    /// Apply one mutation of `kind` to the encoded `genome`.
    ///
    /// `cursor` is the byte offset the executing constructor has read up
    /// to; `host_color` is the color of the cell owning the genome, used
    /// only when inserting into a genome that has no cells yet. An
    /// operator that finds no eligible target returns the input unchanged.
    pub fn mutate(
        &self,
        kind: MutationKind,
        genome: &[u8],
        cursor: usize,
        host_color: u8,
        rng: &mut ChaCha8Rng,
    ) -> Result<(Vec<u8>, usize)> {
        let mut tree = codec::decode_genome(genome)?;
        trace!(?kind, cells = tree.len(), "applying mutation");

        let new_cursor = match kind {
            MutationKind::Properties => {
                self.mutate_properties(&mut tree, rng);
                cursor
            }
            MutationKind::NeuronData => {
                self.mutate_neuron_data(&mut tree, rng);
                cursor
            }
            MutationKind::Structure => {
                self.mutate_structure(&mut tree, rng);
                cursor
            }
            MutationKind::Color => {
                self.mutate_color(&mut tree, rng);
                cursor
            }
            MutationKind::CellFunction => {
                let cursor = codec::normalize_cursor(genome, cursor)?;
                self.mutate_cell_function(&mut tree, cursor, rng)
            }
            MutationKind::Insertion => {
                let cursor = codec::normalize_cursor(genome, cursor)?;
                self.insert_cell(&mut tree, cursor, host_color, rng)
            }
            MutationKind::Deletion => {
                let cursor = codec::normalize_cursor(genome, cursor)?;
                self.delete_cell(&mut tree, cursor, rng)
            }
            MutationKind::Duplication => {
                let cursor = codec::normalize_cursor(genome, cursor)?;
                self.duplicate_cells(&mut tree, cursor, rng)
            }
            MutationKind::Translation => {
                let cursor = codec::normalize_cursor(genome, cursor)?;
                self.translate_cells(&mut tree, cursor, rng)
            }
        };

        Ok((codec::encode_genome(&tree), new_cursor))
    }

    /// Randomize one non-structural scalar of one cell: energy, a
    /// scheduling field, the output-blocked flag, or a function-local
    /// parameter. Record lengths never change.
    fn mutate_properties(&self, tree: &mut Genome, rng: &mut ChaCha8Rng) {
        let Some((path, index)) = choose(&collect_cell_paths(tree), rng) else {
            return;
        };
        let cell = &mut node_mut(tree, &path).cells[index];
        match rng.gen_range(0..5) {
            0 => cell.energy = random_energy(rng),
            1 => cell.execution_order = rng.gen_range(0..NUM_EXECUTION_SLOTS),
            2 => cell.input_execution_order = rng.gen_range(0..NUM_EXECUTION_SLOTS),
            3 => cell.output_blocked = !cell.output_blocked,
            _ => mutate_function_scalar(cell, rng),
        }
    }

    /// Overwrite one byte of one neuron's weight/bias block.
    fn mutate_neuron_data(&self, tree: &mut Genome, rng: &mut ChaCha8Rng) {
        let mut neurons = Vec::new();
        for (path, index) in collect_cell_paths(tree) {
            if node(tree, &path).cells[index].function.kind() == CellFunctionKind::Neuron {
                neurons.push((path, index));
            }
        }
        let Some((path, index)) = choose(&neurons, rng) else {
            debug!("genome has no neuron cells");
            return;
        };
        if let CellFunction::Neuron(neuron) = &mut node_mut(tree, &path).cells[index].function {
            if !neuron.data.is_empty() {
                let byte = rng.gen_range(0..neuron.data.len());
                neuron.data[byte] = rng.gen();
            }
        }
    }

    /// Randomize the branching angle and/or required connection count of
    /// one cell.
    fn mutate_structure(&self, tree: &mut Genome, rng: &mut ChaCha8Rng) {
        let Some((path, index)) = choose(&collect_cell_paths(tree), rng) else {
            return;
        };
        let cell = &mut node_mut(tree, &path).cells[index];
        match rng.gen_range(0..3) {
            0 => cell.reference_angle = random_angle(rng),
            1 => cell.num_required_connections = rng.gen_range(0..=MAX_REQUIRED_CONNECTIONS),
            _ => {
                cell.reference_angle = random_angle(rng);
                cell.num_required_connections = rng.gen_range(0..=MAX_REQUIRED_CONNECTIONS);
            }
        }
    }

    /// Replace one cell's function with a different randomly chosen type.
    /// The record length may change; the cursor keeps addressing the same
    /// logical cell.
    fn mutate_cell_function(
        &self,
        tree: &mut Genome,
        cursor: usize,
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let mut eligible = Vec::new();
        for (path, index) in collect_cell_paths(tree) {
            let cell = &node(tree, &path).cells[index];
            if self.params.preserve_self_replicators && cell.is_self_copy() {
                continue;
            }
            eligible.push((path, index));
        }
        let Some((path, index)) = choose(&eligible, rng) else {
            debug!("no cell eligible for a function change");
            return cursor;
        };

        let target = node_mut(tree, &path);
        let at = target.byte_offset_of(index) + codec::HEADER_LEN;
        let cell = &mut target.cells[index];
        let old_kind = cell.function.kind();
        let old_len = codec::payload_len(&cell.function);
        let new_kind = random_kind_excluding(old_kind, rng);
        cell.function = random_function(new_kind, rng);
        let new_len = codec::payload_len(&cell.function);

        let cursor = propagate_shift(tree, cursor, &path, at, Shift::Shrunk, old_len);
        propagate_shift(tree, cursor, &path, at, Shift::Grown, new_len)
    }

    /// Insert one new cell at a random boundary at a random depth. Its
    /// color is drawn from the colors already present in the genome.
    fn insert_cell(
        &self,
        tree: &mut Genome,
        cursor: usize,
        host_color: u8,
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let colors = tree.color_set();
        let color = choose(&colors, rng).unwrap_or(host_color);
        let cell = random_cell(color, rng);
        let len = codec::record_len(&cell);
        if tree.byte_len() + len > self.params.max_genome_bytes {
            debug!(limit = self.params.max_genome_bytes, "genome is full");
            return cursor;
        }

        let paths = collect_node_paths(tree);
        let path = paths[rng.gen_range(0..paths.len())].clone();
        normalize_node_cursor(tree, &path);
        let target = node_mut(tree, &path);
        let index = rng.gen_range(0..=target.len());
        let at = target.byte_offset_of(index);
        target.cells.insert(index, cell);

        propagate_shift(tree, cursor, &path, at, Shift::Grown, len)
    }

    /// Delete one cell at a random depth. With
    /// `preserve_self_replicators` set, constructor/injector cells are
    /// exempt, so repeated deletion converges to a replicator skeleton
    /// instead of an empty buffer.
    fn delete_cell(&self, tree: &mut Genome, cursor: usize, rng: &mut ChaCha8Rng) -> usize {
        let mut eligible = Vec::new();
        for (path, index) in collect_cell_paths(tree) {
            if self.params.preserve_self_replicators && node(tree, &path).cells[index].is_replicator()
            {
                continue;
            }
            eligible.push((path, index));
        }
        let Some((path, index)) = choose(&eligible, rng) else {
            debug!("no cell eligible for deletion");
            return cursor;
        };

        normalize_node_cursor(tree, &path);
        let target = node_mut(tree, &path);
        let at = target.byte_offset_of(index);
        let removed = codec::record_len(&target.cells[index]);
        target.cells.remove(index);

        propagate_shift(tree, cursor, &path, at, Shift::Shrunk, removed)
    }

    /// Insert a copy of a contiguous run of cells immediately after
    /// itself.
    fn duplicate_cells(&self, tree: &mut Genome, cursor: usize, rng: &mut ChaCha8Rng) -> usize {
        let mut candidates = Vec::new();
        for path in collect_node_paths(tree) {
            if !node(tree, &path).is_empty() {
                candidates.push(path);
            }
        }
        let Some(path) = choose(&candidates, rng) else {
            debug!("nothing to duplicate");
            return cursor;
        };

        let target = node(tree, &path);
        let start = rng.gen_range(0..target.len());
        let end = rng.gen_range(start..target.len()) + 1;
        let copy: Vec<CellGene> = target.cells[start..end].to_vec();
        let len: usize = copy.iter().map(codec::record_len).sum();
        if tree.byte_len() + len > self.params.max_genome_bytes {
            debug!(limit = self.params.max_genome_bytes, "genome is full");
            return cursor;
        }

        normalize_node_cursor(tree, &path);
        let target = node_mut(tree, &path);
        let at = target.byte_offset_of(end);
        target.cells.splice(end..end, copy);

        propagate_shift(tree, cursor, &path, at, Shift::Grown, len)
    }

    /// Move a contiguous run of cells to a random boundary in any node of
    /// the tree, possibly across nesting levels. The flattened cell
    /// multiset is unchanged.
    fn translate_cells(&self, tree: &mut Genome, cursor: usize, rng: &mut ChaCha8Rng) -> usize {
        let mut candidates = Vec::new();
        for path in collect_node_paths(tree) {
            if !node(tree, &path).is_empty() {
                candidates.push(path);
            }
        }
        let Some(src_path) = choose(&candidates, rng) else {
            debug!("nothing to translate");
            return cursor;
        };

        normalize_node_cursor(tree, &src_path);
        let source = node_mut(tree, &src_path);
        let start = rng.gen_range(0..source.len());
        let end = rng.gen_range(start..source.len()) + 1;
        let at_removed = source.byte_offset_of(start);
        let block: Vec<CellGene> = source.cells.drain(start..end).collect();
        let len: usize = block.iter().map(codec::record_len).sum();
        let cursor = propagate_shift(tree, cursor, &src_path, at_removed, Shift::Shrunk, len);

        // A destination deep in the tree could push the block's own nested
        // genomes past the decode depth limit; restrict to levels that
        // keep the result decodable. The root always qualifies.
        let block_depth = block.iter().map(cell_depth).max().unwrap_or(0);
        let mut destinations = Vec::new();
        for path in collect_node_paths(tree) {
            if path.len() + block_depth <= codec::MAX_NESTING_DEPTH {
                destinations.push(path);
            }
        }
        let dest_path = destinations[rng.gen_range(0..destinations.len())].clone();

        normalize_node_cursor(tree, &dest_path);
        let target = node_mut(tree, &dest_path);
        let index = rng.gen_range(0..=target.len());
        let at_inserted = target.byte_offset_of(index);
        target.cells.splice(index..index, block);

        propagate_shift(tree, cursor, &dest_path, at_inserted, Shift::Grown, len)
    }

    /// Recolor one cell, constrained by the color transition matrix.
    fn mutate_color(&self, tree: &mut Genome, rng: &mut ChaCha8Rng) {
        let transitions = &self.params.color_transitions;
        let mut eligible = Vec::new();
        for (path, index) in collect_cell_paths(tree) {
            let color = node(tree, &path).cells[index].color;
            let mut targets = transitions.targets(color);
            if targets.len() > 1 {
                targets.retain(|&to| to != color);
            }
            if !targets.is_empty() {
                eligible.push((path, index, targets));
            }
        }
        let Some((path, index, targets)) = choose(&eligible, rng) else {
            debug!("no permitted color transition");
            return;
        };
        node_mut(tree, &path).cells[index].color = targets[rng.gen_range(0..targets.len())];
    }
}

/// Path to a genome node: the cell indices of the replicator cells
/// descended through. The empty path is the top-level genome.
type NodePath = Vec<usize>;

fn collect_node_paths(genome: &Genome) -> Vec<NodePath> {
    let mut paths = vec![NodePath::new()];
    let mut prefix = NodePath::new();
    collect_node_paths_into(genome, &mut prefix, &mut paths);
    paths
}

fn collect_node_paths_into(genome: &Genome, prefix: &mut NodePath, paths: &mut Vec<NodePath>) {
    for (index, cell) in genome.cells.iter().enumerate() {
        if let Some(sub) = cell.sub_genome() {
            prefix.push(index);
            paths.push(prefix.clone());
            collect_node_paths_into(sub, prefix, paths);
            prefix.pop();
        }
    }
}

fn collect_cell_paths(genome: &Genome) -> Vec<(NodePath, usize)> {
    let mut cells = Vec::new();
    let mut prefix = NodePath::new();
    collect_cell_paths_into(genome, &mut prefix, &mut cells);
    cells
}

fn collect_cell_paths_into(
    genome: &Genome,
    prefix: &mut NodePath,
    out: &mut Vec<(NodePath, usize)>,
) {
    for (index, cell) in genome.cells.iter().enumerate() {
        out.push((prefix.clone(), index));
        if let Some(sub) = cell.sub_genome() {
            prefix.push(index);
            collect_cell_paths_into(sub, prefix, out);
            prefix.pop();
        }
    }
}

fn node<'a>(root: &'a Genome, path: &[usize]) -> &'a Genome {
    let mut genome = root;
    for &index in path {
        genome = genome.cells[index]
            .sub_genome()
            .expect("node paths descend through embedded genomes");
    }
    genome
}

fn node_mut<'a>(root: &'a mut Genome, path: &[usize]) -> &'a mut Genome {
    let mut genome = root;
    for &index in path {
        genome = genome.cells[index]
            .sub_genome_mut()
            .expect("node paths descend through embedded genomes");
    }
    genome
}

/// Maximum nesting depth below a cell (0 for cells without a sub-genome).
fn cell_depth(cell: &CellGene) -> usize {
    match cell.sub_genome() {
        Some(sub) => 1 + sub.cells.iter().map(cell_depth).max().unwrap_or(0),
        None => 0,
    }
}

fn choose<T: Clone>(items: &[T], rng: &mut ChaCha8Rng) -> Option<T> {
    if items.is_empty() {
        None
    } else {
        Some(items[rng.gen_range(0..items.len())].clone())
    }
}

#[derive(Clone, Copy)]
enum Shift {
    Grown,
    Shrunk,
}

fn shift_for_growth(cursor: usize, at: usize, by: usize) -> usize {
    if cursor > at {
        cursor + by
    } else {
        cursor
    }
}

fn shift_for_shrink(cursor: usize, at: usize, by: usize) -> usize {
    if cursor >= at + by {
        cursor - by
    } else if cursor > at {
        at
    } else {
        cursor
    }
}

/// Propagate a byte-length change inside the node at `path` to that node's
/// stored cursor, every enclosing sub-genome cursor, and the top-level
/// cursor (returned).
///
/// `local_at` is the change position within the edited node. Enclosing
/// levels use an interior position of the record containing the change;
/// valid cursors sit on record boundaries and can never fall strictly
/// inside it, so the comparison is exact for them.
fn propagate_shift(
    tree: &mut Genome,
    cursor: usize,
    path: &[usize],
    local_at: usize,
    shift: Shift,
    len: usize,
) -> usize {
    for level in (1..=path.len()).rev() {
        let at = if level == path.len() {
            local_at
        } else {
            node(tree, &path[..level]).byte_offset_of(path[level]) + 1
        };
        let parent = node_mut(tree, &path[..level - 1]);
        let cell = &mut parent.cells[path[level - 1]];
        if let Some(ReplicatorGene::Embedded {
            genome, genome_pos, ..
        }) = cell.function.replicator_mut()
        {
            let shifted = match shift {
                Shift::Grown => shift_for_growth(*genome_pos, at, len),
                Shift::Shrunk => shift_for_shrink(*genome_pos, at, len),
            };
            *genome_pos = shifted.min(genome.byte_len());
        }
    }

    let top_at = if path.is_empty() {
        local_at
    } else {
        tree.byte_offset_of(path[0]) + 1
    };
    let shifted = match shift {
        Shift::Grown => shift_for_growth(cursor, top_at, len),
        Shift::Shrunk => shift_for_shrink(cursor, top_at, len),
    };
    shifted.min(tree.byte_len())
}

/// Snap the stored cursor of the node at `path` to a record boundary
/// before a structural edit.
fn normalize_node_cursor(tree: &mut Genome, path: &[usize]) {
    let Some((&last, parent_path)) = path.split_last() else {
        return;
    };
    let parent = node_mut(tree, parent_path);
    if let Some(ReplicatorGene::Embedded {
        genome, genome_pos, ..
    }) = parent.cells[last].function.replicator_mut()
    {
        *genome_pos = genome.snap_offset(*genome_pos);
    }
}

fn random_energy(rng: &mut ChaCha8Rng) -> f32 {
    rng.gen_range(36.0..320.0)
}

fn random_angle(rng: &mut ChaCha8Rng) -> f32 {
    rng.gen_range(-180.0..180.0)
}

fn random_neuron(rng: &mut ChaCha8Rng) -> NeuronGene {
    let mut data = vec![0u8; NEURON_DATA_LEN];
    rng.fill(data.as_mut_slice());
    NeuronGene::with_data(data)
}

fn random_kind_excluding(kind: CellFunctionKind, rng: &mut ChaCha8Rng) -> CellFunctionKind {
    let options: Vec<CellFunctionKind> = CellFunctionKind::ALL
        .into_iter()
        .filter(|option| *option != kind)
        .collect();
    options[rng.gen_range(0..options.len())]
}

/// Fresh random payload for a function type. Replicators are generated as
/// self-replication markers; the engine never invents sub-genome content.
fn random_function(kind: CellFunctionKind, rng: &mut ChaCha8Rng) -> CellFunction {
    match kind {
        CellFunctionKind::None => CellFunction::None,
        CellFunctionKind::Neuron => CellFunction::Neuron(random_neuron(rng)),
        CellFunctionKind::Transmitter => CellFunction::Transmitter(TransmitterGene {
            mode: rng.gen_range(0..4),
        }),
        CellFunctionKind::Sensor => CellFunction::Sensor(SensorGene {
            min_density: rng.gen(),
            scan_color: rng.gen_range(0..MAX_COLORS as u8),
        }),
        CellFunctionKind::Nerve => CellFunction::Nerve(NerveGene {
            pulse_mode: rng.gen_range(0..16),
            alternation_mode: rng.gen_range(0..2),
        }),
        CellFunctionKind::Attacker => CellFunction::Attacker(AttackerGene {
            mode: rng.gen_range(0..4),
        }),
        CellFunctionKind::Muscle => CellFunction::Muscle(MuscleGene {
            mode: rng.gen_range(0..4),
        }),
        CellFunctionKind::Defender => CellFunction::Defender(DefenderGene {
            mode: rng.gen_range(0..4),
        }),
        CellFunctionKind::Placeholder => CellFunction::Placeholder,
        CellFunctionKind::Constructor => CellFunction::Constructor(ReplicatorGene::MakeGenomeCopy),
        CellFunctionKind::Injector => CellFunction::Injector(ReplicatorGene::MakeGenomeCopy),
    }
}

fn random_cell(color: u8, rng: &mut ChaCha8Rng) -> CellGene {
    let kind = CellFunctionKind::ALL[rng.gen_range(0..CellFunctionKind::ALL.len())];
    CellGene::new()
        .with_color(color)
        .with_reference_angle(random_angle(rng))
        .with_num_required_connections(rng.gen_range(0..=MAX_REQUIRED_CONNECTIONS))
        .with_execution_order(rng.gen_range(0..NUM_EXECUTION_SLOTS))
        .with_input_execution_order(rng.gen_range(0..NUM_EXECUTION_SLOTS))
        .with_energy(random_energy(rng))
        .with_function(random_function(kind, rng))
}

/// Randomize a function-local scalar; cells whose function carries none
/// fall back to an energy change.
fn mutate_function_scalar(cell: &mut CellGene, rng: &mut ChaCha8Rng) {
    let mutated = match &mut cell.function {
        CellFunction::Transmitter(gene) => {
            gene.mode = rng.gen_range(0..4);
            true
        }
        CellFunction::Sensor(gene) => {
            if rng.gen::<bool>() {
                gene.min_density = rng.gen();
            } else {
                gene.scan_color = rng.gen_range(0..MAX_COLORS as u8);
            }
            true
        }
        CellFunction::Nerve(gene) => {
            gene.pulse_mode = rng.gen_range(0..16);
            gene.alternation_mode = rng.gen_range(0..2);
            true
        }
        CellFunction::Attacker(gene) => {
            gene.mode = rng.gen_range(0..4);
            true
        }
        CellFunction::Muscle(gene) => {
            gene.mode = rng.gen_range(0..4);
            true
        }
        CellFunction::Defender(gene) => {
            gene.mode = rng.gen_range(0..4);
            true
        }
        CellFunction::Constructor(rep) | CellFunction::Injector(rep) => match rep {
            ReplicatorGene::Embedded { mode, .. } => {
                *mode = rng.gen_range(0..NUM_CONSTRUCTION_MODES);
                true
            }
            ReplicatorGene::MakeGenomeCopy => false,
        },
        CellFunction::None | CellFunction::Placeholder | CellFunction::Neuron(_) => false,
    };
    if !mutated {
        cell.energy = random_energy(rng);
    }
}
