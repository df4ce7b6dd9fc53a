//! Cell-level building blocks of a genome.

use serde::{Deserialize, Serialize};

use crate::genome::Genome;

/// Size of a neuron's opaque weight/bias block in bytes
/// (8x8 weight matrix plus one bias row, one byte each).
pub const NEURON_DATA_LEN: usize = 72;

/// Number of execution order slots per cluster.
pub const NUM_EXECUTION_SLOTS: u8 = 6;

/// Upper bound for `num_required_connections`.
pub const MAX_REQUIRED_CONNECTIONS: u8 = 6;

/// Number of construction modes a constructor/injector can run in.
pub const NUM_CONSTRUCTION_MODES: u8 = 100;

/// Discriminant of a cell function, independent of its payload.
///
/// The set is closed; the codec and every mutation operator match on it
/// exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellFunctionKind {
    None,
    Neuron,
    Transmitter,
    Sensor,
    Nerve,
    Attacker,
    Muscle,
    Defender,
    Placeholder,
    Constructor,
    Injector,
}

impl CellFunctionKind {
    pub const ALL: [CellFunctionKind; 11] = [
        CellFunctionKind::None,
        CellFunctionKind::Neuron,
        CellFunctionKind::Transmitter,
        CellFunctionKind::Sensor,
        CellFunctionKind::Nerve,
        CellFunctionKind::Attacker,
        CellFunctionKind::Muscle,
        CellFunctionKind::Defender,
        CellFunctionKind::Placeholder,
        CellFunctionKind::Constructor,
        CellFunctionKind::Injector,
    ];

    /// Wire tag used by the codec.
    pub fn tag(self) -> u8 {
        match self {
            CellFunctionKind::None => 0,
            CellFunctionKind::Neuron => 1,
            CellFunctionKind::Transmitter => 2,
            CellFunctionKind::Sensor => 3,
            CellFunctionKind::Nerve => 4,
            CellFunctionKind::Attacker => 5,
            CellFunctionKind::Muscle => 6,
            CellFunctionKind::Defender => 7,
            CellFunctionKind::Placeholder => 8,
            CellFunctionKind::Constructor => 9,
            CellFunctionKind::Injector => 10,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Constructor and Injector cells can carry a nested genome.
    pub fn is_replicator(self) -> bool {
        matches!(self, CellFunctionKind::Constructor | CellFunctionKind::Injector)
    }
}

/// Opaque neuron weight/bias block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeuronGene {
    pub data: Vec<u8>,
}

impl NeuronGene {
    pub fn zeroed() -> Self {
        Self {
            data: vec![0; NEURON_DATA_LEN],
        }
    }

    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl Default for NeuronGene {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmitterGene {
    pub mode: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorGene {
    pub min_density: f32,
    pub scan_color: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NerveGene {
    pub pulse_mode: u8,
    pub alternation_mode: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackerGene {
    pub mode: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuscleGene {
    pub mode: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefenderGene {
    pub mode: u8,
}

/// State of a constructor or injector cell.
///
/// Either the cell replicates the genome that contains it, or it carries a
/// complete nested genome of its own together with the construction mode
/// and the byte cursor marking how far construction has read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplicatorGene {
    /// Construct a copy of the enclosing genome itself.
    MakeGenomeCopy,
    Embedded {
        genome: Genome,
        mode: u8,
        genome_pos: usize,
    },
}

impl ReplicatorGene {
    /// Embed `genome` with mode 0 and the cursor at the start.
    pub fn embedded(genome: Genome) -> Self {
        ReplicatorGene::Embedded {
            genome,
            mode: 0,
            genome_pos: 0,
        }
    }

    pub fn with_mode(self, mode: u8) -> Self {
        match self {
            ReplicatorGene::MakeGenomeCopy => ReplicatorGene::MakeGenomeCopy,
            ReplicatorGene::Embedded {
                genome, genome_pos, ..
            } => ReplicatorGene::Embedded {
                genome,
                mode,
                genome_pos,
            },
        }
    }

    pub fn is_make_copy(&self) -> bool {
        matches!(self, ReplicatorGene::MakeGenomeCopy)
    }

    pub fn sub_genome(&self) -> Option<&Genome> {
        match self {
            ReplicatorGene::MakeGenomeCopy => None,
            ReplicatorGene::Embedded { genome, .. } => Some(genome),
        }
    }

    pub fn sub_genome_mut(&mut self) -> Option<&mut Genome> {
        match self {
            ReplicatorGene::MakeGenomeCopy => None,
            ReplicatorGene::Embedded { genome, .. } => Some(genome),
        }
    }
}

/// Function variant of a cell, including its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellFunction {
    None,
    Neuron(NeuronGene),
    Transmitter(TransmitterGene),
    Sensor(SensorGene),
    Nerve(NerveGene),
    Attacker(AttackerGene),
    Muscle(MuscleGene),
    Defender(DefenderGene),
    Placeholder,
    Constructor(ReplicatorGene),
    Injector(ReplicatorGene),
}

impl CellFunction {
    pub fn kind(&self) -> CellFunctionKind {
        match self {
            CellFunction::None => CellFunctionKind::None,
            CellFunction::Neuron(_) => CellFunctionKind::Neuron,
            CellFunction::Transmitter(_) => CellFunctionKind::Transmitter,
            CellFunction::Sensor(_) => CellFunctionKind::Sensor,
            CellFunction::Nerve(_) => CellFunctionKind::Nerve,
            CellFunction::Attacker(_) => CellFunctionKind::Attacker,
            CellFunction::Muscle(_) => CellFunctionKind::Muscle,
            CellFunction::Defender(_) => CellFunctionKind::Defender,
            CellFunction::Placeholder => CellFunctionKind::Placeholder,
            CellFunction::Constructor(_) => CellFunctionKind::Constructor,
            CellFunction::Injector(_) => CellFunctionKind::Injector,
        }
    }

    pub fn replicator(&self) -> Option<&ReplicatorGene> {
        match self {
            CellFunction::Constructor(rep) | CellFunction::Injector(rep) => Some(rep),
            _ => None,
        }
    }

    pub fn replicator_mut(&mut self) -> Option<&mut ReplicatorGene> {
        match self {
            CellFunction::Constructor(rep) | CellFunction::Injector(rep) => Some(rep),
            _ => None,
        }
    }
}

/// One node of a genome: the description an executing constructor reads to
/// build a single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellGene {
    pub color: u8,
    pub reference_angle: f32,
    pub num_required_connections: u8,
    pub execution_order: u8,
    pub input_execution_order: u8,
    pub output_blocked: bool,
    pub energy: f32,
    pub function: CellFunction,
}

impl CellGene {
    pub fn new() -> Self {
        Self {
            color: 0,
            reference_angle: 0.0,
            num_required_connections: 0,
            execution_order: 0,
            input_execution_order: 0,
            output_blocked: false,
            energy: 100.0,
            function: CellFunction::None,
        }
    }

    pub fn with_color(mut self, color: u8) -> Self {
        self.color = color;
        self
    }

    pub fn with_reference_angle(mut self, angle: f32) -> Self {
        self.reference_angle = angle;
        self
    }

    pub fn with_num_required_connections(mut self, count: u8) -> Self {
        self.num_required_connections = count;
        self
    }

    pub fn with_execution_order(mut self, order: u8) -> Self {
        self.execution_order = order;
        self
    }

    pub fn with_input_execution_order(mut self, order: u8) -> Self {
        self.input_execution_order = order;
        self
    }

    pub fn with_output_blocked(mut self, blocked: bool) -> Self {
        self.output_blocked = blocked;
        self
    }

    pub fn with_energy(mut self, energy: f32) -> Self {
        self.energy = energy;
        self
    }

    pub fn with_function(mut self, function: CellFunction) -> Self {
        self.function = function;
        self
    }

    /// Nested genome of a non-marker constructor/injector cell.
    pub fn sub_genome(&self) -> Option<&Genome> {
        self.function.replicator().and_then(ReplicatorGene::sub_genome)
    }

    pub fn sub_genome_mut(&mut self) -> Option<&mut Genome> {
        self.function
            .replicator_mut()
            .and_then(ReplicatorGene::sub_genome_mut)
    }

    pub fn is_replicator(&self) -> bool {
        self.function.kind().is_replicator()
    }

    /// True for a constructor/injector in the self-replication state.
    pub fn is_self_copy(&self) -> bool {
        self.function
            .replicator()
            .is_some_and(ReplicatorGene::is_make_copy)
    }
}

impl Default for CellGene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_round_trip() {
        for kind in CellFunctionKind::ALL {
            assert_eq!(CellFunctionKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(CellFunctionKind::from_tag(11), None);
    }

    #[test]
    fn test_cell_builders() {
        let cell = CellGene::new()
            .with_color(4)
            .with_reference_angle(35.0)
            .with_function(CellFunction::Constructor(ReplicatorGene::MakeGenomeCopy));

        assert_eq!(cell.color, 4);
        assert_eq!(cell.reference_angle, 35.0);
        assert_eq!(cell.function.kind(), CellFunctionKind::Constructor);
        assert!(cell.is_replicator());
        assert!(cell.is_self_copy());
        assert!(cell.sub_genome().is_none());
    }

    #[test]
    fn test_embedded_replicator() {
        let rep = ReplicatorGene::embedded(Genome::new()).with_mode(42);
        assert!(!rep.is_make_copy());
        assert!(rep.sub_genome().is_some());

        let cell = CellGene::new().with_function(CellFunction::Injector(rep));
        assert!(cell.is_replicator());
        assert!(!cell.is_self_copy());
        assert_eq!(cell.sub_genome().unwrap().len(), 0);
    }
}
