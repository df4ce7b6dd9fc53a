//! Binary genome codec.
//!
//! A genome is a flat sequence of cell records. Every record starts with a
//! fixed 14-byte header (function tag, color, reference angle, energy,
//! required connections, scheduling fields, output-blocked flag) followed
//! by a function-specific payload. Constructor/injector payloads are
//! self-describing: a self-replication flag, and for embedded genomes the
//! construction mode, the nested cursor, and a length-prefixed nested
//! buffer that is itself a valid encoding. The length prefix lets the
//! top-level record walk skip nested content without parsing it, which is
//! what keeps cell-index/byte-offset conversion cheap.
//!
//! All multi-byte fields are little-endian.

use cyto_core::{GenomeError, Result};

use crate::cell::{
    AttackerGene, CellFunction, CellFunctionKind, CellGene, DefenderGene, MuscleGene, NerveGene,
    NeuronGene, ReplicatorGene, SensorGene, TransmitterGene, NEURON_DATA_LEN,
};
use crate::genome::Genome;

/// Decoding fails beyond this nesting depth; bounds stack usage on
/// corrupted or adversarial buffers.
pub const MAX_NESTING_DEPTH: usize = 32;

pub(crate) const HEADER_LEN: usize = 14;

/// Serialize a genome into its byte representation.
pub fn encode_genome(genome: &Genome) -> Vec<u8> {
    let mut out = Vec::with_capacity(genome.byte_len());
    for cell in &genome.cells {
        encode_cell(cell, &mut out);
    }
    out
}

/// Decode a byte buffer into a genome, eagerly materializing nested
/// sub-genomes.
pub fn decode_genome(bytes: &[u8]) -> Result<Genome> {
    decode_at_depth(bytes, 0)
}

/// Byte offset at which the record of cell `index` starts.
///
/// Walks top-level records only; nested buffers are skipped via their
/// length prefix. An out-of-range index yields the buffer length.
pub fn cell_index_to_byte_offset(bytes: &[u8], index: usize) -> Result<usize> {
    let mut offset = 0;
    let mut current = 0;
    while offset < bytes.len() && current < index {
        offset += record_span(bytes, offset)?;
        current += 1;
    }
    Ok(offset.min(bytes.len()))
}

/// Index of the top-level cell whose record encloses `offset`.
///
/// A mid-record offset rounds down to the enclosing record; an offset at or
/// past the end yields the cell count.
pub fn byte_offset_to_cell_index(bytes: &[u8], offset: usize) -> Result<usize> {
    let mut pos = 0;
    let mut index = 0;
    while pos < bytes.len() {
        let span = record_span(bytes, pos)?;
        if pos + span > offset {
            return Ok(index);
        }
        pos += span;
        index += 1;
    }
    Ok(index)
}

/// Snap a cursor to the nearest valid position: clamped into `[0, len]`,
/// mid-record offsets moved back to the start of their record.
pub fn normalize_cursor(bytes: &[u8], cursor: usize) -> Result<usize> {
    if cursor >= bytes.len() {
        return Ok(bytes.len());
    }
    let index = byte_offset_to_cell_index(bytes, cursor)?;
    cell_index_to_byte_offset(bytes, index)
}

fn encode_cell(cell: &CellGene, out: &mut Vec<u8>) {
    out.push(cell.function.kind().tag());
    out.push(cell.color);
    out.extend_from_slice(&cell.reference_angle.to_le_bytes());
    out.extend_from_slice(&cell.energy.to_le_bytes());
    out.push(cell.num_required_connections);
    out.push(cell.execution_order);
    out.push(cell.input_execution_order);
    out.push(cell.output_blocked as u8);

    match &cell.function {
        CellFunction::None | CellFunction::Placeholder => {}
        CellFunction::Neuron(neuron) => out.extend_from_slice(&neuron.data),
        CellFunction::Transmitter(gene) => out.push(gene.mode),
        CellFunction::Sensor(gene) => {
            out.extend_from_slice(&gene.min_density.to_le_bytes());
            out.push(gene.scan_color);
        }
        CellFunction::Nerve(gene) => {
            out.push(gene.pulse_mode);
            out.push(gene.alternation_mode);
        }
        CellFunction::Attacker(gene) => out.push(gene.mode),
        CellFunction::Muscle(gene) => out.push(gene.mode),
        CellFunction::Defender(gene) => out.push(gene.mode),
        CellFunction::Constructor(rep) | CellFunction::Injector(rep) => {
            encode_replicator(rep, out)
        }
    }
}

fn encode_replicator(rep: &ReplicatorGene, out: &mut Vec<u8>) {
    match rep {
        ReplicatorGene::MakeGenomeCopy => out.push(1),
        ReplicatorGene::Embedded {
            genome,
            mode,
            genome_pos,
        } => {
            out.push(0);
            out.push(*mode);
            out.extend_from_slice(&(*genome_pos as u32).to_le_bytes());
            let nested = encode_genome(genome);
            out.extend_from_slice(&(nested.len() as u32).to_le_bytes());
            out.extend_from_slice(&nested);
        }
    }
}

fn decode_at_depth(bytes: &[u8], depth: usize) -> Result<Genome> {
    if depth > MAX_NESTING_DEPTH {
        return Err(GenomeError::NestingTooDeep(MAX_NESTING_DEPTH));
    }
    let mut reader = Reader::new(bytes);
    let mut cells = Vec::new();
    while !reader.at_end() {
        cells.push(decode_cell(&mut reader, depth)?);
    }
    Ok(Genome::from_cells(cells))
}

fn decode_cell(reader: &mut Reader<'_>, depth: usize) -> Result<CellGene> {
    let tag_offset = reader.pos;
    let tag = reader.u8()?;
    let kind = CellFunctionKind::from_tag(tag).ok_or(GenomeError::UnknownFunctionTag {
        tag,
        offset: tag_offset,
    })?;
    let color = reader.u8()?;
    let reference_angle = reader.f32()?;
    let energy = reader.f32()?;
    let num_required_connections = reader.u8()?;
    let execution_order = reader.u8()?;
    let input_execution_order = reader.u8()?;
    let output_blocked = reader.u8()? != 0;

    let function = match kind {
        CellFunctionKind::None => CellFunction::None,
        CellFunctionKind::Neuron => CellFunction::Neuron(NeuronGene::with_data(
            reader.take(NEURON_DATA_LEN)?.to_vec(),
        )),
        CellFunctionKind::Transmitter => {
            CellFunction::Transmitter(TransmitterGene { mode: reader.u8()? })
        }
        CellFunctionKind::Sensor => CellFunction::Sensor(SensorGene {
            min_density: reader.f32()?,
            scan_color: reader.u8()?,
        }),
        CellFunctionKind::Nerve => CellFunction::Nerve(NerveGene {
            pulse_mode: reader.u8()?,
            alternation_mode: reader.u8()?,
        }),
        CellFunctionKind::Attacker => CellFunction::Attacker(AttackerGene { mode: reader.u8()? }),
        CellFunctionKind::Muscle => CellFunction::Muscle(MuscleGene { mode: reader.u8()? }),
        CellFunctionKind::Defender => CellFunction::Defender(DefenderGene { mode: reader.u8()? }),
        CellFunctionKind::Placeholder => CellFunction::Placeholder,
        CellFunctionKind::Constructor => {
            CellFunction::Constructor(decode_replicator(reader, depth)?)
        }
        CellFunctionKind::Injector => CellFunction::Injector(decode_replicator(reader, depth)?),
    };

    Ok(CellGene {
        color,
        reference_angle,
        num_required_connections,
        execution_order,
        input_execution_order,
        output_blocked,
        energy,
        function,
    })
}

fn decode_replicator(reader: &mut Reader<'_>, depth: usize) -> Result<ReplicatorGene> {
    if reader.u8()? != 0 {
        return Ok(ReplicatorGene::MakeGenomeCopy);
    }
    let mode = reader.u8()?;
    let genome_pos = reader.u32()? as usize;
    let len = reader.u32()? as usize;
    let nested = reader.take(len)?;
    Ok(ReplicatorGene::Embedded {
        genome: decode_at_depth(nested, depth + 1)?,
        mode,
        genome_pos,
    })
}

/// Byte length of the top-level record starting at `offset`, determined
/// without recursing into nested payloads.
fn record_span(bytes: &[u8], offset: usize) -> Result<usize> {
    let mut reader = Reader::at(bytes, offset);
    let tag = reader.u8()?;
    let kind = CellFunctionKind::from_tag(tag)
        .ok_or(GenomeError::UnknownFunctionTag { tag, offset })?;
    reader.skip(HEADER_LEN - 1)?;

    match kind {
        CellFunctionKind::None | CellFunctionKind::Placeholder => {}
        CellFunctionKind::Neuron => reader.skip(NEURON_DATA_LEN)?,
        CellFunctionKind::Transmitter
        | CellFunctionKind::Attacker
        | CellFunctionKind::Muscle
        | CellFunctionKind::Defender => reader.skip(1)?,
        CellFunctionKind::Sensor => reader.skip(5)?,
        CellFunctionKind::Nerve => reader.skip(2)?,
        CellFunctionKind::Constructor | CellFunctionKind::Injector => {
            if reader.u8()? == 0 {
                reader.skip(5)?; // mode + nested cursor
                let len = reader.u32()? as usize;
                reader.take(len)?;
            }
        }
    }
    Ok(reader.pos - offset)
}

/// Encoded record length of a cell, computed from the in-memory tree.
pub(crate) fn record_len(cell: &CellGene) -> usize {
    HEADER_LEN + payload_len(&cell.function)
}

pub(crate) fn payload_len(function: &CellFunction) -> usize {
    match function {
        CellFunction::None | CellFunction::Placeholder => 0,
        CellFunction::Neuron(neuron) => neuron.data.len(),
        CellFunction::Transmitter(_)
        | CellFunction::Attacker(_)
        | CellFunction::Muscle(_)
        | CellFunction::Defender(_) => 1,
        CellFunction::Sensor(_) => 5,
        CellFunction::Nerve(_) => 2,
        CellFunction::Constructor(rep) | CellFunction::Injector(rep) => match rep {
            ReplicatorGene::MakeGenomeCopy => 1,
            ReplicatorGene::Embedded { genome, .. } => 1 + 1 + 4 + 4 + genome.byte_len(),
        },
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn at(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn u8(&mut self) -> Result<u8> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or(GenomeError::UnexpectedEnd(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    fn u32(&mut self) -> Result<u32> {
        let raw: [u8; 4] = self
            .slice(4)?
            .try_into()
            .expect("slice length checked");
        Ok(u32::from_le_bytes(raw))
    }

    fn f32(&mut self) -> Result<f32> {
        let raw: [u8; 4] = self
            .slice(4)?
            .try_into()
            .expect("slice length checked");
        Ok(f32::from_le_bytes(raw))
    }

    fn skip(&mut self, count: usize) -> Result<()> {
        self.slice(count).map(|_| ())
    }

    fn slice(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.pos + count > self.bytes.len() {
            return Err(GenomeError::UnexpectedEnd(self.pos));
        }
        let slice = &self.bytes[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    /// Read a length-prefixed region; overruns are reported as corrupted
    /// length prefixes rather than plain truncation.
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.pos + len > self.bytes.len() {
            return Err(GenomeError::LengthOverrun {
                len,
                offset: self.pos,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }
}
