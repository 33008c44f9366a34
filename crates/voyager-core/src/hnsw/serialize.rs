//! Byte-stable serialization of the graph body.
//!
//! The body is shared across language bindings and written little-endian
//! with fixed-width fields, in this order:
//!
//! ```text
//! offset_level_0: u64      always 0
//! max_elements: u64        slot capacity
//! num_elements: u64        occupied slots
//! size_data_per_element: u64
//! label_offset: u64        offset of the label inside an element block
//! vector_offset: u64       offset of the storage vector inside a block
//! M: u64
//! M_max0: u64
//! ef_construction: u64
//! mult: f64
//! ef: u64                  default search depth
//! cur_element_count: u64   equals num_elements
//! num_elements × element blocks:
//!     count_flags: u32     low 16 bits: layer-0 degree; bit 16: tombstone
//!     neighbors: u32 × M_max0 (zero-padded)
//!     vector: D' × storage scalar
//!     label: u64
//! num_elements × level records:
//!     level: i32
//!     per layer 1..=level: count: u32, neighbors: u32 × count
//! ```
//!
//! The entry point and maximum level are not stored; they are rebuilt from
//! the level records on load, which also permits slot re-packing.

use super::graph::{EntryPoint, HnswGraph, Slot, SlotId};
use crate::error::{Error, Result};
use crate::spaces::{DistanceKernels, Space, SpaceType};
use crate::streams::{
    read_f64_le, read_i32_le, read_u32_le, read_u64_le, write_f64_le, write_i32_le, write_u32_le,
    write_u64_le, InputStream, OutputStream,
};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Bit set in `count_flags` when the element is tombstoned.
const DELETED_FLAG: u32 = 1 << 16;

impl<S: DistanceKernels> HnswGraph<S> {
    /// Fixed byte size of one packed element block.
    fn element_block_size(&self) -> usize {
        4 + 4 * self.m0 + self.space.dims() * S::BYTES + 8
    }

    /// Writes the graph body.
    ///
    /// Takes the arena exclusively so the snapshot is consistent against
    /// concurrent inserts and deletes.
    ///
    /// # Errors
    ///
    /// Surfaces stream failures.
    pub(crate) fn save(&self, out: &mut dyn OutputStream) -> Result<()> {
        let state = self.slots.write();
        let count = self.len();
        let dims = self.space.dims();
        let block_size = self.element_block_size();
        let vector_offset = 4 + 4 * self.m0;
        let label_offset = vector_offset + dims * S::BYTES;

        write_u64_le(out, 0)?; // offset_level_0
        write_u64_le(out, state.len() as u64)?;
        write_u64_le(out, count as u64)?;
        write_u64_le(out, block_size as u64)?;
        write_u64_le(out, label_offset as u64)?;
        write_u64_le(out, vector_offset as u64)?;
        write_u64_le(out, self.m as u64)?;
        write_u64_le(out, self.m0 as u64)?;
        write_u64_le(out, self.ef_construction as u64)?;
        write_f64_le(out, self.mult)?;
        write_u64_le(out, self.ef() as u64)?;
        write_u64_le(out, count as u64)?; // cur_element_count

        let mut block = vec![0u8; block_size];
        for slot_lock in state.iter().take(count) {
            let slot = slot_lock.read();
            block.fill(0);

            let links0 = &slot.links[0];
            debug_assert!(links0.len() <= self.m0);
            let mut count_flags = links0.len() as u32;
            if slot.deleted {
                count_flags |= DELETED_FLAG;
            }
            block[0..4].copy_from_slice(&count_flags.to_le_bytes());
            for (j, &neighbor) in links0.iter().enumerate() {
                let at = 4 + j * 4;
                block[at..at + 4].copy_from_slice(&neighbor.to_le_bytes());
            }
            for (j, &value) in slot.vector.iter().enumerate() {
                let at = vector_offset + j * S::BYTES;
                value.write_bytes(&mut block[at..at + S::BYTES]);
            }
            block[label_offset..label_offset + 8].copy_from_slice(&slot.label.to_le_bytes());
            out.write(&block)?;
        }

        for slot_lock in state.iter().take(count) {
            let slot = slot_lock.read();
            write_i32_le(out, slot.level as i32)?;
            for layer in 1..=slot.level {
                let links = &slot.links[layer];
                write_u32_le(out, links.len() as u32)?;
                for &neighbor in links {
                    write_u32_le(out, neighbor)?;
                }
            }
        }

        out.flush()?;
        tracing::debug!(elements = count, dims, "serialized graph body");
        Ok(())
    }

    /// Reads a graph body written by [`HnswGraph::save`].
    ///
    /// `space_type` and `dims` come from the metadata header (or out-of-band
    /// for legacy files); everything else is in the body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corruption`] for internally inconsistent field
    /// values and [`Error::StreamIo`] for truncated input.
    #[allow(clippy::cast_possible_truncation, clippy::too_many_lines)]
    pub(crate) fn load(
        space_type: SpaceType,
        dims: usize,
        input: &mut dyn InputStream,
    ) -> Result<Self> {
        let offset_level_0 = read_u64_le(input)?;
        let max_elements = read_u64_le(input)? as usize;
        let num_elements = read_u64_le(input)? as usize;
        let block_size = read_u64_le(input)? as usize;
        let label_offset = read_u64_le(input)? as usize;
        let vector_offset = read_u64_le(input)? as usize;
        let m = read_u64_le(input)? as usize;
        let m0 = read_u64_le(input)? as usize;
        let ef_construction = read_u64_le(input)? as usize;
        let mult = read_f64_le(input)?;
        let ef = read_u64_le(input)? as usize;
        let cur_element_count = read_u64_le(input)? as usize;

        if offset_level_0 != 0 {
            return Err(Error::Corruption(format!(
                "layer-0 data offset {offset_level_0} is not 0"
            )));
        }
        if num_elements != cur_element_count {
            return Err(Error::Corruption(format!(
                "element counts disagree: {num_elements} vs {cur_element_count}"
            )));
        }
        if max_elements < num_elements {
            return Err(Error::Corruption(format!(
                "capacity {max_elements} below element count {num_elements}"
            )));
        }
        let expected_vector_offset = 4 + 4 * m0;
        let expected_label_offset = expected_vector_offset + dims * S::BYTES;
        let expected_block = expected_label_offset + 8;
        if block_size != expected_block
            || vector_offset != expected_vector_offset
            || label_offset != expected_label_offset
        {
            return Err(Error::Corruption(format!(
                "element layout ({block_size}/{vector_offset}/{label_offset}) does not match \
                 {dims} dimensions of {} ({expected_block}/{expected_vector_offset}/\
                 {expected_label_offset}); wrong space, dimension, or storage type?",
                S::DATA_TYPE.name()
            )));
        }

        let mut slots: Vec<RwLock<Slot<S>>> = Vec::with_capacity(max_elements);
        let mut labels = FxHashMap::default();
        labels.reserve(num_elements);
        let mut has_deletions = false;

        let mut block = vec![0u8; block_size];
        for slot_id in 0..num_elements {
            input.read_exact_bytes(&mut block)?;

            let count_flags = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
            let degree = (count_flags & 0xFFFF) as usize;
            let deleted = count_flags & DELETED_FLAG != 0;
            if degree > m0 {
                return Err(Error::Corruption(format!(
                    "layer-0 degree {degree} exceeds cap {m0}"
                )));
            }

            let mut links0 = Vec::with_capacity(degree);
            for j in 0..degree {
                let at = 4 + j * 4;
                let neighbor =
                    u32::from_le_bytes([block[at], block[at + 1], block[at + 2], block[at + 3]]);
                if neighbor as usize >= num_elements {
                    return Err(Error::Corruption(format!(
                        "neighbor {neighbor} out of range for {num_elements} elements"
                    )));
                }
                links0.push(neighbor);
            }

            let vector: Vec<S> = (0..dims)
                .map(|j| {
                    let at = vector_offset + j * S::BYTES;
                    S::read_bytes(&block[at..at + S::BYTES])
                })
                .collect();
            let label = u64::from_le_bytes(
                block[label_offset..label_offset + 8]
                    .try_into()
                    .expect("label field is 8 bytes"),
            );
            if labels.insert(label, slot_id as SlotId).is_some() {
                return Err(Error::Corruption(format!("duplicate label {label}")));
            }
            has_deletions |= deleted;

            slots.push(RwLock::new(Slot {
                vector,
                label,
                level: 0,
                links: vec![links0],
                deleted,
            }));
        }

        let mut entry: Option<EntryPoint> = None;
        for (slot_id, slot_lock) in slots.iter_mut().enumerate() {
            let level = read_i32_le(input)?;
            if level < 0 || level as usize > 63 {
                return Err(Error::Corruption(format!("implausible level {level}")));
            }
            let level = level as usize;

            let slot = slot_lock.get_mut();
            slot.level = level;
            for _ in 1..=level {
                let degree = read_u32_le(input)? as usize;
                if degree > m0 {
                    return Err(Error::Corruption(format!(
                        "upper-layer degree {degree} exceeds cap {m0}"
                    )));
                }
                let mut links = Vec::with_capacity(degree);
                for _ in 0..degree {
                    let neighbor = read_u32_le(input)?;
                    if neighbor as usize >= num_elements {
                        return Err(Error::Corruption(format!(
                            "neighbor {neighbor} out of range for {num_elements} elements"
                        )));
                    }
                    links.push(neighbor);
                }
                slot.links.push(links);
            }

            if entry.is_none_or(|e| level > e.level) {
                entry = Some(EntryPoint {
                    slot: slot_id as SlotId,
                    level,
                });
            }
        }

        slots.extend((num_elements..max_elements).map(|_| RwLock::new(Slot::default())));

        tracing::debug!(elements = num_elements, dims, "deserialized graph body");
        Ok(Self::from_parts(
            Space::new(space_type, dims),
            m,
            m0,
            ef_construction,
            mult,
            ef,
            slots,
            labels,
            entry,
            num_elements,
            has_deletions,
        ))
    }
}
