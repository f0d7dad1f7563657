//! Path-state checkpointing.
//!
//! The persisted format is a flat list of bead records plus the worm record.
//! JSON is used for its exact shortest-round-trip float formatting, so a
//! restore reproduces the path bit for bit.

use std::io::{Read, Write};

use nalgebra::SVector;
use serde::{Deserialize, Serialize};

use crate::container::Container;
use crate::path::{Bead, Path};
use crate::worm::Worm;

use super::IoError;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BeadRecord {
    pub slice: usize,
    pub offset: usize,
    pub position: Vec<f64>,
    pub next: Option<(usize, usize)>,
    pub prev: Option<(usize, usize)>,
    pub bead_on: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WormRecord {
    pub head: Option<(usize, usize)>,
    pub tail: Option<(usize, usize)>,
    pub length: usize,
    pub gap: usize,
    pub is_diagonal: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PathCheckpoint {
    pub num_slices: usize,
    pub side: Vec<f64>,
    pub periodic: Vec<bool>,
    pub beads: Vec<BeadRecord>,
    pub worm: WormRecord,
}

fn pack(b: Option<Bead>) -> Option<(usize, usize)> {
    b.map(|b| (b.slice, b.idx))
}

fn unpack(b: Option<(usize, usize)>) -> Option<Bead> {
    b.map(|(slice, idx)| Bead::new(slice, idx))
}

/// Capture the full path state.
pub fn snapshot<const D: usize>(path: &Path<D>) -> PathCheckpoint {
    let mut beads = Vec::with_capacity(path.num_beads_on());
    for slice in 0..path.num_slices {
        for b in path.beads_at_slice(slice) {
            beads.push(BeadRecord {
                slice: b.slice,
                offset: b.idx,
                position: path.pos(b).iter().cloned().collect(),
                next: pack(path.next(b)),
                prev: pack(path.prev(b)),
                bead_on: true,
            });
        }
    }
    PathCheckpoint {
        num_slices: path.num_slices,
        side: path.cell.side.iter().cloned().collect(),
        periodic: path.cell.periodic.to_vec(),
        beads,
        worm: WormRecord {
            head: pack(path.worm.head),
            tail: pack(path.worm.tail),
            length: path.worm.length,
            gap: path.worm.gap,
            is_diagonal: path.worm.is_diagonal,
        },
    }
}

/// Rebuild a path from a checkpoint.  `worm_cost_norm` re-seeds the cost
/// predicate (it is a constants-derived quantity, not persisted state).
pub fn restore<const D: usize>(
    checkpoint: &PathCheckpoint,
    worm_cost_norm: f64,
) -> Result<Path<D>, IoError> {
    if checkpoint.side.len() != D || checkpoint.periodic.len() != D {
        return Err(IoError::Dimension {
            expected: D,
            found: checkpoint.side.len(),
        });
    }
    let side = SVector::from_fn(|i, _| checkpoint.side[i]);
    let mut periodic = [true; D];
    periodic.copy_from_slice(&checkpoint.periodic);
    let cell = Container::new(side, periodic);

    let mut path = Path::new(checkpoint.num_slices, cell, Worm::new(worm_cost_norm));

    // Records must arrive slice-major with dense offsets so that locators in
    // the link fields resolve.
    for record in &checkpoint.beads {
        if record.position.len() != D {
            return Err(IoError::Dimension {
                expected: D,
                found: record.position.len(),
            });
        }
        if record.slice >= checkpoint.num_slices {
            return Err(IoError::Corrupt(format!(
                "bead record slice {} outside 0..{}",
                record.slice, checkpoint.num_slices
            )));
        }
        if !record.bead_on {
            continue;
        }
        let pos = SVector::from_fn(|i, _| record.position[i]);
        let b = path.add_bead(record.slice, pos);
        if b.idx != record.offset {
            return Err(IoError::Corrupt(format!(
                "bead record ({}, {}) landed at offset {}",
                record.slice, record.offset, b.idx
            )));
        }
    }
    let in_bounds = |link: Option<(usize, usize)>, path: &Path<D>| match link {
        Some((slice, idx)) => slice < path.num_slices && idx < path.num_beads_at_slice(slice),
        None => true,
    };
    for record in &checkpoint.beads {
        if record.slice >= path.num_slices
            || record.offset >= path.num_beads_at_slice(record.slice)
            || !in_bounds(record.next, &path)
            || !in_bounds(record.prev, &path)
        {
            return Err(IoError::Corrupt(format!(
                "bead record ({}, {}) links outside the stored path",
                record.slice, record.offset
            )));
        }
        let b = Bead::new(record.slice, record.offset);
        path.set_next(b, unpack(record.next));
        path.set_prev(b, unpack(record.prev));
    }

    path.worm.head = unpack(checkpoint.worm.head);
    path.worm.tail = unpack(checkpoint.worm.tail);
    path.worm.length = checkpoint.worm.length;
    path.worm.gap = checkpoint.worm.gap;
    path.worm.is_diagonal = checkpoint.worm.is_diagonal;

    path.consistent().map_err(IoError::Corrupt)?;
    Ok(path)
}

pub fn write_checkpoint<const D: usize, W: Write>(
    path: &Path<D>,
    writer: W,
) -> Result<(), IoError> {
    serde_json::to_writer(writer, &snapshot(path))?;
    Ok(())
}

pub fn read_checkpoint<const D: usize, R: Read>(
    reader: R,
    worm_cost_norm: f64,
) -> Result<Path<D>, IoError> {
    let checkpoint: PathCheckpoint = serde_json::from_reader(reader)?;
    restore(&checkpoint, worm_cost_norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::McRng;

    #[test]
    fn closed_path_round_trips_bitwise() {
        let mut rng = McRng::seed_from(31);
        let path = Path::<3>::with_random_particles(
            8,
            Container::cube(6.0, true),
            Worm::new(1.0),
            3,
            &mut rng,
        );

        let mut buffer = Vec::new();
        write_checkpoint(&path, &mut buffer).unwrap();
        let restored: Path<3> = read_checkpoint(buffer.as_slice(), 1.0).unwrap();

        assert_eq!(snapshot(&path), snapshot(&restored));
    }

    #[test]
    fn worm_state_round_trips() {
        let mut rng = McRng::seed_from(32);
        let mut path = Path::<3>::with_random_particles(
            8,
            Container::cube(6.0, true),
            Worm::new(1.0),
            2,
            &mut rng,
        );

        // Cut a gap of 2 to make an off-diagonal state.
        let head = Bead::new(0, 0);
        let tail = path.next_by(head, 2).unwrap();
        let mut b = path.next(head).unwrap();
        while b != tail {
            b = path.del_bead_get_next(b).unwrap();
        }
        path.update_worm(head, tail);
        path.worm.is_diagonal = false;
        path.consistent().unwrap();

        let mut buffer = Vec::new();
        write_checkpoint(&path, &mut buffer).unwrap();
        let restored: Path<3> = read_checkpoint(buffer.as_slice(), 1.0).unwrap();

        assert_eq!(snapshot(&path), snapshot(&restored));
        assert_eq!(restored.worm.length, path.worm.length);
        assert!(!restored.worm.is_diagonal);
    }

    #[test]
    fn corrupt_links_are_rejected() {
        let mut rng = McRng::seed_from(33);
        let path = Path::<3>::with_random_particles(
            4,
            Container::cube(6.0, true),
            Worm::new(1.0),
            1,
            &mut rng,
        );
        let mut checkpoint = snapshot(&path);
        checkpoint.beads[0].next = None;
        assert!(restore::<3>(&checkpoint, 1.0).is_err());
    }
}
