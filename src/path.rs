//! The worldline store.
//!
//! Beads live in a per-slice arena and are addressed by `(slice, offset)`
//! locators, never by pointers.  Deleting a bead compacts its slice: the last
//! bead on the slice moves into the hole and every reference to it (link
//! endpoints, worm markers) is repaired.  Callers must not hold locators
//! across a deletion except the one the deletion returns.

use nalgebra::SVector;

use crate::container::Container;
use crate::random::McRng;
use crate::worm::Worm;

/// A bead locator: imaginary-time slice and within-slice offset.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct Bead {
    pub slice: usize,
    pub idx: usize,
}

impl Bead {
    pub fn new(slice: usize, idx: usize) -> Self {
        Bead { slice, idx }
    }
}

pub struct Path<const D: usize> {
    pub num_slices: usize,
    pub cell: Container<D>,
    pub worm: Worm,
    positions: Vec<Vec<SVector<f64, D>>>,
    next: Vec<Vec<Option<Bead>>>,
    prev: Vec<Vec<Option<Bead>>>,
    num_beads_on: usize,
}

impl<const D: usize> Path<D> {
    pub fn new(num_slices: usize, cell: Container<D>, worm: Worm) -> Self {
        assert!(num_slices >= 2, "need at least two time slices");
        Path {
            num_slices,
            cell,
            worm,
            positions: vec![Vec::new(); num_slices],
            next: vec![Vec::new(); num_slices],
            prev: vec![Vec::new(); num_slices],
            num_beads_on: 0,
        }
    }

    /// Cold start: `n` closed worldlines, each at a uniform random position
    /// held constant across all slices.
    pub fn with_random_particles(
        num_slices: usize,
        cell: Container<D>,
        worm: Worm,
        n: usize,
        rng: &mut McRng,
    ) -> Self {
        let mut path = Path::new(num_slices, cell, worm);
        for _ in 0..n {
            let pos = path.cell.rand_position(rng);
            path.add_closed_worldline(pos);
        }
        path
    }

    /// Add one closed worldline with every bead at `pos`.
    pub fn add_closed_worldline(&mut self, pos: SVector<f64, D>) {
        let first = self.add_bead(0, pos);
        let mut bead = first;
        for slice in 1..self.num_slices {
            bead = self.add_next_bead(bead, pos);
        }
        self.set_next(bead, Some(first));
        self.set_prev(first, Some(bead));
    }

    #[inline]
    pub fn pos(&self, b: Bead) -> SVector<f64, D> {
        self.positions[b.slice][b.idx]
    }

    #[inline]
    pub fn update_bead(&mut self, b: Bead, pos: SVector<f64, D>) {
        self.positions[b.slice][b.idx] = pos;
    }

    #[inline]
    pub fn next(&self, b: Bead) -> Option<Bead> {
        self.next[b.slice][b.idx]
    }

    #[inline]
    pub fn prev(&self, b: Bead) -> Option<Bead> {
        self.prev[b.slice][b.idx]
    }

    /// Follow `k` forward links.
    pub fn next_by(&self, b: Bead, k: usize) -> Option<Bead> {
        let mut bead = b;
        for _ in 0..k {
            bead = self.next(bead)?;
        }
        Some(bead)
    }

    /// Follow `k` backward links.
    pub fn prev_by(&self, b: Bead, k: usize) -> Option<Bead> {
        let mut bead = b;
        for _ in 0..k {
            bead = self.prev(bead)?;
        }
        Some(bead)
    }

    pub(crate) fn set_next(&mut self, b: Bead, link: Option<Bead>) {
        self.next[b.slice][b.idx] = link;
    }

    pub(crate) fn set_prev(&mut self, b: Bead, link: Option<Bead>) {
        self.prev[b.slice][b.idx] = link;
    }

    #[inline]
    pub fn num_beads_at_slice(&self, slice: usize) -> usize {
        self.positions[slice].len()
    }

    #[inline]
    pub fn num_beads_on(&self) -> usize {
        self.num_beads_on
    }

    /// Number of closed worldlines (particles whose trajectory wraps the full
    /// imaginary time circle).  Integer division absorbs the extra worm bead
    /// of an off-diagonal configuration.
    pub fn get_true_num_particles(&self) -> usize {
        (self.num_beads_on - self.worm.length) / self.num_slices
    }

    /// Minimum-image separation `r_a - r_b`.
    pub fn get_separation(&self, a: Bead, b: Bead) -> SVector<f64, D> {
        let mut sep = self.pos(a) - self.pos(b);
        self.cell.put_in_bc(&mut sep);
        sep
    }

    /// All beads on a slice.
    pub fn beads_at_slice(&self, slice: usize) -> impl Iterator<Item = Bead> + '_ {
        (0..self.positions[slice].len()).map(move |idx| Bead::new(slice, idx))
    }

    /// Create an unlinked bead.
    pub fn add_bead(&mut self, slice: usize, pos: SVector<f64, D>) -> Bead {
        debug_assert!(slice < self.num_slices);
        self.positions[slice].push(pos);
        self.next[slice].push(None);
        self.prev[slice].push(None);
        self.num_beads_on += 1;
        Bead::new(slice, self.positions[slice].len() - 1)
    }

    /// Create a bead on the following slice and link it after `b`.
    pub fn add_next_bead(&mut self, b: Bead, pos: SVector<f64, D>) -> Bead {
        debug_assert!(self.next(b).is_none(), "bead already has a forward link");
        let slice = (b.slice + 1) % self.num_slices;
        let new = self.add_bead(slice, pos);
        self.set_next(b, Some(new));
        self.set_prev(new, Some(b));
        new
    }

    /// Create a bead on the preceding slice and link it before `b`.
    pub fn add_prev_bead(&mut self, b: Bead, pos: SVector<f64, D>) -> Bead {
        debug_assert!(self.prev(b).is_none(), "bead already has a backward link");
        let slice = (b.slice + self.num_slices - 1) % self.num_slices;
        let new = self.add_bead(slice, pos);
        self.set_prev(b, Some(new));
        self.set_next(new, Some(b));
        new
    }

    /// Delete `b`, returning its forward link (valid across the deletion
    /// because it lives on a different slice than the compaction).
    pub fn del_bead_get_next(&mut self, b: Bead) -> Option<Bead> {
        let following = self.next(b);
        self.del_bead(b);
        following
    }

    /// Delete `b`, returning its backward link.
    pub fn del_bead_get_prev(&mut self, b: Bead) -> Option<Bead> {
        let preceding = self.prev(b);
        self.del_bead(b);
        preceding
    }

    fn del_bead(&mut self, b: Bead) {
        // Detach from neighbors.
        if let Some(p) = self.prev(b) {
            self.set_next(p, None);
        }
        if let Some(n) = self.next(b) {
            self.set_prev(n, None);
        }

        // Swap-remove within the slice, then repair every reference to the
        // bead that moved into the hole.
        let last = self.positions[b.slice].len() - 1;
        self.positions[b.slice].swap_remove(b.idx);
        self.next[b.slice].swap_remove(b.idx);
        self.prev[b.slice].swap_remove(b.idx);
        self.num_beads_on -= 1;

        if b.idx != last {
            let moved_from = Bead::new(b.slice, last);
            let moved_to = Bead::new(b.slice, b.idx);
            if let Some(p) = self.prev(moved_to) {
                self.set_next(p, Some(moved_to));
            }
            if let Some(n) = self.next(moved_to) {
                self.set_prev(n, Some(moved_to));
            }
            for marker in [
                &mut self.worm.head,
                &mut self.worm.tail,
                &mut self.worm.special1,
                &mut self.worm.special2,
            ] {
                if *marker == Some(moved_from) {
                    *marker = Some(moved_to);
                }
            }
        }
    }

    /// Recompute the worm descriptors for new endpoints.  Links must already
    /// be final: `next(head)` and `prev(tail)` are the open ends.
    pub fn update_worm(&mut self, head: Bead, tail: Bead) {
        let mut length = 0;
        let mut bead = tail;
        while bead != head {
            match self.next(bead) {
                Some(nb) => {
                    length += 1;
                    bead = nb;
                }
                None => {
                    debug_assert!(false, "worm segment does not reach the head");
                    break;
                }
            }
        }
        let m = self.num_slices;
        let d = (tail.slice + m - head.slice) % m;
        self.worm.head = Some(head);
        self.worm.tail = Some(tail);
        self.worm.length = length;
        self.worm.gap = if d == 0 { m } else { d };
        self.worm.special1 = None;
        self.worm.special2 = None;
    }

    /// Whether `b` lies on the worm segment (tail through head inclusive).
    pub fn worm_found_bead(&self, b: Bead) -> bool {
        let (Some(head), Some(tail)) = (self.worm.head, self.worm.tail) else {
            return false;
        };
        let mut bead = tail;
        loop {
            if bead == b {
                return true;
            }
            if bead == head {
                return false;
            }
            match self.next(bead) {
                Some(nb) => bead = nb,
                None => return false,
            }
        }
    }

    /// Full structural validation of the store: link symmetry, slice
    /// advancement, diagonality, counters and worm descriptors.  Used by the
    /// test suite at move boundaries and by debug assertions.
    pub fn consistent(&self) -> Result<(), String> {
        let m = self.num_slices;
        let mut total = 0;
        let mut open_forward = Vec::new();
        let mut open_backward = Vec::new();

        for slice in 0..m {
            let n = self.positions[slice].len();
            if self.next[slice].len() != n || self.prev[slice].len() != n {
                return Err(format!("ragged link arrays at slice {slice}"));
            }
            total += n;
            for idx in 0..n {
                let b = Bead::new(slice, idx);
                match self.next(b) {
                    Some(nb) => {
                        if nb.slice != (slice + 1) % m {
                            return Err(format!("{b:?} advances to slice {}", nb.slice));
                        }
                        if self.prev(nb) != Some(b) {
                            return Err(format!("asymmetric link {b:?} -> {nb:?}"));
                        }
                    }
                    None => open_forward.push(b),
                }
                match self.prev(b) {
                    Some(pb) => {
                        if self.next(pb) != Some(b) {
                            return Err(format!("asymmetric link {pb:?} <- {b:?}"));
                        }
                    }
                    None => open_backward.push(b),
                }
            }
        }

        if total != self.num_beads_on {
            return Err(format!(
                "bead counter {} != stored beads {total}",
                self.num_beads_on
            ));
        }

        if self.worm.special1.is_some() || self.worm.special2.is_some() {
            return Err("special markers set outside a move".into());
        }

        if self.worm.is_diagonal {
            if !open_forward.is_empty() || !open_backward.is_empty() {
                return Err("diagonal configuration has open links".into());
            }
            if self.worm.head.is_some() || self.worm.tail.is_some() {
                return Err("diagonal configuration has worm endpoints".into());
            }
        } else {
            let (Some(head), Some(tail)) = (self.worm.head, self.worm.tail) else {
                return Err("off-diagonal configuration lacks worm endpoints".into());
            };
            if open_forward != vec![head] {
                return Err(format!("open forward links {open_forward:?} != [head]"));
            }
            if open_backward != vec![tail] {
                return Err(format!("open backward links {open_backward:?} != [tail]"));
            }
            let mut length = 0;
            let mut bead = tail;
            while bead != head {
                match self.next(bead) {
                    Some(nb) => {
                        length += 1;
                        bead = nb;
                    }
                    None => return Err("worm segment does not reach the head".into()),
                }
            }
            if length != self.worm.length {
                return Err(format!(
                    "worm length {} != walked length {length}",
                    self.worm.length
                ));
            }
            let d = (tail.slice + m - head.slice) % m;
            let gap = if d == 0 { m } else { d };
            if gap != self.worm.gap {
                return Err(format!("worm gap {} != slice gap {gap}", self.worm.gap));
            }
            if (length + gap) % m != 0 {
                return Err(format!("length {length} + gap {gap} not a multiple of {m}"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn worm() -> Worm {
        Worm::new(1.0)
    }

    fn cell() -> Container<3> {
        Container::cube(10.0, true)
    }

    #[test]
    fn closed_worldline_is_consistent() {
        let mut rng = McRng::seed_from(1);
        let path = Path::<3>::with_random_particles(8, cell(), worm(), 3, &mut rng);
        path.consistent().unwrap();
        assert_eq!(path.num_beads_on(), 24);
        assert_eq!(path.get_true_num_particles(), 3);
        for s in 0..8 {
            assert_eq!(path.num_beads_at_slice(s), 3);
        }
    }

    #[test]
    fn next_by_wraps_around() {
        let mut rng = McRng::seed_from(2);
        let path = Path::<3>::with_random_particles(8, cell(), worm(), 1, &mut rng);
        let b = Bead::new(0, 0);
        assert_eq!(path.next_by(b, 8), Some(b));
        assert_eq!(path.prev_by(b, 8), Some(b));
        assert_eq!(path.next_by(b, 3).unwrap().slice, 3);
    }

    #[test]
    fn delete_compacts_and_repairs_links() {
        let mut rng = McRng::seed_from(3);
        let mut path = Path::<3>::with_random_particles(4, cell(), worm(), 3, &mut rng);

        // Delete the first bead on slice 1; the last bead of slice 1 moves
        // into offset 0 and its neighbors must still point at it.
        let victim = Bead::new(1, 0);
        let p = path.prev(victim).unwrap();
        let n = path.next(victim).unwrap();
        path.del_bead(victim);
        assert_eq!(path.num_beads_at_slice(1), 2);
        assert!(path.next(p).is_none());
        assert!(path.prev(n).is_none());

        let moved = Bead::new(1, 0);
        let mp = path.prev(moved).unwrap();
        let mn = path.next(moved).unwrap();
        assert_eq!(path.next(mp), Some(moved));
        assert_eq!(path.prev(mn), Some(moved));
    }

    #[test]
    fn delete_repairs_worm_markers() {
        let mut rng = McRng::seed_from(4);
        let mut path = Path::<3>::with_random_particles(4, cell(), worm(), 2, &mut rng);

        // Pretend the last bead on slice 2 is the head; deleting offset 0 on
        // that slice must retarget the marker to the compacted offset.
        let last = Bead::new(2, 1);
        path.worm.head = Some(last);
        path.del_bead(Bead::new(2, 0));
        assert_eq!(path.worm.head, Some(Bead::new(2, 0)));
        path.worm.head = None;
    }

    #[test]
    fn separation_uses_minimum_image() {
        let mut path = Path::<3>::new(2, cell(), worm());
        let a = path.add_bead(0, Vector3::new(4.5, 0.0, 0.0));
        let b = path.add_bead(0, Vector3::new(-4.5, 0.0, 0.0));
        let sep = path.get_separation(a, b);
        assert!((sep[0] - (-1.0)).abs() < 1e-12);
    }

    #[test]
    fn worm_update_counts_links_and_gap() {
        let mut rng = McRng::seed_from(5);
        let mut path = Path::<3>::with_random_particles(8, cell(), worm(), 1, &mut rng);

        // Open a gap of 2 by hand: head at slice 0, tail at slice 2.
        let head = Bead::new(0, 0);
        let tail = path.next_by(head, 2).unwrap();
        let mut b = path.next(head).unwrap();
        while b != tail {
            b = path.del_bead_get_next(b).unwrap();
        }
        path.update_worm(head, tail);
        path.worm.is_diagonal = false;

        assert_eq!(path.worm.length, 6);
        assert_eq!(path.worm.gap, 2);
        path.consistent().unwrap();
        assert!(path.worm_found_bead(head));
        assert!(path.worm_found_bead(tail));
    }
}
