use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::frame::{FrameSlot, FrameSpace, StackDepths};

/// Iterated dominance frontier placement (Cytron et al.).
///
/// The `has_already` and `work` stamps are shared by every slot placed with
/// one instance, so a later slot never sees work left by an earlier one.
pub struct PhiPlacement<B> {
    iteration: usize,
    has_already: BTreeMap<B, usize>,
    work: BTreeMap<B, usize>,
}

impl<B: Copy + Ord> Default for PhiPlacement<B> {
    fn default() -> Self {
        Self {
            iteration: 0,
            has_already: BTreeMap::new(),
            work: BTreeMap::new(),
        }
    }
}

impl<B: Copy + Ord> PhiPlacement<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Blocks needing a merge point for a slot defined in `defs`.
    ///
    /// A frontier block for which `live` is false is stamped but receives
    /// nothing, and is not itself treated as a definition.
    pub fn place(
        &mut self,
        defs: &BTreeSet<B>,
        frontiers: &BTreeMap<B, BTreeSet<B>>,
        mut live: impl FnMut(B) -> bool,
    ) -> Vec<B> {
        if defs.is_empty() {
            return vec![];
        }
        self.iteration += 1;
        let it = self.iteration;
        let mut w = BTreeSet::new();
        for x in defs.iter().cloned() {
            self.work.insert(x, it);
            w.insert(x);
        }
        let mut placed = vec![];
        while let Some(x) = w.pop_first() {
            let Some(df) = frontiers.get(&x) else {
                continue;
            };
            for y in df.iter().cloned() {
                if self.has_already.get(&y).is_some_and(|s| *s >= it) {
                    continue;
                }
                self.has_already.insert(y, it);
                if !live(y) {
                    continue;
                }
                placed.push(y);
                if self.work.get(&y).is_none_or(|s| *s < it) {
                    self.work.insert(y, it);
                    w.insert(y);
                }
            }
        }
        placed
    }
}

/// Places merge points for every defined slot: locals first, then operand
/// stack slots, then scope slots. Stack slots are only live in blocks
/// entered with at least `index + 1` elements on that stack.
pub fn place_merge_points<B: Copy + Ord>(
    defs: &BTreeMap<FrameSlot, BTreeSet<B>>,
    frontiers: &BTreeMap<B, BTreeSet<B>>,
    entry: impl Fn(B) -> StackDepths,
) -> Vec<(B, FrameSlot)> {
    let mut phi = PhiPlacement::new();
    let mut out = vec![];
    for (slot, sites) in defs.iter() {
        let live = |b: B| match slot.space {
            FrameSpace::Locals => true,
            FrameSpace::Values => slot.index < entry(b).values,
            FrameSpace::Scopes => slot.index < entry(b).scopes,
        };
        for b in phi.place(sites, frontiers, live) {
            trace!(%slot, iteration = phi.iteration(), "merge point");
            out.push((b, *slot));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn frontiers(edges: &[(u32, &[u32])]) -> BTreeMap<u32, BTreeSet<u32>> {
        edges
            .iter()
            .map(|(b, df)| (*b, df.iter().cloned().collect()))
            .collect()
    }

    #[test]
    fn iterates_through_frontiers_of_placed_merges() {
        // 0 -> 1 -> 2 -> 3, 0 -> 3, 3 -> 1
        let df = frontiers(&[(0, &[]), (1, &[3, 1]), (2, &[3]), (3, &[1])]);
        let mut phi = PhiPlacement::new();
        let mut placed = phi.place(&BTreeSet::from([2]), &df, |_| true);
        placed.sort();
        assert_eq!(placed, vec![1, 3]);
        assert_eq!(phi.iteration(), 1);
    }

    #[test]
    fn counter_is_shared_between_slots() {
        let df = frontiers(&[(0, &[]), (1, &[2]), (2, &[])]);
        let mut phi = PhiPlacement::new();
        assert_eq!(phi.place(&BTreeSet::from([1]), &df, |_| true), vec![2]);
        assert_eq!(phi.place(&BTreeSet::new(), &df, |_| true), Vec::<u32>::new());
        assert_eq!(phi.place(&BTreeSet::from([1]), &df, |_| true), vec![2]);
        assert_eq!(phi.iteration(), 2);
    }

    #[test]
    fn dead_stack_slots_get_nothing() {
        let df = frontiers(&[(0, &[]), (1, &[3]), (2, &[3]), (3, &[])]);
        let defs = BTreeMap::from([
            (FrameSlot::local(0), BTreeSet::from([1])),
            (FrameSlot::value(0), BTreeSet::from([1, 2])),
            (FrameSlot::value(1), BTreeSet::from([2])),
        ]);
        let placed = place_merge_points(&defs, &df, |b| StackDepths {
            values: if b == 3 { 1 } else { 0 },
            scopes: 0,
        });
        assert_eq!(
            placed,
            vec![(3, FrameSlot::local(0)), (3, FrameSlot::value(0))]
        );
    }
}
