use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use crate::Flowgraph;

const UNDEF: usize = usize::MAX;

/// Dominator tree over every block reachable from the graph's roots.
///
/// The roots (start block and catch targets) hang off a virtual entry node,
/// numbered 0; real blocks are numbered by reverse postorder from 1.
#[derive(Clone, Debug)]
pub struct DominatorTree<B> {
    rpo: Vec<B>,
    num: BTreeMap<B, usize>,
    idom: Vec<usize>,
    preds: Vec<Vec<usize>>,
}

impl<B: Copy + Ord + Debug> DominatorTree<B> {
    pub fn compute<G: Flowgraph<Block = B> + ?Sized>(g: &G) -> Self {
        let roots = g.roots();
        let mut post = vec![];
        let mut seen = BTreeSet::new();
        for r in roots.iter().cloned() {
            if !seen.insert(r) {
                continue;
            }
            let mut stack = vec![(r, 0usize)];
            while let Some((b, next)) = stack.last_mut() {
                let b = *b;
                match g.successors(b).get(*next) {
                    Some(s) => {
                        *next += 1;
                        if seen.insert(*s) {
                            stack.push((*s, 0));
                        }
                    }
                    None => {
                        post.push(b);
                        stack.pop();
                    }
                }
            }
        }
        let rpo: Vec<B> = post.into_iter().rev().collect();
        let num: BTreeMap<B, usize> = rpo.iter().enumerate().map(|(i, b)| (*b, i + 1)).collect();
        let mut preds = vec![vec![]; rpo.len() + 1];
        for r in roots.iter() {
            if let Some(n) = num.get(r) {
                if !preds[*n].contains(&0) {
                    preds[*n].push(0);
                }
            }
        }
        for b in rpo.iter() {
            let from = num[b];
            for s in g.successors(*b) {
                let to = num[s];
                if !preds[to].contains(&from) {
                    preds[to].push(from);
                }
            }
        }

        let mut idom = vec![UNDEF; rpo.len() + 1];
        idom[0] = 0;
        let mut changed = true;
        while changed {
            changed = false;
            for b in 1..idom.len() {
                let mut new_idom = UNDEF;
                for p in preds[b].iter().cloned() {
                    if idom[p] == UNDEF {
                        continue;
                    }
                    new_idom = match new_idom {
                        UNDEF => p,
                        cur => intersect(&idom, cur, p),
                    };
                }
                if new_idom != UNDEF && idom[b] != new_idom {
                    idom[b] = new_idom;
                    changed = true;
                }
            }
        }
        Self {
            rpo,
            num,
            idom,
            preds,
        }
    }

    fn block(&self, n: usize) -> Option<B> {
        n.checked_sub(1).and_then(|i| self.rpo.get(i)).cloned()
    }

    pub fn reverse_postorder(&self) -> &[B] {
        &self.rpo
    }

    pub fn is_reachable(&self, b: B) -> bool {
        self.num.contains_key(&b)
    }

    /// The immediate dominator; `None` for roots and unreachable blocks.
    pub fn idom(&self, b: B) -> Option<B> {
        let n = *self.num.get(&b)?;
        self.block(self.idom[n])
    }

    pub fn dominates(&self, a: B, b: B) -> bool {
        let (Some(a), Some(mut b)) = (self.num.get(&a).cloned(), self.num.get(&b).cloned()) else {
            return false;
        };
        loop {
            if a == b {
                return true;
            }
            if b == 0 {
                return false;
            }
            b = self.idom[b];
        }
    }

    pub fn children(&self, b: B) -> Vec<B> {
        let Some(n) = self.num.get(&b).cloned() else {
            return vec![];
        };
        (1..self.idom.len())
            .filter(|c| self.idom[*c] == n)
            .filter_map(|c| self.block(c))
            .collect()
    }

    /// Dominance frontier of every reachable block. Blocks with an empty
    /// frontier are present with an empty set.
    pub fn frontiers(&self) -> BTreeMap<B, BTreeSet<B>> {
        let mut df: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); self.idom.len()];
        for b in 1..self.idom.len() {
            for p in self.preds[b].iter().cloned() {
                let mut runner = p;
                while runner != 0 && runner != self.idom[b] {
                    df[runner].insert(b);
                    runner = self.idom[runner];
                }
            }
        }
        df.into_iter()
            .enumerate()
            .skip(1)
            .filter_map(|(n, set)| {
                let b = self.block(n)?;
                Some((b, set.into_iter().filter_map(|s| self.block(s)).collect()))
            })
            .collect()
    }
}

fn intersect(idom: &[usize], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while a > b {
            a = idom[a];
        }
        while b > a {
            b = idom[b];
        }
    }
    a
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use portal_abc_common::{Instruction, Label};
    use pretty_assertions::assert_eq;

    use super::DominatorTree;
    use crate::Flowgraph;

    /// Adjacency-list graph; block 0 is the start, `catches` are extra roots.
    struct Adj {
        succs: Vec<Vec<usize>>,
        catches: Vec<usize>,
    }
    impl Flowgraph for Adj {
        type Block = usize;
        fn start_block(&self) -> usize {
            0
        }
        fn block_for(&self, _: Label) -> Option<usize> {
            None
        }
        fn catch_targets(&self) -> &[usize] {
            &self.catches
        }
        fn successors(&self, b: usize) -> &[usize] {
            &self.succs[b]
        }
        fn instructions(&self, _: usize) -> &[Instruction] {
            &[]
        }
    }

    fn set(v: &[usize]) -> BTreeSet<usize> {
        v.iter().cloned().collect()
    }

    #[test]
    fn diamond() {
        let g = Adj {
            succs: vec![vec![1, 2], vec![3], vec![3], vec![]],
            catches: vec![],
        };
        let d = DominatorTree::compute(&g);
        assert_eq!(d.idom(3), Some(0));
        assert_eq!(d.idom(1), Some(0));
        assert_eq!(d.idom(0), None);
        assert!(d.dominates(0, 3));
        assert!(!d.dominates(1, 3));
        let df = d.frontiers();
        assert_eq!(
            df,
            BTreeMap::from([(0, set(&[])), (1, set(&[3])), (2, set(&[3])), (3, set(&[]))])
        );
    }

    #[test]
    fn loop_head_is_in_its_own_frontier() {
        // 0 -> 1 -> 2 -> 1, 1 -> 3
        let g = Adj {
            succs: vec![vec![1], vec![2, 3], vec![1], vec![]],
            catches: vec![],
        };
        let d = DominatorTree::compute(&g);
        assert_eq!(d.idom(2), Some(1));
        assert_eq!(d.idom(3), Some(1));
        let df = d.frontiers();
        assert_eq!(df[&2], set(&[1]));
        assert_eq!(df[&1], set(&[1]));
        assert_eq!(df[&0], set(&[]));
        let mut kids = d.children(1);
        kids.sort();
        assert_eq!(kids, vec![2, 3]);
    }

    #[test]
    fn catch_targets_are_roots() {
        // 0 -> 1; handler 2 -> 1; 3 unreachable
        let g = Adj {
            succs: vec![vec![1], vec![], vec![1], vec![1]],
            catches: vec![2],
        };
        let d = DominatorTree::compute(&g);
        assert_eq!(d.idom(1), None);
        assert_eq!(d.idom(2), None);
        assert!(!d.is_reachable(3));
        assert!(d.is_reachable(2));
        let df = d.frontiers();
        assert_eq!(df[&0], set(&[1]));
        assert_eq!(df[&2], set(&[1]));
        assert!(!df.contains_key(&3));
    }
}
