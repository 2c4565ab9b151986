use std::collections::BTreeMap;

use bit_set::BitSet;
use log::debug;

use crate::grid::{Grid, SlotId};
use crate::wordlist::WordList;

/// A stable identifier for a section, preserved across grid edits whenever
/// the section's member squares survive unchanged.
pub type SectionId = usize;

/// A completed fill for a whole section, keyed in the section's cache by its
/// canonical letter string (member-square letters in row-major order).
#[derive(Debug, Clone)]
pub struct SectionCandidate {
    pub letters: String,
    pub entries: Vec<(SlotId, String)>,
    pub included_sections: Vec<SectionId>,
    pub iffy: bool,
}

/// A maximal connected group of slots that mutually cross through fully open
/// squares. Sections are the unit of search: each can be filled mostly
/// independently, coordinating with neighbors only through shared slots.
#[derive(Debug, Clone)]
pub struct Section {
    pub id: SectionId,

    /// Row-major square indices of every member square. This doubles as the
    /// section's signature for identity matching across grid edits.
    pub squares: BitSet,

    /// The fully open squares that seeded this section.
    pub open_squares: BitSet,

    /// Member slots in fill order: most constrained first.
    pub slots: Vec<SlotId>,

    /// Completed fills, keyed by canonical letter string.
    pub candidates: BTreeMap<String, SectionCandidate>,

    /// Sections that share a crossing slot with this one.
    pub neighbors: Vec<SectionId>,
}

impl Section {
    /// The canonical letter string for the current grid state, or None while
    /// any member square is still empty.
    pub fn canonical_letters(&self, grid: &Grid) -> Option<String> {
        self.squares
            .iter()
            .map(|idx| {
                let (row, col) = (idx / grid.width, idx % grid.width);
                grid.square(row, col).content
            })
            .collect()
    }

    pub fn is_fully_lettered(&self, grid: &Grid) -> bool {
        self.canonical_letters(grid).is_some()
    }

    pub fn contains_slot(&self, id: SlotId) -> bool {
        self.slots.contains(&id)
    }
}

/// Find the sections of a grid: connected components of fully open squares
/// (all 8 in-bounds neighbors white), each expanded to include every slot
/// touching the component. Returned sorted by open-square count ascending,
/// so the most constrained section is searched first. A topology with no
/// fully open squares yields no sections; that's not an error, just a grid
/// the engine has nothing to do with.
pub fn decompose_sections(grid: &Grid, word_list: &WordList) -> Vec<Section> {
    let size = grid.height * grid.width;
    let mut open = BitSet::with_capacity(size);

    for row in 0..grid.height {
        for col in 0..grid.width {
            if !grid.square(row, col).is_white() {
                continue;
            }

            let fully_open = (-1isize..=1)
                .flat_map(|dr| (-1isize..=1).map(move |dc| (dr, dc)))
                .filter(|&(dr, dc)| (dr, dc) != (0, 0))
                .all(|(dr, dc)| !grid.is_blocked(row as isize + dr, col as isize + dc));

            if fully_open {
                open.insert(row * grid.width + col);
            }
        }
    }

    // Flood-fill the open squares into connected components.
    let mut visited = BitSet::with_capacity(size);
    let mut components: Vec<BitSet> = vec![];

    for start in open.iter().collect::<Vec<_>>() {
        if visited.contains(start) {
            continue;
        }

        let mut component = BitSet::with_capacity(size);
        let mut stack = vec![start];

        while let Some(idx) = stack.pop() {
            if visited.contains(idx) {
                continue;
            }
            visited.insert(idx);
            component.insert(idx);

            let (row, col) = (idx / grid.width, idx % grid.width);
            for (dr, dc) in [(-1isize, 0isize), (1, 0), (0, -1), (0, 1)] {
                let (nr, nc) = (row as isize + dr, col as isize + dc);
                if nr < 0 || nc < 0 {
                    continue;
                }
                let neighbor = nr as usize * grid.width + nc as usize;
                if open.contains(neighbor) && !visited.contains(neighbor) {
                    stack.push(neighbor);
                }
            }
        }

        components.push(component);
    }

    components.sort_by_key(|component| component.len());

    // A slot whose squares touch more than one component bridges their
    // sections. Bridges become members of each section they touch, but
    // their squares never propagate the expansion, otherwise every pair of
    // bridged sections would blur into a single blob.
    let slot_components: BTreeMap<SlotId, Vec<usize>> = grid
        .slots()
        .map(|slot| {
            let touched: Vec<usize> = components
                .iter()
                .enumerate()
                .filter(|(_, component)| {
                    slot.squares()
                        .iter()
                        .any(|&(row, col)| component.contains(row * grid.width + col))
                })
                .map(|(idx, _)| idx)
                .collect();
            (slot.id, touched)
        })
        .collect();

    let mut sections: Vec<Section> = components
        .iter()
        .enumerate()
        .map(|(id, component)| {
            // Expand to a fixpoint: start from the open squares and keep
            // adopting any slot that runs through a member square. Slots
            // that also touch a foreign component join without contributing
            // their squares.
            let mut slots: Vec<SlotId> = vec![];
            let mut squares = component.clone();
            loop {
                let mut grew = false;
                for slot in grid.slots() {
                    if slots.contains(&slot.id) {
                        continue;
                    }
                    let reaches = slot
                        .squares()
                        .iter()
                        .any(|&(row, col)| squares.contains(row * grid.width + col));
                    if !reaches {
                        continue;
                    }
                    slots.push(slot.id);
                    let bridges = slot_components[&slot.id].iter().any(|&idx| idx != id);
                    if !bridges {
                        for (row, col) in slot.squares() {
                            squares.insert(row * grid.width + col);
                        }
                    }
                    grew = true;
                }
                if !grew {
                    break;
                }
            }

            // Fill order: fewest dictionary matches first.
            slots.sort_by_key(|&id| {
                let matches = grid
                    .letters_for_slot(id)
                    .map(|pattern| word_list.query(&pattern).len())
                    .unwrap_or(0);
                (matches, id)
            });

            Section {
                id,
                squares,
                open_squares: component.clone(),
                slots,
                candidates: BTreeMap::new(),
                neighbors: vec![],
            }
        })
        .collect();

    // Sections sharing a crossing slot are neighbors. Their open squares are
    // disjoint by construction, so a shared slot is the only kind of overlap
    // that links them.
    for i in 0..sections.len() {
        for j in i + 1..sections.len() {
            let shared = sections[i]
                .slots
                .iter()
                .any(|id| sections[j].slots.contains(id));
            if shared {
                let (id_i, id_j) = (sections[i].id, sections[j].id);
                sections[i].neighbors.push(id_j);
                sections[j].neighbors.push(id_i);
            }
        }
    }

    debug!(
        "decomposed grid into {} section(s): {:?}",
        sections.len(),
        sections
            .iter()
            .map(|section| (section.id, section.slots.len()))
            .collect::<Vec<_>>()
    );

    sections
}

/// Match freshly decomposed sections against the previous generation by
/// exact member-square signature. A match keeps its old id and cached
/// candidates (with each candidate's included-section list filtered down to
/// ids that still exist); everything else gets a fresh id.
pub fn match_sections(
    fresh: Vec<Section>,
    old: &[Section],
    next_id: &mut SectionId,
) -> Vec<Section> {
    let mut matched: Vec<Section> = fresh
        .into_iter()
        .map(|mut section| {
            match old.iter().find(|prior| prior.squares == section.squares) {
                Some(prior) => {
                    section.id = prior.id;
                    section.candidates = prior.candidates.clone();
                }
                None => {
                    section.id = *next_id;
                    *next_id += 1;
                }
            }
            section
        })
        .collect();

    // Ids moved around, so the freshly computed neighbor links are stale:
    // they were positional indices. Recompute them from shared slots.
    let slot_sets: Vec<(SectionId, Vec<SlotId>)> = matched
        .iter()
        .map(|section| (section.id, section.slots.clone()))
        .collect();
    let valid: Vec<SectionId> = matched.iter().map(|section| section.id).collect();

    for section in &mut matched {
        section.neighbors = slot_sets
            .iter()
            .filter(|(id, slots)| {
                *id != section.id && slots.iter().any(|slot| section.slots.contains(slot))
            })
            .map(|&(id, _)| id)
            .collect();

        for candidate in section.candidates.values_mut() {
            candidate
                .included_sections
                .retain(|id| valid.contains(id));
        }
    }

    if let Some(max) = matched.iter().map(|section| section.id).max() {
        *next_id = (*next_id).max(max + 1);
    }

    matched
}

/// Lazily enumerates index vectors over a set of per-coordinate sizes, in
/// odometer order: the last coordinate advances fastest, so combinations are
/// consumed in strictly increasing per-coordinate order. An empty dimension
/// list yields exactly one empty vector, which seeds the single rootless
/// node of a section with no solved neighbors.
#[derive(Debug, Clone)]
pub struct PermutationState {
    dims: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl PermutationState {
    pub fn new(dims: Vec<usize>) -> PermutationState {
        let next = if dims.iter().any(|&dim| dim == 0) {
            None
        } else {
            Some(vec![0; dims.len()])
        };
        PermutationState { dims, next }
    }

    pub fn is_exhausted(&self) -> bool {
        self.next.is_none()
    }

    /// The next permutation vector, advancing the internal odometer.
    pub fn advance(&mut self) -> Option<Vec<usize>> {
        let current = self.next.clone()?;

        let mut next = current.clone();
        let mut idx = next.len();
        self.next = None;
        while idx > 0 {
            idx -= 1;
            next[idx] += 1;
            if next[idx] < self.dims[idx] {
                self.next = Some(next);
                break;
            }
            next[idx] = 0;
        }

        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::wordlist::WordList;

    fn word_list() -> WordList {
        WordList::load(
            "cat;50\ncut;50\ncot;50\nabcde;50\nfghij;50\nklmno;50\npqrst;50\nuvwxy;50",
        )
        .expect("load")
    }

    #[test]
    fn test_open_5x5_is_one_section() {
        let grid = Grid::from_template(
            "
            .....
            .....
            .....
            .....
            .....
            ",
        )
        .expect("template");

        let sections = decompose_sections(&grid, &word_list());

        assert_eq!(sections.len(), 1);
        // The inner 3x3 is fully open; the section expands to all 10 slots
        // and all 25 squares.
        assert_eq!(sections[0].open_squares.len(), 9);
        assert_eq!(sections[0].slots.len(), 10);
        assert_eq!(sections[0].squares.len(), 25);
        assert!(sections[0].neighbors.is_empty());
    }

    #[test]
    fn test_closed_topology_has_no_sections() {
        let grid = Grid::from_template("c.t\n#.#").expect("template");
        assert!(decompose_sections(&grid, &word_list()).is_empty());
    }

    #[test]
    fn test_sections_sharing_a_slot_are_neighbors() {
        let grid = Grid::from_template(
            "
            ...#...
            .......
            ...#...
            ",
        )
        .expect("template");

        let sections = decompose_sections(&grid, &word_list());

        assert_eq!(sections.len(), 2);
        let shared = crate::grid::SlotId::new(1, 0, crate::Direction::Across);
        assert!(sections[0].contains_slot(shared));
        assert!(sections[1].contains_slot(shared));
        assert_eq!(sections[0].neighbors, vec![sections[1].id]);
        assert_eq!(sections[1].neighbors, vec![sections[0].id]);
    }

    #[test]
    fn test_bridging_slot_does_not_merge_sections() {
        // The full-width across slot runs through both open blocks. It joins
        // both sections, but its squares must not drag one section's
        // expansion into the other's territory.
        let grid = Grid::from_template(
            "
            ...#...
            .......
            ...#...
            ",
        )
        .expect("template");

        let sections = decompose_sections(&grid, &word_list());

        assert_eq!(sections.len(), 2);
        for section in &sections {
            assert_eq!(section.slots.len(), 6);
            assert_eq!(section.squares.len(), 9);
        }
        assert!(sections[0]
            .squares
            .intersection(&sections[1].squares)
            .next()
            .is_none());
    }

    #[test]
    fn test_identity_preserved_across_regeneration() {
        let grid = Grid::from_template(
            "
            .....
            .....
            .....
            .....
            .....
            ",
        )
        .expect("template");
        let list = word_list();

        let mut next_id = 0;
        let mut sections = match_sections(decompose_sections(&grid, &list), &[], &mut next_id);
        assert_eq!(sections[0].id, 0);

        sections[0].candidates.insert(
            "x".repeat(25),
            SectionCandidate {
                letters: "x".repeat(25),
                entries: vec![],
                included_sections: vec![0, 99],
                iffy: false,
            },
        );

        let regenerated =
            match_sections(decompose_sections(&grid, &list), &sections, &mut next_id);

        assert_eq!(regenerated[0].id, 0);
        let candidate = regenerated[0]
            .candidates
            .get(&"x".repeat(25))
            .expect("candidate carried over");
        // The stale included-section id is filtered out.
        assert_eq!(candidate.included_sections, vec![0]);
    }

    #[test]
    fn test_permutation_odometer_order() {
        // Two solved neighbors with 3 and 2 candidates yield exactly 6
        // permutations, last coordinate fastest.
        let mut perms = PermutationState::new(vec![3, 2]);
        let mut seen = vec![];
        while let Some(combo) = perms.advance() {
            seen.push(combo);
        }

        assert_eq!(
            seen,
            vec![
                vec![0, 0],
                vec![0, 1],
                vec![1, 0],
                vec![1, 1],
                vec![2, 0],
                vec![2, 1],
            ]
        );
        assert!(perms.is_exhausted());
    }

    #[test]
    fn test_permutation_empty_dims_yield_single_root() {
        let mut perms = PermutationState::new(vec![]);
        assert_eq!(perms.advance(), Some(vec![]));
        assert_eq!(perms.advance(), None);
    }

    #[test]
    fn test_permutation_zero_dim_is_infeasible() {
        let mut perms = PermutationState::new(vec![3, 0]);
        assert_eq!(perms.advance(), None);
    }
}
