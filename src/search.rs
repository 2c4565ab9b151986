use std::collections::{BinaryHeap, BTreeMap};

use instant::{Duration, Instant};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::Rng;

use crate::candidates::{generate_candidates, AnchorState, EntryCandidate};
use crate::context::SearchContext;
use crate::error::{FillError, Result};
use crate::grid::{Grid, Provenance, SlotId};
use crate::section::{Section, SectionCandidate, SectionId};
use crate::wordlist::WordList;

/// Index into a section search's node arena.
pub type NodeId = usize;

/// Priority bonus per depth level for nodes on the currently-active chain:
/// chains dive depth-first toward a completed section.
const CHAIN_DEPTH_BONUS: i64 = 40;

/// Smaller per-depth bonus for nodes descending from a section base, and the
/// penalty applied to everything off-chain, which biases recovery toward
/// shallow, cheap-to-revise states.
const BASE_DEPTH_BONUS: i64 = 10;
const DEPTH_PENALTY: i64 = 5;

/// One state in the search tree: a target slot, the grid as it looked on
/// arrival, and the grid after this node's chosen entry was committed. Nodes
/// own both snapshots outright, so backtracking is a cheap pointer move up
/// the arena rather than an undo log.
#[derive(Debug, Clone)]
pub struct FillNode {
    pub slot: SlotId,
    pub start_grid: Grid,
    pub end_grid: Grid,

    pub candidates: Vec<EntryCandidate>,
    pub chosen: Option<usize>,
    pub anchors: Option<AnchorState>,

    pub parent: Option<NodeId>,
    pub depth: u32,
    pub backtracks: u32,

    /// Chain nodes ride a depth-first streak; `chain_id` says which streak,
    /// and a mismatch with the engine's counter means the streak was
    /// abandoned and this node reverts to ordinary scheduling.
    pub is_chain: bool,
    pub chain_id: u64,

    /// The node this chain descends from; None means this node is its own
    /// base. Completion credit accrues at the base.
    pub chain_base: Option<NodeId>,
    pub good_completions: u32,
    pub iffy_completions: u32,

    /// The single slot (if any) already carrying provisional non-dictionary
    /// letters along this line of the search.
    pub iffy_slot: Option<SlotId>,

    /// Neighbor sections whose cached fills were baked into this line's
    /// starting grid.
    pub included_sections: Vec<SectionId>,

    pub dead: bool,
}

impl FillNode {
    pub fn root(grid: Grid, slot: SlotId) -> FillNode {
        FillNode {
            slot,
            start_grid: grid.clone(),
            end_grid: grid,
            candidates: vec![],
            chosen: None,
            anchors: None,
            parent: None,
            depth: 0,
            backtracks: 0,
            is_chain: false,
            chain_id: 0,
            chain_base: None,
            good_completions: 0,
            iffy_completions: 0,
            iffy_slot: None,
            included_sections: vec![],
            dead: false,
        }
    }
}

/// Max-heap entry; stale priorities are tolerated and re-checked lazily at
/// pop time instead of being rewritten in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapEntry {
    priority: i64,
    node: NodeId,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.priority, self.node).cmp(&(other.priority, other.node))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionState {
    Seeding,
    Expanding,
    Succeeded,
    Exhausted,
}

/// The per-section search: a node arena, the scheduling heap over it, and
/// the odometer enumerating neighbor-candidate combinations for seeding new
/// root nodes.
pub struct SectionSearch {
    section: SectionId,
    state: SectionState,
    nodes: Vec<FillNode>,
    heap: BinaryHeap<HeapEntry>,
    perms: crate::section::PermutationState,
    neighbor_ids: Vec<SectionId>,
    neighbor_candidates: Vec<Vec<SectionCandidate>>,
}

impl SectionSearch {
    fn new(section: &Section, all: &[Section]) -> SectionSearch {
        let mut neighbor_ids = vec![];
        let mut neighbor_candidates: Vec<Vec<SectionCandidate>> = vec![];

        for &id in &section.neighbors {
            if let Some(neighbor) = all.iter().find(|other| other.id == id) {
                if !neighbor.candidates.is_empty() {
                    neighbor_ids.push(id);
                    neighbor_candidates.push(neighbor.candidates.values().cloned().collect());
                }
            }
        }

        let dims = neighbor_candidates.iter().map(Vec::len).collect();
        SectionSearch {
            section: section.id,
            state: SectionState::Seeding,
            nodes: vec![],
            heap: BinaryHeap::new(),
            perms: crate::section::PermutationState::new(dims),
            neighbor_ids,
            neighbor_candidates,
        }
    }
}

/// Fill statistics for a session, in the spirit of a profiler readout.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    pub states: u64,
    pub backtracks: u64,
    pub chain_promotions: u64,
    pub candidates_captured: u64,
    pub duration: Duration,
}

/// The incremental fill engine. Each call to [`FillEngine::fill_section_word`]
/// performs one unit of work -- seeding a root, committing one word, or
/// backtracking once -- so a caller can interleave fill steps with anything
/// else on its thread.
pub struct FillEngine {
    searches: BTreeMap<SectionId, SectionSearch>,
    chain_id: u64,
    started: Instant,
    pub stats: Statistics,
}

impl Default for FillEngine {
    fn default() -> FillEngine {
        FillEngine::new()
    }
}

impl FillEngine {
    pub fn new() -> FillEngine {
        FillEngine {
            searches: BTreeMap::new(),
            chain_id: 0,
            started: Instant::now(),
            stats: Statistics::default(),
        }
    }

    pub fn section_state(&self, id: SectionId) -> Option<SectionState> {
        self.searches.get(&id).map(|search| search.state)
    }

    /// Advance the fill by one unit of work. Returns false once no section
    /// has work left (every search succeeded or exhausted its queue).
    pub fn fill_section_word(&mut self, ctx: &mut SearchContext) -> Result<bool> {
        if ctx.word_list.is_empty() {
            return Err(FillError::DictionaryUnavailable);
        }

        let Some(section_id) = self.pick_section(ctx) else {
            self.stats.duration = self.started.elapsed();
            return Ok(false);
        };

        let mut search = match self.searches.remove(&section_id) {
            Some(search) => search,
            None => match ctx.section(section_id) {
                Some(section) => SectionSearch::new(section, &ctx.sections),
                None => return Ok(true),
            },
        };

        let result = self.step_search(ctx, &mut search);
        self.searches.insert(section_id, search);
        result
    }

    /// The section to work on: the user-activated one if it still has work,
    /// otherwise the most constrained section not yet finished.
    fn pick_section(&self, ctx: &SearchContext) -> Option<SectionId> {
        let workable = |id: SectionId| match self.searches.get(&id) {
            Some(search) => {
                matches!(search.state, SectionState::Seeding | SectionState::Expanding)
            }
            None => true,
        };

        if let Some(active) = ctx.active_section {
            if ctx.section(active).is_some() && workable(active) {
                return Some(active);
            }
        }

        ctx.sections
            .iter()
            .map(|section| section.id)
            .find(|&id| workable(id))
    }

    fn step_search(&mut self, ctx: &mut SearchContext, search: &mut SectionSearch) -> Result<bool> {
        let popped = loop {
            let Some(entry) = search.heap.pop() else {
                break None;
            };

            if search.nodes[entry.node].dead {
                continue;
            }

            // A chain node from an abandoned streak falls back to ordinary
            // scheduling; re-queue it at its demoted priority.
            let node = &search.nodes[entry.node];
            if node.is_chain && node.chain_id != self.chain_id {
                search.nodes[entry.node].is_chain = false;
                let priority =
                    node_priority(&search.nodes[entry.node], &ctx.word_list, self.chain_id);
                search.heap.push(HeapEntry {
                    priority,
                    node: entry.node,
                });
                continue;
            }

            break Some(entry.node);
        };

        match popped {
            Some(node_id) => self.expand(ctx, search, node_id),
            None => match self.seed_root(ctx, search) {
                Some(_) => {
                    search.state = SectionState::Expanding;
                    Ok(true)
                }
                None => {
                    let have_results = ctx
                        .section(search.section)
                        .map(|section| !section.candidates.is_empty())
                        .unwrap_or(false);
                    search.state = if have_results {
                        SectionState::Succeeded
                    } else {
                        warn!(
                            "section {} exhausted its search queue with no complete fill",
                            search.section
                        );
                        SectionState::Exhausted
                    };
                    Ok(true)
                }
            },
        }
    }

    /// Build the next root node from the seeding odometer: apply one
    /// combination of neighbor section candidates to a fresh copy of the
    /// working grid and target the section's most constrained open slot.
    fn seed_root(&mut self, ctx: &SearchContext, search: &mut SectionSearch) -> Option<NodeId> {
        let section = ctx.section(search.section)?;

        while let Some(combo) = search.perms.advance() {
            let mut grid = ctx.grid.clone();
            let mut included: Vec<SectionId> = vec![];
            let mut feasible = true;

            'combo: for (idx, &choice) in combo.iter().enumerate() {
                let candidate = &search.neighbor_candidates[idx][choice];
                for (slot_id, word) in &candidate.entries {
                    match entry_compatibility(&grid, *slot_id, word) {
                        Compatibility::Already => {}
                        Compatibility::Applicable => {
                            if grid
                                .insert_entry(*slot_id, word, Provenance::Autofill, &ctx.word_list)
                                .is_err()
                            {
                                feasible = false;
                                break 'combo;
                            }
                        }
                        Compatibility::Incompatible => {
                            feasible = false;
                            break 'combo;
                        }
                    }
                }
                included.push(search.neighbor_ids[idx]);
            }

            if !feasible {
                continue;
            }

            let Some(target) = section
                .slots
                .iter()
                .copied()
                .find(|&id| !grid.slot_is_complete(id))
            else {
                continue;
            };

            let mut root = FillNode::root(grid, target);
            root.chain_id = self.chain_id;
            root.included_sections = included;

            let node_id = search.nodes.len();
            let priority = node_priority(&root, &ctx.word_list, self.chain_id);
            search.nodes.push(root);
            search.heap.push(HeapEntry { priority, node: node_id });
            debug!(
                "seeded root node {} for section {} targeting {}",
                node_id, search.section, target
            );
            return Some(node_id);
        }

        None
    }

    /// Expand one node: make sure it has candidates, pick one by weighted
    /// draw, commit it, and either capture a finished section fill or spawn
    /// the next chain node.
    fn expand(
        &mut self,
        ctx: &mut SearchContext,
        search: &mut SectionSearch,
        node_id: NodeId,
    ) -> Result<bool> {
        let has_selectable = search.nodes[node_id]
            .candidates
            .iter()
            .any(|c| c.viable && !c.failed && !c.chained_away);
        let can_generate = search.nodes[node_id]
            .anchors
            .as_ref()
            .map(|anchors| !anchors.remaining.is_empty())
            .unwrap_or(true);

        if !has_selectable && can_generate {
            let interactive = ctx.config.interactive;
            let SearchContext {
                word_list,
                config,
                rng,
                ..
            } = ctx;
            generate_candidates(word_list, config, rng, &mut search.nodes[node_id], interactive);
        }

        match select_candidate(&mut ctx.rng, &search.nodes[node_id]) {
            Some(choice) => self.commit(ctx, search, node_id, choice),
            None => {
                if let Some(choice) = self.relax_own_slot(ctx, search, node_id) {
                    return self.commit(ctx, search, node_id, choice);
                }
                self.backtrack(ctx, search, node_id);
                Ok(true)
            }
        }
    }

    /// Last resort before declaring a node dead: if its own slot is short
    /// enough and no slot along this line is relaxed yet, complete it with
    /// provisional best-effort letters.
    fn relax_own_slot(
        &mut self,
        ctx: &SearchContext,
        search: &mut SectionSearch,
        node_id: NodeId,
    ) -> Option<usize> {
        let node = &search.nodes[node_id];
        if node.iffy_slot.is_some() || ctx.config.iffy_max_length == 0 {
            return None;
        }

        let length = node.start_grid.slot(node.slot)?.length;
        if length > ctx.config.iffy_max_length {
            return None;
        }

        let word = crate::candidates::best_effort_fill(&node.start_grid, node.slot)?;
        if node.candidates.iter().any(|c| c.word == word) {
            return None;
        }

        debug!("relaxing {} with provisional letters {:?}", node.slot, word);
        let slot = node.slot;
        search.nodes[node_id].candidates.push(EntryCandidate {
            word: word.clone(),
            score: 0.0,
            viable: true,
            failed: false,
            chained_away: false,
            iffy_slot: Some(slot),
            iffy_letters: Some(word),
            cross_total: 0.0,
            cross_min: 0.0,
        });
        Some(search.nodes[node_id].candidates.len() - 1)
    }

    fn commit(
        &mut self,
        ctx: &mut SearchContext,
        search: &mut SectionSearch,
        node_id: NodeId,
        choice: usize,
    ) -> Result<bool> {
        let node_slot = search.nodes[node_id].slot;
        let (word, cand_iffy_slot, iffy_letters) = {
            let candidate = &search.nodes[node_id].candidates[choice];
            (
                candidate.word.clone(),
                candidate.iffy_slot,
                candidate.iffy_letters.clone(),
            )
        };

        let mut end = search.nodes[node_id].start_grid.clone();
        if cand_iffy_slot == Some(node_slot) {
            // The target slot itself is being relaxed: provisional letters,
            // no dictionary registration.
            end.write_letters(node_slot, &word, Provenance::Autofill)?;
        } else {
            end.insert_entry(node_slot, &word, Provenance::Autofill, &ctx.word_list)?;
            if let (Some(iffy_id), Some(letters)) = (cand_iffy_slot, iffy_letters.as_ref()) {
                end.write_letters(iffy_id, letters, Provenance::Autofill)?;
            }
        }

        {
            let node = &mut search.nodes[node_id];
            node.end_grid = end;
            node.chosen = Some(choice);
            if cand_iffy_slot.is_some() {
                node.iffy_slot = cand_iffy_slot;
            }
        }
        self.stats.states += 1;
        debug!("committed {:?} into {}", word, node_slot);

        let Some(section) = ctx.section(search.section) else {
            return Ok(true);
        };

        // A fill is complete only when every member slot is written through,
        // bridging slots included; their far ends lie outside the member
        // squares, so lettered squares alone are not enough.
        let all_slots_written = section
            .slots
            .iter()
            .all(|&id| search.nodes[node_id].end_grid.slot_is_complete(id));

        if let Some(letters) = section
            .canonical_letters(&search.nodes[node_id].end_grid)
            .filter(|_| all_slots_written)
        {
            let entries: Vec<(SlotId, String)> = section
                .slots
                .iter()
                .filter_map(|&id| {
                    search.nodes[node_id]
                        .end_grid
                        .letters_for_slot(id)
                        .ok()
                        .map(|entry| (id, entry))
                })
                .collect();
            let iffy = search.nodes[node_id].iffy_slot.is_some();
            let included = search.nodes[node_id].included_sections.clone();
            let base_id = search.nodes[node_id].chain_base.unwrap_or(node_id);
            let target = ctx.config.section_candidate_target;

            let Some(section) = ctx.section_mut(search.section) else {
                return Ok(true);
            };
            if !section.candidates.contains_key(&letters) {
                info!(
                    "section {} completed{}: {} entries",
                    search.section,
                    if iffy { " (iffy)" } else { "" },
                    entries.len()
                );
                section.candidates.insert(
                    letters.clone(),
                    SectionCandidate {
                        letters,
                        entries,
                        included_sections: included,
                        iffy,
                    },
                );
                self.stats.candidates_captured += 1;

                let base = &mut search.nodes[base_id];
                if iffy {
                    base.iffy_completions += 1;
                } else {
                    base.good_completions += 1;
                }
            }
            let enough = section.candidates.len() >= target;

            // The streak paid off; abandon it so the queue's breadth decides
            // where the next fill comes from.
            self.chain_id += 1;
            if enough {
                search.state = SectionState::Succeeded;
            }
            return Ok(true);
        }

        let Some(next) = next_target(section, &search.nodes[node_id].end_grid, node_slot) else {
            return Ok(true);
        };

        // Completion credit caps force the search onto a different line once
        // one base has produced enough fills.
        let base_id = search.nodes[node_id].chain_base.unwrap_or(node_id);
        let (good, iffy_count) = {
            let base = &search.nodes[base_id];
            (base.good_completions, base.iffy_completions)
        };
        let mut chain_base = Some(base_id);
        if good >= ctx.config.chain_good_cap || iffy_count >= ctx.config.chain_iffy_cap {
            self.chain_id += 1;
            chain_base = None;
        }

        let parent = &search.nodes[node_id];
        let child = FillNode {
            slot: next,
            start_grid: parent.end_grid.clone(),
            end_grid: parent.end_grid.clone(),
            candidates: vec![],
            chosen: None,
            anchors: None,
            parent: Some(node_id),
            depth: parent.depth + 1,
            backtracks: 0,
            is_chain: true,
            chain_id: self.chain_id,
            chain_base,
            good_completions: 0,
            iffy_completions: 0,
            iffy_slot: parent.iffy_slot,
            included_sections: parent.included_sections.clone(),
            dead: false,
        };

        let child_id = search.nodes.len();
        let priority = node_priority(&child, &ctx.word_list, self.chain_id);
        search.nodes.push(child);
        search.heap.push(HeapEntry {
            priority,
            node: child_id,
        });
        Ok(true)
    }

    /// A node with nothing left to try dies, and its parent's committed
    /// choice is withdrawn so the parent can try something else.
    fn backtrack(&mut self, ctx: &SearchContext, search: &mut SectionSearch, node_id: NodeId) {
        self.stats.backtracks += 1;
        let was_chain = search.nodes[node_id].is_chain;
        search.nodes[node_id].dead = true;
        debug!("dead end at node {} ({})", node_id, search.nodes[node_id].slot);

        if let Some(parent) = search.nodes[node_id].parent {
            self.invalidate(ctx, search, parent, was_chain);
        }
    }

    /// Withdraw a node's committed choice. Failures during a chain only bar
    /// the entry for the rest of that chain; first-attempt failures bar it
    /// permanently. A node backtracked past the threshold is promoted out of
    /// chain mode, the streak is abandoned, and the invalidation continues
    /// up through any chain ancestors.
    fn invalidate(
        &mut self,
        ctx: &SearchContext,
        search: &mut SectionSearch,
        node_id: NodeId,
        failed_during_chain: bool,
    ) {
        let (parent, promoted) = {
            let node = &mut search.nodes[node_id];
            if let Some(chosen) = node.chosen.take() {
                if failed_during_chain {
                    node.candidates[chosen].chained_away = true;
                } else {
                    node.candidates[chosen].failed = true;
                }
            }
            node.end_grid = node.start_grid.clone();
            node.backtracks += 1;

            let promoted = node.is_chain && node.backtracks > ctx.config.backtrack_threshold;
            if promoted {
                node.is_chain = false;
                for candidate in &mut node.candidates {
                    candidate.chained_away = false;
                }
            }
            (node.parent, promoted)
        };

        if promoted {
            self.chain_id += 1;
            self.stats.chain_promotions += 1;
            debug!("node {} promoted out of chain mode", node_id);
        }

        let priority = node_priority(&search.nodes[node_id], &ctx.word_list, self.chain_id);
        search.heap.push(HeapEntry { priority, node: node_id });

        if promoted {
            if let Some(parent_id) = parent {
                if search.nodes[parent_id].is_chain {
                    self.invalidate(ctx, search, parent_id, true);
                }
            }
        }
    }

    /// Write each finished section's best cached fill into the working grid:
    /// non-iffy candidates first, skipping any that no longer fit what other
    /// sections committed.
    pub fn commit_results(&mut self, ctx: &mut SearchContext) -> Result<()> {
        let snapshots: Vec<(SectionId, Vec<SectionCandidate>)> = ctx
            .sections
            .iter()
            .map(|section| {
                let mut ranked: Vec<SectionCandidate> =
                    section.candidates.values().cloned().collect();
                ranked.sort_by_key(|candidate| candidate.iffy);
                (section.id, ranked)
            })
            .collect();

        {
            let SearchContext {
                grid, word_list, ..
            } = ctx;

            for (id, ranked) in snapshots {
                for candidate in ranked {
                    if apply_candidate(grid, word_list, &candidate)? {
                        grid.mark_section_chosen(&candidate.letters);
                        info!("committed a fill for section {}", id);
                        break;
                    }
                }
            }
        }

        ctx.regenerate_sections();
        self.stats.duration = self.started.elapsed();
        Ok(())
    }
}

enum Compatibility {
    /// The slot already holds exactly this word.
    Already,
    Applicable,
    Incompatible,
}

fn entry_compatibility(grid: &Grid, slot_id: SlotId, word: &str) -> Compatibility {
    let Ok(pattern) = grid.letters_for_slot(slot_id) else {
        return Compatibility::Incompatible;
    };
    if pattern == word {
        return Compatibility::Already;
    }
    if pattern.len() != word.len() || grid.used_words().contains(word) {
        return Compatibility::Incompatible;
    }

    let fits = pattern
        .chars()
        .zip(word.chars())
        .all(|(have, want)| have == '.' || have == want);
    if fits {
        Compatibility::Applicable
    } else {
        Compatibility::Incompatible
    }
}

fn apply_candidate(grid: &mut Grid, word_list: &WordList, candidate: &SectionCandidate) -> Result<bool> {
    for (slot_id, word) in &candidate.entries {
        if matches!(
            entry_compatibility(grid, *slot_id, word),
            Compatibility::Incompatible
        ) {
            return Ok(false);
        }
    }

    for (slot_id, word) in &candidate.entries {
        if matches!(
            entry_compatibility(grid, *slot_id, word),
            Compatibility::Applicable
        ) {
            grid.insert_entry(*slot_id, word, Provenance::ChosenSection, word_list)?;
        }
    }
    Ok(true)
}

/// The next slot a chain should fill after committing into `just_filled`:
/// an incomplete crossing slot if there is one, otherwise the section's next
/// incomplete slot in fill order.
fn next_target(section: &Section, grid: &Grid, just_filled: SlotId) -> Option<SlotId> {
    let crossing = grid
        .squares_for_slot(just_filled)
        .ok()
        .and_then(|squares| {
            squares
                .iter()
                .filter_map(|&coord| grid.crossing_slot(coord, just_filled.dir))
                .find(|&id| section.contains_slot(id) && !grid.slot_is_complete(id))
        });

    crossing.or_else(|| {
        section
            .slots
            .iter()
            .copied()
            .find(|&id| !grid.slot_is_complete(id))
    })
}

/// Scheduling priority: the quality-weight sum of every completed entry in
/// the node's starting grid, plus a situational term that favors the active
/// chain, then section bases, and penalizes depth everywhere else.
fn node_priority(node: &FillNode, word_list: &WordList, current_chain: u64) -> i64 {
    let placed: f64 = node
        .start_grid
        .slots()
        .filter_map(|slot| {
            let letters = node.start_grid.letters_for_slot(slot.id).ok()?;
            if letters.contains('.') {
                return None;
            }
            word_list.quality(&letters).map(|quality| quality.weight())
        })
        .sum();

    let situational = if node.is_chain && node.chain_id == current_chain {
        CHAIN_DEPTH_BONUS * node.depth as i64
    } else if node.chain_base.is_none() {
        BASE_DEPTH_BONUS * node.depth as i64
    } else {
        -(DEPTH_PENALTY * node.depth as i64)
    };

    (placed * 10.0) as i64 + situational
}

/// Weighted draw over a node's selectable candidates, with each weight the
/// fourth power of the score relative to the best. Good entries dominate
/// without making the fill deterministic.
fn select_candidate(rng: &mut StdRng, node: &FillNode) -> Option<usize> {
    let selectable: Vec<(usize, f64)> = node
        .candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.viable && !c.failed && !c.chained_away)
        .map(|(idx, c)| (idx, c.score))
        .collect();

    if selectable.is_empty() {
        return None;
    }

    let best = selectable.iter().map(|&(_, score)| score).fold(f64::MIN, f64::max);
    if best <= 0.0 {
        return Some(selectable[0].0);
    }

    let weights: Vec<f64> = selectable
        .iter()
        .map(|&(_, score)| (score / best).powi(4))
        .collect();
    let total: f64 = weights.iter().sum();

    let mut draw = rng.gen::<f64>() * total;
    for (pos, &(idx, _)) in selectable.iter().enumerate() {
        draw -= weights[pos];
        if draw <= 0.0 {
            return Some(idx);
        }
    }
    selectable.last().map(|&(idx, _)| idx)
}

/// The ranked candidate menu for one slot, for an interactive caller that
/// wants to choose a word by hand. Runs a single full-floor generation pass
/// against the current grid without touching any section search. With no
/// explicit slot, the context's current selection is used.
pub fn populate_manual_entry_candidates(
    ctx: &mut SearchContext,
    slot: Option<SlotId>,
) -> Result<Vec<EntryCandidate>> {
    if ctx.word_list.is_empty() {
        return Err(FillError::DictionaryUnavailable);
    }
    let slot_id = slot
        .or(ctx.selected_slot)
        .ok_or(FillError::NoSlotSelected)?;
    if ctx.grid.slot(slot_id).is_none() {
        return Err(FillError::NoSuchSlot(slot_id));
    }

    let mut node = FillNode::root(ctx.grid.clone(), slot_id);
    let SearchContext {
        word_list,
        config,
        rng,
        ..
    } = ctx;
    generate_candidates(word_list, config, rng, &mut node, true);

    let mut menu = node.candidates;
    menu.retain(|candidate| candidate.viable);
    Ok(menu)
}

/// Drive the engine until nothing is left to do (or the step limit is hit),
/// then write the results into the working grid. Returns whether the grid
/// ended up completely filled.
pub fn run_to_completion(
    engine: &mut FillEngine,
    ctx: &mut SearchContext,
    max_steps: u64,
) -> Result<bool> {
    let mut steps = 0u64;
    while engine.fill_section_word(ctx)? {
        steps += 1;
        if steps >= max_steps {
            warn!("fill stopped after {} steps", steps);
            break;
        }
    }

    engine.commit_results(ctx)?;
    Ok(ctx.grid.is_complete())
}
