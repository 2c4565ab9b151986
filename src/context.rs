use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{FillError, Result};
use crate::grid::{Grid, SlotId};
use crate::section::{decompose_sections, match_sections, Section, SectionId};
use crate::wordlist::WordList;

/// Tuning knobs for the fill search. The defaults are the values the search
/// was calibrated with; tests override individual fields.
#[derive(Debug, Clone)]
pub struct FillConfig {
    /// Seed for all stochastic choices; equal seeds give equal fills.
    pub seed: u64,

    /// Interactive sessions want a full ranked menu per slot; automatic fill
    /// only needs one viable candidate before committing.
    pub interactive: bool,

    /// Longest slot that may be completed with provisional, non-dictionary
    /// letters. Zero disables relaxation entirely.
    pub iffy_max_length: usize,

    /// Run the exhaustive depth-3 feasibility pass once this few incomplete
    /// slots remain.
    pub depth_threshold: usize,

    /// Squares with at least this many viable letters are not worth
    /// broadening into concrete patterns.
    pub broaden_viable_cutoff: usize,

    /// Hard cap on the pattern fan-out per anchor combo.
    pub max_broadened_patterns: usize,

    /// Backtracks through a chain node before it is promoted to a regular
    /// search node and the chain is abandoned.
    pub backtrack_threshold: u32,

    /// Completions credited to one chain base before the search is forced
    /// elsewhere for diversity.
    pub chain_good_cap: u32,
    pub chain_iffy_cap: u32,

    /// Section candidates to collect before a section's search is parked.
    pub section_candidate_target: usize,
}

impl Default for FillConfig {
    fn default() -> FillConfig {
        FillConfig {
            seed: 0,
            interactive: false,
            iffy_max_length: 5,
            depth_threshold: 8,
            broaden_viable_cutoff: 6,
            max_broadened_patterns: 12,
            backtrack_threshold: 3,
            chain_good_cap: 4,
            chain_iffy_cap: 24,
            section_candidate_target: 1,
        }
    }
}

impl FillConfig {
    pub fn candidate_floor(&self, interactive: bool) -> usize {
        if interactive {
            100
        } else {
            1
        }
    }
}

/// Everything a fill session shares across search steps: the dictionary, the
/// grid being filled, its section decomposition, and the seeded RNG.
pub struct SearchContext {
    pub word_list: WordList,
    pub config: FillConfig,
    pub rng: StdRng,
    pub grid: Grid,
    pub sections: Vec<Section>,
    pub active_section: Option<SectionId>,
    pub selected_slot: Option<SlotId>,
    next_section_id: SectionId,
}

impl SearchContext {
    pub fn new(word_list: WordList, grid: Grid, config: FillConfig) -> Result<SearchContext> {
        if word_list.is_empty() {
            return Err(FillError::DictionaryUnavailable);
        }

        let rng = StdRng::seed_from_u64(config.seed);
        let mut ctx = SearchContext {
            word_list,
            config,
            rng,
            grid,
            sections: vec![],
            active_section: None,
            selected_slot: None,
            next_section_id: 0,
        };
        ctx.grid.init_viable_letters(&ctx.word_list);
        ctx.regenerate_sections();
        Ok(ctx)
    }

    /// Replace the working grid (an undo/redo step or an external edit) and
    /// re-derive sections, preserving the identity of any whose member
    /// squares are unchanged.
    pub fn set_active_grid(&mut self, grid: Grid) {
        self.grid = grid;
        self.grid.init_viable_letters(&self.word_list);
        self.regenerate_sections();
    }

    pub fn regenerate_sections(&mut self) {
        let fresh = decompose_sections(&self.grid, &self.word_list);
        let matched = match_sections(fresh, &self.sections, &mut self.next_section_id);
        debug!(
            "sections regenerated: {} section(s), ids {:?}",
            matched.len(),
            matched.iter().map(|s| s.id).collect::<Vec<_>>()
        );
        self.sections = matched;

        if let Some(active) = self.active_section {
            if self.section(active).is_none() {
                self.active_section = None;
            }
        }
    }

    pub fn section(&self, id: SectionId) -> Option<&Section> {
        self.sections.iter().find(|section| section.id == id)
    }

    pub fn section_mut(&mut self, id: SectionId) -> Option<&mut Section> {
        self.sections.iter_mut().find(|section| section.id == id)
    }

    pub fn active_grid(&self) -> &Grid {
        &self.grid
    }

    pub fn select_slot(&mut self, slot: Option<SlotId>) {
        self.selected_slot = slot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;

    fn open_grid() -> Grid {
        Grid::from_template(
            "
            .....
            .....
            .....
            .....
            .....
            ",
        )
        .expect("template")
    }

    #[test]
    fn test_new_context_decomposes_sections() {
        let list = WordList::load("abcde;50\nfghij;50").expect("load");
        let ctx = SearchContext::new(list, open_grid(), FillConfig::default()).expect("context");

        assert_eq!(ctx.sections.len(), 1);
        assert_eq!(ctx.sections[0].open_squares.len(), 9);
    }

    #[test]
    fn test_set_active_grid_keeps_section_identity() {
        let list = WordList::load("abcde;50\nfghij;50").expect("load");
        let mut ctx =
            SearchContext::new(list, open_grid(), FillConfig::default()).expect("context");
        let original_id = ctx.sections[0].id;

        ctx.set_active_grid(open_grid());

        assert_eq!(ctx.sections.len(), 1);
        assert_eq!(ctx.sections[0].id, original_id);
    }

    #[test]
    fn test_equal_seeds_share_random_streams() {
        use rand::Rng;

        let list = WordList::load("abcde;50").expect("load");
        let config = FillConfig {
            seed: 99,
            ..FillConfig::default()
        };
        let mut a =
            SearchContext::new(list.clone(), open_grid(), config.clone()).expect("context");
        let mut b = SearchContext::new(list, open_grid(), config).expect("context");

        let draws_a: Vec<u64> = (0..8).map(|_| a.rng.gen()).collect();
        let draws_b: Vec<u64> = (0..8).map(|_| b.rng.gen()).collect();
        assert_eq!(draws_a, draws_b);
    }
}
