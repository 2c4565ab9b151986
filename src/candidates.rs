use std::cmp::Ordering;
use std::collections::HashSet;

use itertools::Itertools;
use log::trace;
use rand::rngs::StdRng;
use rand::Rng;

use crate::context::FillConfig;
use crate::grid::{Grid, Provenance, SlotId};
use crate::search::FillNode;
use crate::wordlist::{Quality, WordList};
use crate::{GridCoord, LetterSet, LETTER_FREQUENCIES};

/// A word that could be committed into a node's target slot, with everything
/// the scheduler needs to pick between candidates and to remember why one
/// was abandoned.
#[derive(Debug, Clone)]
pub struct EntryCandidate {
    pub word: String,
    pub score: f64,
    pub viable: bool,

    /// Permanently excluded: it failed on a first, un-chained attempt.
    pub failed: bool,

    /// Excluded only for the current chain; cleared when the node is
    /// promoted out of chain mode.
    pub chained_away: bool,

    /// The crossing slot this candidate leaves without a dictionary-valid
    /// word, if any, and the best-effort letters recorded for it.
    pub iffy_slot: Option<SlotId>,
    pub iffy_letters: Option<String>,

    /// Per-pass cross-slot viable-entry totals driving the score.
    pub cross_total: f64,
    pub cross_min: f64,
}

impl EntryCandidate {
    /// A candidate for a slot that is already fully committed; the only
    /// "choice" is the word that's there.
    fn committed(word: String) -> EntryCandidate {
        EntryCandidate {
            word,
            score: 0.0,
            viable: true,
            failed: false,
            chained_away: false,
            iffy_slot: None,
            iffy_letters: None,
            cross_total: 0.0,
            cross_min: 0.0,
        }
    }
}

/// Anchor-enumeration progress for a node: which two squares of the target
/// slot were picked as anchors (by index within the slot), and the letter
/// pairs not yet tried, ordered so that `pop` yields uncommon pairs first.
#[derive(Debug, Clone)]
pub struct AnchorState {
    pub cells: (usize, usize),
    pub remaining: Vec<(char, char)>,
}

/// Generate scored, constraint-validated candidates for the node's target
/// slot, resuming from wherever anchor enumeration last stopped. Returns
/// false only when the dictionary can offer nothing viable; the caller
/// decides whether the slot can become the node's iffy slot or whether the
/// node is dead.
pub fn generate_candidates(
    word_list: &WordList,
    config: &FillConfig,
    rng: &mut StdRng,
    node: &mut FillNode,
    interactive: bool,
) -> bool {
    let slot_id = node.slot;
    let squares = match node.start_grid.squares_for_slot(slot_id) {
        Ok(squares) => squares,
        Err(_) => return false,
    };
    let pattern = match node.start_grid.letters_for_slot(slot_id) {
        Ok(pattern) => pattern,
        Err(_) => return false,
    };

    if !pattern.contains('.') {
        if node.candidates.is_empty() {
            node.candidates.push(EntryCandidate::committed(pattern));
        }
        return true;
    }

    if node.anchors.is_none() {
        node.anchors = Some(select_anchors(&node.start_grid, &squares, rng));
    }

    let floor = config.candidate_floor(interactive);
    let mut seen: HashSet<String> = node
        .candidates
        .iter()
        .map(|candidate| candidate.word.clone())
        .collect();

    loop {
        let viable_now = node
            .candidates
            .iter()
            .filter(|c| c.viable && !c.failed && !c.chained_away && c.iffy_slot.is_none())
            .count();
        if viable_now >= floor {
            break;
        }

        let (cells, combo) = {
            let anchors = match node.anchors.as_mut() {
                Some(anchors) => anchors,
                None => break,
            };
            match anchors.remaining.pop() {
                Some(combo) => (anchors.cells, combo),
                None => break,
            }
        };

        let patterns = broaden(config, &node.start_grid, &squares, &pattern, cells, combo);

        let mut words: Vec<String> = vec![];
        for broadened in &patterns {
            for word in word_list.query(broadened) {
                if seen.contains(word)
                    || node.start_grid.used_words().contains(word)
                    || word_list.quality(word) == Some(Quality::NotAThing)
                {
                    continue;
                }
                seen.insert(word.to_string());
                words.push(word.to_string());
            }
        }

        trace!(
            "slot {}: combo {:?} broadened into {} pattern(s), {} new word(s)",
            slot_id,
            combo,
            patterns.len(),
            words.len()
        );

        let mut fresh: Vec<EntryCandidate> = words
            .into_iter()
            .map(|word| {
                evaluate_entry(
                    word_list,
                    config,
                    &node.start_grid,
                    node.iffy_slot,
                    slot_id,
                    &squares,
                    word,
                )
            })
            .collect();
        node.candidates.append(&mut fresh);
    }

    score_candidates(word_list, &mut node.candidates);
    node.candidates.sort_by(|a, b| {
        b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal)
    });

    node.candidates
        .iter()
        .any(|c| c.viable && !c.failed && !c.chained_away)
}

/// Pick the two squares of the slot with the fewest currently-viable
/// letters, and enumerate their letter pairs ordered by frequency product
/// with random jitter. Uncommon pairs go first (consumed from the back of
/// `remaining`), which keeps dictionary result sets small and varies the
/// fill between runs.
fn select_anchors(grid: &Grid, squares: &[GridCoord], rng: &mut StdRng) -> AnchorState {
    let letters_for = |&(row, col): &GridCoord| -> LetterSet {
        let square = grid.square(row, col);
        match square.content {
            Some(letter) => LetterSet::singleton(letter),
            None => square.viable.unwrap_or_else(LetterSet::full),
        }
    };

    let mut by_constraint: Vec<(usize, usize)> = squares
        .iter()
        .map(|coord| letters_for(coord).count())
        .enumerate()
        .map(|(idx, count)| (count, idx))
        .collect();
    by_constraint.sort();

    let cells = (by_constraint[0].1, by_constraint[1].1);
    let first: Vec<char> = letters_for(&squares[cells.0]).iter().collect();
    let second: Vec<char> = letters_for(&squares[cells.1]).iter().collect();

    let frequency = |letter: char| LETTER_FREQUENCIES[(letter as u8 - b'a') as usize];

    let mut keyed: Vec<((char, char), f64)> = first
        .iter()
        .cartesian_product(second.iter())
        .map(|(&a, &b)| {
            let jitter = 0.5 + rng.gen::<f64>();
            ((a, b), frequency(a) * frequency(b) * jitter)
        })
        .collect();

    // Descending by key, so popping from the back consumes ascending.
    keyed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    AnchorState {
        cells,
        remaining: keyed.into_iter().map(|(combo, _)| combo).collect(),
    }
}

/// Build the anchored pattern for a combo and broaden it by substituting
/// concrete letters into further tightly-constrained squares, up to the
/// fan-out caps.
fn broaden(
    config: &FillConfig,
    grid: &Grid,
    squares: &[GridCoord],
    pattern: &str,
    cells: (usize, usize),
    combo: (char, char),
) -> Vec<String> {
    let mut base: Vec<char> = pattern.chars().collect();
    base[cells.0] = combo.0;
    base[cells.1] = combo.1;

    let mut open_positions: Vec<(usize, LetterSet)> = squares
        .iter()
        .enumerate()
        .filter(|&(idx, _)| idx != cells.0 && idx != cells.1)
        .filter_map(|(idx, &(row, col))| {
            let square = grid.square(row, col);
            match square.content {
                Some(_) => None,
                None => Some((idx, square.viable.unwrap_or_else(LetterSet::full))),
            }
        })
        .collect();
    open_positions.sort_by_key(|&(idx, set)| (set.count(), idx));

    let mut patterns: Vec<Vec<char>> = vec![base];
    for (idx, set) in open_positions {
        if set.is_empty() {
            return vec![];
        }
        if set.count() >= config.broaden_viable_cutoff
            || patterns.len() * set.count() > config.max_broadened_patterns
        {
            break;
        }

        patterns = patterns
            .into_iter()
            .flat_map(|chars| {
                set.iter().map(move |letter| {
                    let mut broadened = chars.clone();
                    broadened[idx] = letter;
                    broadened
                })
            })
            .collect();
    }

    patterns
        .into_iter()
        .map(|chars| chars.into_iter().collect())
        .collect()
}

/// Validate one dictionary word against every crossing slot and compute its
/// cross-entry totals. A crossing slot whose matches go to zero rejects the
/// word, unless that slot is (or can become) the node's single iffy slot.
fn evaluate_entry(
    word_list: &WordList,
    config: &FillConfig,
    grid: &Grid,
    node_iffy: Option<SlotId>,
    slot_id: SlotId,
    squares: &[GridCoord],
    word: String,
) -> EntryCandidate {
    let letters: Vec<char> = word.chars().collect();

    let mut total = 0.0;
    let mut min = f64::INFINITY;
    let mut iffy: Option<(SlotId, String)> = None;
    let mut viable = true;

    for (idx, &coord) in squares.iter().enumerate() {
        let Some(cross_id) = grid.crossing_slot(coord, slot_id.dir) else {
            continue;
        };
        let Ok(cross_pattern) = grid.letters_for_slot(cross_id) else {
            continue;
        };
        let Some(cross_idx) = grid.slot(cross_id).and_then(|slot| slot.index_of(coord)) else {
            continue;
        };

        // A crossing with no blanks is already settled; its letter is part of
        // the slot's own pattern, so it cannot veto the candidate.
        if !cross_pattern.contains('.') {
            continue;
        }

        let mut chars: Vec<char> = cross_pattern.chars().collect();
        chars[cross_idx] = letters[idx];
        let probe: String = chars.iter().collect();

        let count = word_list
            .query(&probe)
            .into_iter()
            .filter(|cross_word| *cross_word != word && !grid.used_words().contains(*cross_word))
            .count();

        if count == 0 {
            let already_designated = node_iffy == Some(cross_id)
                || iffy.as_ref().map(|(id, _)| *id == cross_id).unwrap_or(false);
            let can_relax = node_iffy.is_none()
                && iffy.is_none()
                && probe.len() <= config.iffy_max_length;

            if already_designated || can_relax {
                let letters = best_effort_letters(grid, cross_id, &probe);
                iffy = Some((cross_id, letters));
            } else {
                viable = false;
                break;
            }
        } else {
            total += count as f64;
            if (count as f64) < min {
                min = count as f64;
            }
        }
    }

    // When the residual search space is small, spend the extra effort on an
    // exhaustive pass: write the word into a scratch grid and re-derive the
    // viable-letter sets of crossing and cross-crossing slots.
    if viable {
        let residual = grid
            .slots()
            .filter(|slot| !grid.slot_is_complete(slot.id))
            .count();

        if residual <= config.depth_threshold {
            let mut probe_grid = grid.clone();
            if probe_grid
                .write_letters(slot_id, &word, Provenance::Autofill)
                .is_ok()
            {
                for &coord in squares {
                    let Some(cross_id) = probe_grid.crossing_slot(coord, slot_id.dir) else {
                        continue;
                    };
                    let relaxed = node_iffy == Some(cross_id)
                        || iffy.as_ref().map(|(id, _)| *id == cross_id).unwrap_or(false);
                    if relaxed {
                        continue;
                    }
                    if !probe_grid.refresh_viable_letters(word_list, cross_id, 2) {
                        viable = false;
                        break;
                    }
                }
            }
        }
    }

    let (iffy_slot, iffy_letters) = match iffy {
        Some((id, letters)) => (Some(id), Some(letters)),
        None => (None, None),
    };

    EntryCandidate {
        word,
        score: 0.0,
        viable,
        failed: false,
        chained_away: false,
        iffy_slot,
        iffy_letters,
        cross_total: total,
        cross_min: if min.is_finite() { min } else { 0.0 },
    }
}

/// Fill a crossing slot's blanks with each square's most frequent viable
/// letter, recording provisional content for an iffy slot.
fn best_effort_letters(grid: &Grid, id: SlotId, pattern: &str) -> String {
    let Ok(squares) = grid.squares_for_slot(id) else {
        return pattern.to_string();
    };

    pattern
        .chars()
        .zip(squares.iter())
        .map(|(ch, &(row, col))| {
            if ch != '.' {
                ch
            } else {
                grid.square(row, col)
                    .viable
                    .and_then(|set| set.most_frequent())
                    .unwrap_or('e')
            }
        })
        .collect()
}

/// Complete a slot's pattern with best-effort letters, used when the search
/// relaxes the slot itself.
pub(crate) fn best_effort_fill(grid: &Grid, id: SlotId) -> Option<String> {
    let pattern = grid.letters_for_slot(id).ok()?;
    Some(best_effort_letters(grid, id, &pattern))
}

/// Score = (1 + normalized total cross-entry count + normalized minimum
/// cross-entry count) x word-quality weight x a large bonus for fully-valid
/// fills, so relaxed candidates only win when nothing else is left. The
/// constant term keeps quality decisive for slots with no crossings at all.
fn score_candidates(word_list: &WordList, candidates: &mut [EntryCandidate]) {
    let max_total = candidates
        .iter()
        .map(|c| c.cross_total)
        .fold(0.0f64, f64::max)
        .max(1.0);
    let max_min = candidates
        .iter()
        .map(|c| c.cross_min)
        .fold(0.0f64, f64::max)
        .max(1.0);

    for candidate in candidates {
        let normalized = 1.0 + candidate.cross_total / max_total + candidate.cross_min / max_min;
        let quality = word_list
            .quality(&candidate.word)
            .unwrap_or(Quality::Iffy)
            .weight();
        let relaxation = if candidate.iffy_slot.is_none() { 100.0 } else { 1.0 };
        candidate.score = normalized * quality * relaxation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::search::FillNode;
    use crate::Direction;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn node_for(template: &str, list: &WordList, slot: SlotId) -> FillNode {
        let mut grid = Grid::from_template(template).expect("template");
        grid.init_viable_letters(list);
        FillNode::root(grid, slot)
    }

    #[test]
    fn test_pattern_with_wildcard_yields_both_candidates() {
        let list = WordList::load("cat;80\ncut;80").expect("load");
        let slot = SlotId::new(0, 0, Direction::Across);
        let mut node = node_for("c.t", &list, slot);

        let found = generate_candidates(&list, &FillConfig::default(), &mut rng(), &mut node, true);

        assert!(found);
        let mut words: Vec<&str> = node
            .candidates
            .iter()
            .filter(|c| c.viable)
            .map(|c| c.word.as_str())
            .collect();
        words.sort();
        assert_eq!(words, vec!["cat", "cut"]);
        // Anchor combos are exhausted once the interactive pass completes.
        assert!(node.anchors.expect("anchors chosen").remaining.is_empty());
    }

    #[test]
    fn test_dead_crossings_reject_everything() {
        // The down slot through the middle square has no dictionary matches
        // at all (there are no two-letter words), so with relaxation
        // disabled every across candidate is rejected.
        let list = WordList::load("cat;80\ncut;80").expect("load");
        let slot = SlotId::new(0, 0, Direction::Across);
        let mut node = node_for("c.t\n#.#", &list, slot);

        let config = FillConfig {
            iffy_max_length: 0,
            ..FillConfig::default()
        };
        let found = generate_candidates(&list, &config, &mut rng(), &mut node, true);

        assert!(!found);
        assert!(node.candidates.iter().all(|c| !c.viable));
    }

    #[test]
    fn test_dead_crossing_can_become_iffy_slot() {
        let list = WordList::load("cat;80\ncut;80").expect("load");
        let slot = SlotId::new(0, 0, Direction::Across);
        let mut node = node_for("c.t\n#.#", &list, slot);

        let found = generate_candidates(&list, &FillConfig::default(), &mut rng(), &mut node, true);

        assert!(found);
        let down = SlotId::new(0, 1, Direction::Down);
        for candidate in node.candidates.iter().filter(|c| c.viable) {
            assert_eq!(candidate.iffy_slot, Some(down));
            let letters = candidate.iffy_letters.as_ref().expect("provisional letters");
            assert_eq!(letters.len(), 2);
            assert!(!letters.contains('.'));
        }
    }

    #[test]
    fn test_used_words_are_excluded() {
        let list = WordList::load("cat;80\ncut;80\ncot;80").expect("load");
        let slot = SlotId::new(2, 0, Direction::Across);
        let mut node = node_for("cat\n###\n...", &list, slot);

        generate_candidates(&list, &FillConfig::default(), &mut rng(), &mut node, true);

        let words: Vec<&str> = node.candidates.iter().map(|c| c.word.as_str()).collect();
        assert!(!words.contains(&"cat"), "used word must not be offered");
        assert!(words.contains(&"cut"));
        assert!(words.contains(&"cot"));
    }

    #[test]
    fn test_fully_committed_slot_returns_its_word() {
        let list = WordList::load("cat;80\ncut;80").expect("load");
        let slot = SlotId::new(0, 0, Direction::Across);
        let mut node = node_for("cat", &list, slot);

        assert!(generate_candidates(
            &list,
            &FillConfig::default(),
            &mut rng(),
            &mut node,
            false
        ));
        assert_eq!(node.candidates.len(), 1);
        assert_eq!(node.candidates[0].word, "cat");
    }

    #[test]
    fn test_chained_away_candidates_do_not_satisfy_the_floor() {
        // A candidate barred by the current chain is unusable for selection,
        // so it must not stop the generator from mining further anchor
        // combinations.
        let list = WordList::load("cat;80\ncut;80").expect("load");
        let slot = SlotId::new(0, 0, Direction::Across);
        let mut node = node_for("c.t", &list, slot);
        node.candidates.push(EntryCandidate {
            word: "cet".to_string(),
            score: 0.0,
            viable: true,
            failed: false,
            chained_away: true,
            iffy_slot: None,
            iffy_letters: None,
            cross_total: 0.0,
            cross_min: 0.0,
        });

        let found =
            generate_candidates(&list, &FillConfig::default(), &mut rng(), &mut node, false);

        assert!(found);
        let mut words: Vec<&str> = node
            .candidates
            .iter()
            .filter(|c| c.viable && !c.chained_away)
            .map(|c| c.word.as_str())
            .collect();
        words.sort();
        assert_eq!(words, vec!["cat", "cut"]);
    }

    #[test]
    fn test_committed_crossing_does_not_veto_candidates() {
        // The across word is already committed, so the down slot's only
        // crossing is settled. The committed word must not count against
        // candidates for the down slot even though it is marked used.
        let list = WordList::load("cat;80\nate;50").expect("load");
        let slot = SlotId::new(0, 1, Direction::Down);
        let mut node = node_for("cat\n#.#\n#.#", &list, slot);

        let found = generate_candidates(&list, &FillConfig::default(), &mut rng(), &mut node, true);

        assert!(found);
        let words: Vec<&str> = node
            .candidates
            .iter()
            .filter(|c| c.viable && c.iffy_slot.is_none())
            .map(|c| c.word.as_str())
            .collect();
        assert_eq!(words, vec!["ate"]);
    }

    #[test]
    fn test_scoring_prefers_non_iffy_and_quality() {
        let list = WordList::load("cat;95\ncot;10").expect("load");
        let mut candidates = vec![
            EntryCandidate {
                word: "cot".to_string(),
                score: 0.0,
                viable: true,
                failed: false,
                chained_away: false,
                iffy_slot: None,
                iffy_letters: None,
                cross_total: 10.0,
                cross_min: 2.0,
            },
            EntryCandidate {
                word: "cat".to_string(),
                score: 0.0,
                viable: true,
                failed: false,
                chained_away: false,
                iffy_slot: Some(SlotId::new(0, 0, Direction::Down)),
                iffy_letters: Some("ca".to_string()),
                cross_total: 10.0,
                cross_min: 2.0,
            },
        ];

        score_candidates(&list, &mut candidates);

        // Iffy-quality-but-fully-valid outranks Lively-with-a-relaxed-slot:
        // the relaxation bonus dominates the quality weight.
        assert!(candidates[0].score > candidates[1].score);
        assert_eq!(candidates[0].word, "cot");
    }

    #[test]
    fn test_broaden_respects_fanout_caps() {
        let list = WordList::load("abcde;50\nfghij;50").expect("load");
        let mut grid = Grid::from_template(".....").expect("template");
        grid.init_viable_letters(&list);
        let squares = grid
            .squares_for_slot(SlotId::new(0, 0, Direction::Across))
            .expect("slot");
        let config = FillConfig::default();

        let patterns = broaden(&config, &grid, &squares, ".....", (0, 1), ('a', 'b'));

        // Each open position has two viable letters; broadening stops before
        // exceeding the pattern cap.
        assert!(!patterns.is_empty());
        assert!(patterns.len() <= config.max_broadened_patterns);
        for pattern in &patterns {
            assert!(pattern.starts_with("ab"));
        }
    }

    #[test]
    fn test_anchors_pick_most_constrained_squares() {
        let list = WordList::load("cat;80\ncut;80\ncot;80").expect("load");
        let slot = SlotId::new(0, 0, Direction::Across);
        let node = node_for("c.t", &list, slot);

        let squares = node.start_grid.squares_for_slot(slot).expect("slot");
        let anchors = select_anchors(&node.start_grid, &squares, &mut rng());

        // The two committed squares (counts of 1) beat the open middle.
        let mut cells = [anchors.cells.0, anchors.cells.1];
        cells.sort();
        assert_eq!(cells, [0, 2]);
        assert_eq!(anchors.remaining, vec![('c', 't')]);
    }
}
