use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::{self, Display, Formatter};

use log::warn;
use smallvec::SmallVec;

use crate::error::{FillError, Result};
use crate::wordlist::WordList;
use crate::{Direction, GridCoord, LetterSet, MAX_SLOT_COUNT, MAX_SLOT_LENGTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquareKind {
    White,
    Black,
}

/// Where a square's content came from. Hover-preview variants are written by
/// the UI collaborator when previewing a candidate; the engine only ever
/// writes Autofill, ChosenWord and ChosenSection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Autofill,
    UserEntered,
    ChosenWord,
    ChosenSection,
    HoverPreviewWord,
    HoverPreviewSection,
}

/// A single cell of the grid. Black squares never carry content, provenance
/// or a viable-letter set.
#[derive(Debug, Clone)]
pub struct Square {
    pub row: usize,
    pub col: usize,
    pub kind: SquareKind,
    pub content: Option<char>,
    pub provenance: Option<Provenance>,
    pub viable: Option<LetterSet>,
}

impl Square {
    pub fn is_white(&self) -> bool {
        self.kind == SquareKind::White
    }
}

/// The stable identity of a slot: its starting square plus its direction.
/// Field order matters -- the derived ordering is Across-then-Down, row-major,
/// which is the iteration order the persisted puzzle format's checksum
/// regions expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId {
    pub dir: Direction,
    pub row: usize,
    pub col: usize,
}

impl SlotId {
    pub fn new(row: usize, col: usize, dir: Direction) -> SlotId {
        SlotId { dir, row, col }
    }
}

impl Display for SlotId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let tag = match self.dir {
            Direction::Across => 'A',
            Direction::Down => 'D',
        };
        write!(f, "r{}c{}{}", self.row, self.col, tag)
    }
}

/// A maximal run of at least two contiguous white squares in one direction.
#[derive(Debug, Clone)]
pub struct Slot {
    pub id: SlotId,
    pub start: GridCoord,
    pub end: GridCoord,
    pub length: usize,
    pub number: u32,
}

impl Slot {
    /// The coords of this slot's squares, in increasing column (Across) or
    /// row (Down) order.
    pub fn squares(&self) -> SmallVec<[GridCoord; MAX_SLOT_LENGTH]> {
        (0..self.length)
            .map(|idx| match self.id.dir {
                Direction::Across => (self.start.0, self.start.1 + idx),
                Direction::Down => (self.start.0 + idx, self.start.1),
            })
            .collect()
    }

    /// The index within this slot of the square at `coord`, if any.
    pub fn index_of(&self, coord: GridCoord) -> Option<usize> {
        self.squares().iter().position(|&square| square == coord)
    }
}

/// The grid model: square matrix, slot map, and the per-grid bookkeeping the
/// search needs (used complete entries for uniqueness, user-chosen section
/// candidates). Cloning a Grid is a deep copy; every fill node owns its own
/// snapshots outright.
#[derive(Debug, Clone)]
pub struct Grid {
    pub height: usize,
    pub width: usize,
    squares: Vec<Square>,
    slots: BTreeMap<SlotId, Slot>,
    used_words: HashSet<String>,
    chosen_section_keys: BTreeSet<String>,
}

impl Grid {
    /// Parse a grid template: `#` for blocks, `.` for empty white squares,
    /// letters for themselves. Lines must all be the same width; blank lines
    /// are skipped.
    pub fn from_template(template: &str) -> Result<Grid> {
        let rows: Vec<Vec<char>> = template
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() {
                    None
                } else {
                    Some(line.chars().collect())
                }
            })
            .collect();

        if rows.is_empty() {
            return Err(FillError::MalformedTemplate("no rows".to_string()));
        }

        let width = rows[0].len();
        if rows.iter().any(|row| row.len() != width) {
            return Err(FillError::MalformedTemplate("ragged rows".to_string()));
        }

        let mut squares = Vec::with_capacity(rows.len() * width);
        for (row, line) in rows.iter().enumerate() {
            for (col, &ch) in line.iter().enumerate() {
                let square = match ch {
                    '#' => Square {
                        row,
                        col,
                        kind: SquareKind::Black,
                        content: None,
                        provenance: None,
                        viable: None,
                    },
                    '.' => Square {
                        row,
                        col,
                        kind: SquareKind::White,
                        content: None,
                        provenance: None,
                        viable: None,
                    },
                    c if c.is_ascii_alphabetic() => Square {
                        row,
                        col,
                        kind: SquareKind::White,
                        content: Some(c.to_ascii_lowercase()),
                        provenance: Some(Provenance::UserEntered),
                        viable: Some(LetterSet::singleton(c)),
                    },
                    other => {
                        return Err(FillError::MalformedTemplate(format!(
                            "unexpected character {:?} at row {} col {}",
                            other, row, col
                        )))
                    }
                };
                squares.push(square);
            }
        }

        let mut grid = Grid {
            height: rows.len(),
            width,
            squares,
            slots: BTreeMap::new(),
            used_words: HashSet::new(),
            chosen_section_keys: BTreeSet::new(),
        };
        grid.extract_words();

        // Entries completely filled by the template count against uniqueness
        // from the start.
        let complete: Vec<String> = grid
            .slots
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|id| {
                let letters = grid.letters_for_slot(id).ok()?;
                if letters.contains('.') {
                    None
                } else {
                    Some(letters)
                }
            })
            .collect();
        grid.used_words.extend(complete);

        Ok(grid)
    }

    pub fn square(&self, row: usize, col: usize) -> &Square {
        &self.squares[row * self.width + col]
    }

    fn square_mut(&mut self, row: usize, col: usize) -> &mut Square {
        let width = self.width;
        &mut self.squares[row * width + col]
    }

    pub fn squares(&self) -> impl Iterator<Item = &Square> {
        self.squares.iter()
    }

    /// Is the cell at (row, col) out of bounds or black? Signed inputs so
    /// callers can probe neighbors without bounds gymnastics.
    pub fn is_blocked(&self, row: isize, col: isize) -> bool {
        if row < 0 || col < 0 || row as usize >= self.height || col as usize >= self.width {
            return true;
        }
        !self.square(row as usize, col as usize).is_white()
    }

    /// Rebuild the slot map and square numbering from the square matrix. A
    /// checked square (one belonging to both an Across and a Down slot) gets
    /// a number when it's blocked above or to the left; an unchecked square
    /// instead needs blocking on three of its four sides.
    pub fn extract_words(&mut self) {
        self.slots.clear();

        for row in 0..self.height {
            for col in 0..self.width {
                if !self.square(row, col).is_white() {
                    continue;
                }

                for dir in [Direction::Across, Direction::Down] {
                    let (dr, dc) = match dir {
                        Direction::Across => (0isize, 1isize),
                        Direction::Down => (1, 0),
                    };

                    // A slot starts here if the previous cell is blocked and
                    // the run extends at least one more cell.
                    let starts = self.is_blocked(row as isize - dr, col as isize - dc)
                        && !self.is_blocked(row as isize + dr, col as isize + dc);
                    if !starts {
                        continue;
                    }

                    let mut length = 1;
                    while !self.is_blocked(
                        row as isize + dr * length as isize,
                        col as isize + dc * length as isize,
                    ) {
                        length += 1;
                    }

                    let end = match dir {
                        Direction::Across => (row, col + length - 1),
                        Direction::Down => (row + length - 1, col),
                    };

                    let id = SlotId::new(row, col, dir);
                    self.slots.insert(
                        id,
                        Slot {
                            id,
                            start: (row, col),
                            end,
                            length,
                            number: 0,
                        },
                    );
                }
            }
        }

        if self.slots.len() > MAX_SLOT_COUNT {
            warn!(
                "grid has {} slots (sized for {}); fills may be slow",
                self.slots.len(),
                MAX_SLOT_COUNT
            );
        }

        self.assign_numbers();
    }

    fn assign_numbers(&mut self) {
        let starts: BTreeSet<GridCoord> = self.slots.values().map(|slot| slot.start).collect();

        // How many slots pass through each square, to distinguish checked
        // from unchecked squares.
        let mut membership: BTreeMap<GridCoord, usize> = BTreeMap::new();
        for slot in self.slots.values() {
            for coord in slot.squares() {
                *membership.entry(coord).or_default() += 1;
            }
        }

        let mut next_number = 1u32;
        let mut numbered: BTreeMap<GridCoord, u32> = BTreeMap::new();

        for row in 0..self.height {
            for col in 0..self.width {
                let coord = (row, col);
                if !starts.contains(&coord) {
                    continue;
                }

                let checked = membership.get(&coord).copied().unwrap_or(0) >= 2;
                let gets_number = if checked {
                    true
                } else {
                    // Unchecked squares only get a number when blocked on
                    // three sides.
                    let blocked_sides = [(-1isize, 0isize), (1, 0), (0, -1), (0, 1)]
                        .iter()
                        .filter(|&&(dr, dc)| {
                            self.is_blocked(row as isize + dr, col as isize + dc)
                        })
                        .count();
                    blocked_sides >= 3
                };

                if gets_number {
                    numbered.insert(coord, next_number);
                    next_number += 1;
                }
            }
        }

        for slot in self.slots.values_mut() {
            slot.number = numbered.get(&slot.start).copied().unwrap_or(0);
        }
    }

    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.values()
    }

    pub fn slot(&self, id: SlotId) -> Option<&Slot> {
        self.slots.get(&id)
    }

    pub fn squares_for_slot(&self, id: SlotId) -> Result<SmallVec<[GridCoord; MAX_SLOT_LENGTH]>> {
        self.slots
            .get(&id)
            .map(|slot| slot.squares())
            .ok_or(FillError::NoSuchSlot(id))
    }

    /// The slot's letters as a pattern string, with `.` for empty squares. A
    /// fully committed slot reads back as exactly its word.
    pub fn letters_for_slot(&self, id: SlotId) -> Result<String> {
        let squares = self.squares_for_slot(id)?;
        Ok(squares
            .iter()
            .map(|&(row, col)| self.square(row, col).content.unwrap_or('.'))
            .collect())
    }

    pub fn slot_is_complete(&self, id: SlotId) -> bool {
        self.letters_for_slot(id)
            .map(|letters| !letters.contains('.'))
            .unwrap_or(false)
    }

    pub fn is_complete(&self) -> bool {
        self.squares
            .iter()
            .all(|square| !square.is_white() || square.content.is_some())
    }

    pub fn used_words(&self) -> &HashSet<String> {
        &self.used_words
    }

    pub fn mark_section_chosen(&mut self, key: &str) {
        self.chosen_section_keys.insert(key.to_string());
    }

    pub fn chosen_section_keys(&self) -> &BTreeSet<String> {
        &self.chosen_section_keys
    }

    /// The slot in the other direction crossing through `coord`, if the run
    /// there is long enough to be a slot at all.
    pub fn crossing_slot(&self, coord: GridCoord, dir: Direction) -> Option<SlotId> {
        self.containing_slot(coord, dir.other())
    }

    /// The slot of the given direction containing `coord`.
    pub fn containing_slot(&self, coord: GridCoord, dir: Direction) -> Option<SlotId> {
        let (mut row, mut col) = (coord.0 as isize, coord.1 as isize);
        if self.is_blocked(row, col) {
            return None;
        }

        let (dr, dc) = match dir {
            Direction::Across => (0isize, 1isize),
            Direction::Down => (1, 0),
        };

        while !self.is_blocked(row - dr, col - dc) {
            row -= dr;
            col -= dc;
        }

        let id = SlotId::new(row as usize, col as usize, dir);
        self.slots.contains_key(&id).then_some(id)
    }

    /// Commit a complete entry into a slot: write letters and provenance,
    /// register the word for uniqueness, and refresh the viable-letter caches
    /// of every crossing slot.
    pub fn insert_entry(
        &mut self,
        id: SlotId,
        word: &str,
        provenance: Provenance,
        word_list: &WordList,
    ) -> Result<()> {
        let word = word.to_lowercase();
        let squares = self.squares_for_slot(id)?;

        if word.chars().count() != squares.len() {
            return Err(FillError::LengthMismatch {
                word,
                length: squares.len(),
            });
        }

        // Replacing a committed entry frees its word for reuse elsewhere.
        let prior = self.letters_for_slot(id)?;
        if !prior.contains('.') {
            self.used_words.remove(&prior);
        }

        self.write_letters(id, &word, provenance)?;
        self.used_words.insert(word);

        let crossings: Vec<SlotId> = squares
            .iter()
            .filter_map(|&coord| self.crossing_slot(coord, id.dir))
            .collect();
        for crossing in crossings {
            self.refresh_viable_letters(word_list, crossing, 1);
        }

        Ok(())
    }

    /// Write letters and provenance without touching the used-word set. Used
    /// for provisional iffy-slot letters, which aren't dictionary-validated.
    pub fn write_letters(&mut self, id: SlotId, word: &str, provenance: Provenance) -> Result<()> {
        let squares = self.squares_for_slot(id)?;
        let chars: Vec<char> = word.to_lowercase().chars().collect();

        if chars.len() != squares.len() {
            return Err(FillError::LengthMismatch {
                word: word.to_string(),
                length: squares.len(),
            });
        }

        for (&(row, col), &ch) in squares.iter().zip(&chars) {
            let square = self.square_mut(row, col);
            square.content = Some(ch);
            square.provenance = Some(provenance);
            square.viable = Some(LetterSet::singleton(ch));
        }

        Ok(())
    }

    /// Seed every white square's viable-letter cache from the dictionary:
    /// filled squares get a singleton, empty squares the union of letters
    /// that matching words place there.
    pub fn init_viable_letters(&mut self, word_list: &WordList) {
        for square in &mut self.squares {
            if !square.is_white() {
                continue;
            }
            square.viable = Some(match square.content {
                Some(ch) => LetterSet::singleton(ch),
                None => LetterSet::full(),
            });
        }

        let ids: Vec<SlotId> = self.slots.keys().cloned().collect();
        for id in ids {
            self.refresh_viable_letters(word_list, id, 0);
        }
    }

    /// Re-derive the viable-letter sets for a slot's empty squares from its
    /// current pattern, recursing into crossing slots whose constraints
    /// tightened. Returns false when some square has no viable letter left
    /// (the slot is a structural dead end for the current partial fill).
    pub fn refresh_viable_letters(
        &mut self,
        word_list: &WordList,
        id: SlotId,
        depth: usize,
    ) -> bool {
        let Ok(pattern) = self.letters_for_slot(id) else {
            return true;
        };
        if !pattern.contains('.') {
            return true;
        }

        let live: Vec<&str> = word_list
            .query(&pattern)
            .into_iter()
            .filter(|word| !self.used_words.contains(*word))
            .collect();

        let squares = match self.squares_for_slot(id) {
            Ok(squares) => squares,
            Err(_) => return true,
        };

        // Leave the cached sets alone when nothing matches at all: the slot
        // may still be completed with provisional letters if the search
        // relaxes it, and its squares must stay anchorable for that.
        if live.is_empty() {
            return false;
        }

        let mut unions = vec![LetterSet::empty(); squares.len()];
        for word in &live {
            for (pos, letter) in word.chars().enumerate() {
                unions[pos].insert(letter);
            }
        }

        let mut feasible = true;
        let mut tightened: Vec<SlotId> = vec![];

        for (pos, &(row, col)) in squares.iter().enumerate() {
            if self.square(row, col).content.is_some() {
                continue;
            }

            let old = self.square(row, col).viable.unwrap_or_else(LetterSet::full);
            let new = old.intersect(unions[pos]);
            if new == old {
                continue;
            }

            self.square_mut(row, col).viable = Some(new);
            if new.is_empty() {
                feasible = false;
            }
            if depth > 0 {
                if let Some(crossing) = self.crossing_slot((row, col), id.dir) {
                    tightened.push(crossing);
                }
            }
        }

        for crossing in tightened {
            if !self.refresh_viable_letters(word_list, crossing, depth - 1) {
                feasible = false;
            }
        }

        feasible
    }

    /// Turn the grid into a rendered string: `#` for blocks, `.` for empty
    /// white squares, letters for themselves.
    pub fn render(&self) -> String {
        (0..self.height)
            .map(|row| {
                (0..self.width)
                    .map(|col| {
                        let square = self.square(row, col);
                        if !square.is_white() {
                            '#'
                        } else {
                            square.content.unwrap_or('.')
                        }
                    })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wordlist::WordList;

    fn small_list() -> WordList {
        WordList::load("cat;80\ncut;50\ncot;40\nat;50\nto;50\nact;50\ntac;50").expect("load")
    }

    #[test]
    fn test_template_round_trip() {
        let grid = Grid::from_template(
            "
            c.t
            #.#
            ",
        )
        .expect("template should parse");

        assert_eq!(grid.height, 2);
        assert_eq!(grid.width, 3);
        assert_eq!(grid.render(), "c.t\n#.#");
    }

    #[test]
    fn test_template_rejects_ragged_rows() {
        assert!(matches!(
            Grid::from_template("c.t\n#.\n"),
            Err(FillError::MalformedTemplate(_))
        ));
    }

    #[test]
    fn test_extract_words_finds_slots_both_directions() {
        let grid = Grid::from_template(
            "
            ...
            .#.
            ...
            ",
        )
        .expect("template should parse");

        let ids: Vec<SlotId> = grid.slots().map(|slot| slot.id).collect();
        assert_eq!(
            ids,
            vec![
                SlotId::new(0, 0, Direction::Across),
                SlotId::new(2, 0, Direction::Across),
                SlotId::new(0, 0, Direction::Down),
                SlotId::new(0, 2, Direction::Down),
            ]
        );
    }

    #[test]
    fn test_single_squares_are_not_slots() {
        let grid = Grid::from_template(
            "
            #.#
            ...
            #.#
            ",
        )
        .expect("template should parse");

        // One across and one down slot of length 3; the stray cells above
        // and below are parts of the down run, not slots of their own.
        assert_eq!(grid.slots().count(), 2);
        for slot in grid.slots() {
            assert_eq!(slot.length, 3);
        }
    }

    #[test]
    fn test_squares_for_slot_are_ordered_and_gapless() {
        let grid = Grid::from_template(
            "
            .....
            .....
            .....
            .....
            .....
            ",
        )
        .expect("template should parse");

        for slot in grid.slots() {
            let squares = slot.squares();
            assert_eq!(squares.len(), slot.end.0 - slot.start.0 + slot.end.1 - slot.start.1 + 1);

            for pair in squares.windows(2) {
                match slot.id.dir {
                    Direction::Across => {
                        assert_eq!(pair[1].0, pair[0].0);
                        assert_eq!(pair[1].1, pair[0].1 + 1);
                    }
                    Direction::Down => {
                        assert_eq!(pair[1].0, pair[0].0 + 1);
                        assert_eq!(pair[1].1, pair[0].1);
                    }
                }
            }
        }
    }

    #[test]
    fn test_insert_entry_round_trip() {
        let list = small_list();
        let mut grid = Grid::from_template("...\n###").expect("template should parse");
        let id = SlotId::new(0, 0, Direction::Across);

        grid.insert_entry(id, "CAT", Provenance::ChosenWord, &list)
            .expect("insert should succeed");

        assert_eq!(grid.letters_for_slot(id).expect("slot exists"), "cat");
        assert!(grid.used_words().contains("cat"));
        assert_eq!(grid.square(0, 0).provenance, Some(Provenance::ChosenWord));
    }

    #[test]
    fn test_insert_entry_replacement_frees_old_word() {
        let list = small_list();
        let mut grid = Grid::from_template("...\n###").expect("template should parse");
        let id = SlotId::new(0, 0, Direction::Across);

        grid.insert_entry(id, "cat", Provenance::Autofill, &list)
            .expect("insert");
        grid.insert_entry(id, "cut", Provenance::Autofill, &list)
            .expect("replace");

        assert!(!grid.used_words().contains("cat"));
        assert!(grid.used_words().contains("cut"));
        assert_eq!(grid.used_words().len(), 1);
    }

    #[test]
    fn test_insert_entry_rejects_length_mismatch() {
        let list = small_list();
        let mut grid = Grid::from_template("...\n###").expect("template should parse");
        let id = SlotId::new(0, 0, Direction::Across);

        assert!(matches!(
            grid.insert_entry(id, "crate", Provenance::Autofill, &list),
            Err(FillError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_insert_entry_refreshes_crossing_viability() {
        let list = small_list();
        let mut grid = Grid::from_template(
            "
            ...
            .##
            .##
            ",
        )
        .expect("template should parse");
        grid.init_viable_letters(&list);

        let across = SlotId::new(0, 0, Direction::Across);
        grid.insert_entry(across, "cat", Provenance::Autofill, &list)
            .expect("insert");

        // The down slot's pattern is now "c.." and cat itself is used, so
        // only cut and cot remain and row 1 col 0 narrows to their letters.
        let viable = grid.square(1, 0).viable.expect("white square has a set");
        let letters: String = viable.iter().collect();
        assert_eq!(letters, "ou");
    }

    #[test]
    fn test_black_squares_carry_nothing() {
        let grid = Grid::from_template("c.t\n#.#").expect("template should parse");
        let black = grid.square(1, 0);

        assert_eq!(black.kind, SquareKind::Black);
        assert!(black.content.is_none());
        assert!(black.viable.is_none());
        assert!(black.provenance.is_none());
    }

    #[test]
    fn test_numbering_checked_squares() {
        let grid = Grid::from_template(
            "
            ...
            .#.
            ...
            ",
        )
        .expect("template should parse");

        let top_across = grid
            .slot(SlotId::new(0, 0, Direction::Across))
            .expect("slot exists");
        assert_eq!(top_across.number, 1);

        let right_down = grid
            .slot(SlotId::new(0, 2, Direction::Down))
            .expect("slot exists");
        assert_eq!(right_down.number, 2);

        let bottom_across = grid
            .slot(SlotId::new(2, 0, Direction::Across))
            .expect("slot exists");
        assert_eq!(bottom_across.number, 3);
    }

    #[test]
    fn test_containing_and_crossing_slot() {
        let grid = Grid::from_template(
            "
            .....
            .....
            .....
            .....
            .....
            ",
        )
        .expect("template should parse");

        assert_eq!(
            grid.containing_slot((2, 3), Direction::Across),
            Some(SlotId::new(2, 0, Direction::Across))
        );
        assert_eq!(
            grid.crossing_slot((2, 3), Direction::Across),
            Some(SlotId::new(0, 3, Direction::Down))
        );
    }

    #[test]
    fn test_template_prefill_registers_used_words() {
        let grid = Grid::from_template("cat\n###").expect("template should parse");
        assert!(grid.used_words().contains("cat"));
    }
}
