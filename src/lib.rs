use std::fmt::{Debug, Formatter};

pub mod candidates;
pub mod context;
pub mod error;
pub mod grid;
pub mod search;
pub mod section;
pub mod wordlist;

pub use candidates::{generate_candidates, AnchorState, EntryCandidate};
pub use context::{FillConfig, SearchContext};
pub use error::{FillError, Result};
pub use grid::{Grid, Provenance, Slot, SlotId, Square, SquareKind};
pub use search::{
    populate_manual_entry_candidates, run_to_completion, FillEngine, FillNode, SectionState,
    Statistics,
};
pub use section::{
    decompose_sections, match_sections, PermutationState, Section, SectionCandidate, SectionId,
};
pub use wordlist::{Quality, WordList};

/// The expected maximum length for a single slot.
pub const MAX_SLOT_LENGTH: usize = 21;

/// The expected maximum number of slots appearing in a grid.
pub const MAX_SLOT_COUNT: usize = 256;

pub const ALPHABET_SIZE: usize = 26;

/// Relative frequencies of a-z in English text, in percent. Used to order
/// anchor-letter combinations so that uncommon pairs are queried first.
pub const LETTER_FREQUENCIES: [f64; ALPHABET_SIZE] = [
    8.17, 1.49, 2.78, 4.25, 12.70, 2.23, 2.02, 6.09, 6.97, 0.15, 0.77, 4.03, 2.41, 6.75, 7.51,
    1.93, 0.10, 5.99, 6.33, 9.06, 2.76, 0.98, 2.36, 0.15, 1.97, 0.07,
];

/// Zero-indexed row and column coords for a cell in the grid, where row = 0 is the top row.
pub type GridCoord = (usize, usize);

/// Direction that a slot is facing. Across sorts before Down, which gives slot
/// maps the row-major, Across-then-Down iteration order the persisted puzzle
/// format expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    Across,
    Down,
}

impl Direction {
    pub fn other(self) -> Direction {
        match self {
            Direction::Across => Direction::Down,
            Direction::Down => Direction::Across,
        }
    }
}

/// A set of letters a-z, packed into the low 26 bits of a u32. Every white
/// square caches one of these recording which letters are still viable there.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct LetterSet(u32);

impl LetterSet {
    const MASK: u32 = (1 << ALPHABET_SIZE) - 1;

    pub fn empty() -> LetterSet {
        LetterSet(0)
    }

    pub fn full() -> LetterSet {
        LetterSet(Self::MASK)
    }

    pub fn singleton(letter: char) -> LetterSet {
        let mut set = LetterSet::empty();
        set.insert(letter);
        set
    }

    fn bit(letter: char) -> Option<u32> {
        let lower = letter.to_ascii_lowercase();
        if lower.is_ascii_lowercase() {
            Some(1 << (lower as u8 - b'a'))
        } else {
            None
        }
    }

    pub fn insert(&mut self, letter: char) {
        if let Some(bit) = Self::bit(letter) {
            self.0 |= bit;
        }
    }

    pub fn contains(self, letter: char) -> bool {
        Self::bit(letter).map(|bit| self.0 & bit != 0).unwrap_or(false)
    }

    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn intersect(self, other: LetterSet) -> LetterSet {
        LetterSet(self.0 & other.0)
    }

    pub fn union(self, other: LetterSet) -> LetterSet {
        LetterSet(self.0 | other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = char> {
        (0..ALPHABET_SIZE as u8)
            .filter(move |i| self.0 & (1 << i) != 0)
            .map(|i| (b'a' + i) as char)
    }

    /// The most frequent English letter in the set, used when recording
    /// best-effort letters for an iffy slot.
    pub fn most_frequent(self) -> Option<char> {
        self.iter().max_by(|&a, &b| {
            let fa = LETTER_FREQUENCIES[(a as u8 - b'a') as usize];
            let fb = LETTER_FREQUENCIES[(b as u8 - b'a') as usize];
            fa.partial_cmp(&fb).unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}

impl Debug for LetterSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "LetterSet({})", self.iter().collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letter_set_basics() {
        let mut set = LetterSet::empty();
        assert!(set.is_empty());
        set.insert('a');
        set.insert('z');
        set.insert('A');
        assert_eq!(set.count(), 2);
        assert!(set.contains('a'));
        assert!(set.contains('Z'));
        assert!(!set.contains('m'));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!['a', 'z']);
    }

    #[test]
    fn test_letter_set_full_and_ops() {
        let full = LetterSet::full();
        assert_eq!(full.count(), 26);
        let vowels = ['a', 'e', 'i', 'o', 'u']
            .iter()
            .fold(LetterSet::empty(), |mut set, &c| {
                set.insert(c);
                set
            });
        assert_eq!(full.intersect(vowels), vowels);
        assert_eq!(vowels.union(full), full);
        assert_eq!(vowels.most_frequent(), Some('e'));
    }

    #[test]
    fn test_non_letters_are_ignored() {
        let mut set = LetterSet::empty();
        set.insert('.');
        set.insert('#');
        assert!(set.is_empty());
        assert!(!set.contains('-'));
    }
}
