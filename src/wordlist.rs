use std::collections::HashMap;

use log::warn;

use crate::error::{FillError, Result};
use crate::{ALPHABET_SIZE, MAX_SLOT_LENGTH};

/// An identifier for a word within its length bucket.
pub type WordId = usize;

/// A coarse desirability bucket for a word. The weight feeds directly into
/// candidate scoring, so the gaps between classes matter more than the
/// absolute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Quality {
    NotAThing,
    Iffy,
    Crosswordese,
    Normal,
    Lively,
}

impl Quality {
    pub fn weight(self) -> f64 {
        match self {
            Quality::NotAThing => 0.0,
            Quality::Iffy => 1.0,
            Quality::Crosswordese => 3.0,
            Quality::Normal => 10.0,
            Quality::Lively => 15.0,
        }
    }

    /// Map a numeric dictionary score onto a quality class. Dictionary lines
    /// carry scores in the 0-100 range; anything negative means the word
    /// shouldn't be used at all.
    pub fn from_score(score: i32) -> Quality {
        match score {
            s if s < 0 => Quality::NotAThing,
            0..=20 => Quality::Iffy,
            21..=40 => Quality::Crosswordese,
            41..=70 => Quality::Normal,
            _ => Quality::Lively,
        }
    }
}

/// A single dictionary word with its score and derived quality class.
#[derive(Debug, Clone)]
pub struct WordEntry {
    pub string: String,
    pub score: i32,
    pub quality: Quality,
}

/// A word corpus indexed for pattern queries. Words are bucketed by length;
/// within each length we precompute a (position, letter) table and a
/// (position, letter, position, letter) pair table so that a mostly-blank
/// pattern can be answered from one bucket lookup instead of a scan.
#[derive(Clone)]
pub struct WordList {
    /// Words bucketed by length; `words[len][id]` is the entry for `id`.
    words: Vec<Vec<WordEntry>>,

    /// `single[len][pos * 26 + letter]` lists the ids of words of `len` with
    /// `letter` at `pos`.
    single: Vec<Vec<Vec<WordId>>>,

    /// Two-letter buckets, keyed by (pos1, letter1, pos2, letter2) with
    /// pos1 < pos2. Sparse, since most combinations never occur.
    pair: Vec<HashMap<(usize, u8, usize, u8), Vec<WordId>>>,

    /// Lookup from word string to (length, id), doubling as the membership
    /// test for fully-fixed patterns.
    ids_by_string: HashMap<String, (usize, WordId)>,

    /// Master score map, retained so that merging another list can rebuild
    /// the indices from scratch.
    scores: HashMap<String, i32>,

    max_length: usize,
}

impl WordList {
    /// Parse a corpus of `word;score` (or `word,score`) lines and build the
    /// indices. Malformed lines are skipped with a warning; a corpus that
    /// yields no words at all is an error.
    pub fn load(corpus: &str) -> Result<WordList> {
        let mut scores: HashMap<String, i32> = HashMap::new();

        for line in corpus.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match parse_line(line) {
                Some((word, score)) => {
                    scores.insert(word, score);
                }
                None => {
                    warn!("skipping malformed word list line: {:?}", line);
                }
            }
        }

        if scores.is_empty() {
            return Err(FillError::EmptyWordList);
        }

        Ok(WordList::from_scores(scores))
    }

    /// Merge another corpus into this list. A word appearing in both keeps
    /// the most recently loaded score (last write wins); indices are rebuilt
    /// once at the end.
    pub fn merge(&mut self, corpus: &str) -> Result<()> {
        let other = WordList::load(corpus)?;
        for (word, score) in other.scores {
            self.scores.insert(word, score);
        }
        *self = WordList::from_scores(std::mem::take(&mut self.scores));
        Ok(())
    }

    fn from_scores(scores: HashMap<String, i32>) -> WordList {
        let max_length = scores
            .keys()
            .map(|word| word.len())
            .filter(|&len| len <= MAX_SLOT_LENGTH)
            .max()
            .unwrap_or(0);

        // Deterministic bucket order regardless of the hash map's iteration.
        let mut sorted: Vec<(String, i32)> = scores
            .iter()
            .map(|(word, &score)| (word.clone(), score))
            .collect();
        sorted.sort();

        let mut list = WordList {
            words: (0..=max_length).map(|_| vec![]).collect(),
            single: (0..=max_length).map(|_| vec![]).collect(),
            pair: (0..=max_length).map(|_| HashMap::new()).collect(),
            ids_by_string: HashMap::new(),
            scores,
            max_length,
        };

        for (word, score) in sorted {
            let len = word.len();
            if !(2..=MAX_SLOT_LENGTH).contains(&len) {
                warn!("skipping word with unusable length: {:?}", word);
                continue;
            }

            let id = list.words[len].len();
            list.words[len].push(WordEntry {
                string: word.clone(),
                score,
                quality: Quality::from_score(score),
            });
            list.ids_by_string.insert(word.clone(), (len, id));
        }

        for len in 2..=max_length {
            list.single[len] = vec![vec![]; len * ALPHABET_SIZE];

            for id in 0..list.words[len].len() {
                let bytes: Vec<u8> = list.words[len][id].string.bytes().collect();

                for (pos, &byte) in bytes.iter().enumerate() {
                    let letter = (byte - b'a') as usize;
                    list.single[len][pos * ALPHABET_SIZE + letter].push(id);

                    for (offset, &byte2) in bytes[pos + 1..].iter().enumerate() {
                        let pos2 = pos + 1 + offset;
                        list.pair[len]
                            .entry((pos, byte, pos2, byte2))
                            .or_default()
                            .push(id);
                    }
                }
            }
        }

        list
    }

    pub fn is_empty(&self) -> bool {
        self.ids_by_string.is_empty()
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn contains(&self, word: &str) -> bool {
        self.ids_by_string.contains_key(&word.to_lowercase())
    }

    pub fn entry(&self, word: &str) -> Option<&WordEntry> {
        let &(len, id) = self.ids_by_string.get(&word.to_lowercase())?;
        Some(&self.words[len][id])
    }

    pub fn quality(&self, word: &str) -> Option<Quality> {
        self.entry(word).map(|entry| entry.quality)
    }

    /// All words of a fixed length matching the pattern. Alphabetic pattern
    /// characters are fixed positions (case-insensitive); anything else is a
    /// wildcard. A pattern longer than the longest indexed word matches
    /// nothing.
    pub fn query(&self, pattern: &str) -> Vec<&str> {
        let pattern = pattern.to_lowercase();
        let len = pattern.len();

        if len < 2 || len > self.max_length || !pattern.is_ascii() {
            return vec![];
        }

        let fixed: Vec<(usize, u8)> = pattern
            .bytes()
            .enumerate()
            .filter(|(_, byte)| byte.is_ascii_lowercase())
            .collect();

        // Fully fixed: a plain membership test.
        if fixed.len() == len {
            return match self.ids_by_string.get(&pattern) {
                Some(&(word_len, id)) => vec![self.words[word_len][id].string.as_str()],
                None => vec![],
            };
        }

        // Nothing fixed: the whole length bucket.
        if fixed.is_empty() {
            return self.words[len].iter().map(|entry| entry.string.as_str()).collect();
        }

        if fixed.len() == 1 {
            let (pos, byte) = fixed[0];
            let letter = (byte - b'a') as usize;
            return self.single[len][pos * ALPHABET_SIZE + letter]
                .iter()
                .map(|&id| self.words[len][id].string.as_str())
                .collect();
        }

        // Two or more fixed positions: find the most selective pair bucket,
        // then filter the rest linearly.
        static EMPTY: Vec<WordId> = Vec::new();
        let mut best: Option<&Vec<WordId>> = None;

        for i in 0..fixed.len() {
            for j in i + 1..fixed.len() {
                let key = (fixed[i].0, fixed[i].1, fixed[j].0, fixed[j].1);
                let bucket = self.pair[len].get(&key).unwrap_or(&EMPTY);
                if best.map(|b| bucket.len() < b.len()).unwrap_or(true) {
                    best = Some(bucket);
                }
            }
        }

        let bucket = match best {
            Some(bucket) => bucket,
            None => return vec![],
        };

        bucket
            .iter()
            .map(|&id| &self.words[len][id])
            .filter(|entry| {
                fixed
                    .iter()
                    .all(|&(pos, byte)| entry.string.as_bytes()[pos] == byte)
            })
            .map(|entry| entry.string.as_str())
            .collect()
    }

}

impl std::fmt::Debug for WordList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordList")
            .field("word_count", &self.ids_by_string.len())
            .field("max_length", &self.max_length)
            .finish()
    }
}

/// Parse a `word;score` or `word,score` line. A bare word defaults to a
/// Normal-class score. Words with non-alphabetic characters are malformed.
fn parse_line(line: &str) -> Option<(String, i32)> {
    let mut parts = line.splitn(2, [';', ',']);
    let word = parts.next()?.trim().to_lowercase();

    if word.is_empty() || !word.bytes().all(|byte| byte.is_ascii_lowercase()) {
        return None;
    }

    let score = match parts.next() {
        Some(raw) => raw.trim().parse().ok()?,
        None => 50,
    };

    Some((word, score))
}
