use thiserror::Error;

use crate::grid::SlotId;

#[derive(Error, Debug)]
pub enum FillError {
    /// Any fill entry point called before a word list has been loaded.
    #[error("no word list is loaded; fill operations need a dictionary")]
    DictionaryUnavailable,

    #[error("word list contained no usable entries")]
    EmptyWordList,

    #[error("no slot {0} in the grid")]
    NoSuchSlot(SlotId),

    #[error("no slot is selected")]
    NoSlotSelected,

    #[error("entry {word:?} does not fit a slot of length {length}")]
    LengthMismatch { word: String, length: usize },

    #[error("malformed grid template: {0}")]
    MalformedTemplate(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FillError>;
