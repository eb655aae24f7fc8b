//! Bitmap of table numbers.

use std::fmt;

const WORD_BITS: usize = 64;

/// Set of table numbers referenced by an expression, predicate or result set.
///
/// Table numbers are dense and assigned once per compilation, so a growable
/// bitmap keeps every set small.
#[derive(Clone, Default)]
pub struct TableMap {
    words: Vec<u64>,
}

impl TableMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map containing a single table.
    pub fn single(table_number: usize) -> Self {
        let mut map = Self::new();
        map.set(table_number);
        map
    }

    pub fn set(&mut self, table_number: usize) {
        let word = table_number / WORD_BITS;
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (table_number % WORD_BITS);
    }

    pub fn clear(&mut self, table_number: usize) {
        if let Some(word) = self.words.get_mut(table_number / WORD_BITS) {
            *word &= !(1 << (table_number % WORD_BITS));
        }
    }

    pub fn contains(&self, table_number: usize) -> bool {
        self.words
            .get(table_number / WORD_BITS)
            .map(|w| w & (1 << (table_number % WORD_BITS)) != 0)
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Add every table of `other`.
    pub fn or(&mut self, other: &TableMap) {
        if self.words.len() < other.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (mine, theirs) in self.words.iter_mut().zip(&other.words) {
            *mine |= theirs;
        }
    }

    pub fn union(&self, other: &TableMap) -> TableMap {
        let mut result = self.clone();
        result.or(other);
        result
    }

    pub fn intersects(&self, other: &TableMap) -> bool {
        self.words.iter().zip(&other.words).any(|(a, b)| a & b != 0)
    }

    /// Whether every table of `self` is also in `other`.
    pub fn is_subset_of(&self, other: &TableMap) -> bool {
        self.words.iter().enumerate().all(|(i, w)| {
            let theirs = other.words.get(i).copied().unwrap_or(0);
            w & !theirs == 0
        })
    }

    /// Tables of `self` that are not in `other`.
    pub fn difference(&self, other: &TableMap) -> TableMap {
        let words = self
            .words
            .iter()
            .enumerate()
            .map(|(i, w)| w & !other.words.get(i).copied().unwrap_or(0))
            .collect();
        TableMap { words }
    }

    /// Table numbers in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, w)| {
            (0..WORD_BITS)
                .filter(move |bit| w & (1 << bit) != 0)
                .map(move |bit| i * WORD_BITS + bit)
        })
    }
}

impl PartialEq for TableMap {
    fn eq(&self, other: &Self) -> bool {
        let len = self.words.len().max(other.words.len());
        (0..len).all(|i| {
            self.words.get(i).copied().unwrap_or(0) == other.words.get(i).copied().unwrap_or(0)
        })
    }
}

impl Eq for TableMap {}

impl FromIterator<usize> for TableMap {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut map = TableMap::new();
        for table_number in iter {
            map.set(table_number);
        }
        map
    }
}

impl fmt::Debug for TableMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for TableMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let numbers: Vec<String> = self.iter().map(|n| n.to_string()).collect();
        write!(f, "{{{}}}", numbers.join(", "))
    }
}
