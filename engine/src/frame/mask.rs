// mask.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

const WORD_BITS: usize = u64::BITS as usize;

/// Growable bit set keyed by module index.
///
/// Two masks compare equal when they hold the same set bits, whatever the
/// number of backing words.
#[derive(Clone, Default)]
pub struct ModuleMask {
    words: Vec<u64>,
}

impl ModuleMask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mask with bits `0..count` set.
    pub fn with_first(count: usize) -> Self {
        let mut mask = Self::new();
        for index in 0..count {
            mask.set(index);
        }
        mask
    }

    pub fn set(&mut self, index: usize) {
        let word = index / WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (index % WORD_BITS);
    }

    pub fn clear(&mut self, index: usize) {
        if let Some(word) = self.words.get_mut(index / WORD_BITS) {
            *word &= !(1u64 << (index % WORD_BITS));
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.words
            .get(index / WORD_BITS)
            .is_some_and(|word| word & (1u64 << (index % WORD_BITS)) != 0)
    }

    /// `true` when every bit of `other` is also set here.
    pub fn contains_all(&self, other: &ModuleMask) -> bool {
        other.words.iter().enumerate().all(|(i, bits)| {
            let mine = self.words.get(i).copied().unwrap_or(0);
            mine & bits == *bits
        })
    }

    pub fn union_with(&mut self, other: &ModuleMask) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (mine, theirs) in self.words.iter_mut().zip(&other.words) {
            *mine |= theirs;
        }
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, word)| {
            (0..WORD_BITS)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| i * WORD_BITS + bit)
        })
    }
}

impl PartialEq for ModuleMask {
    fn eq(&self, other: &Self) -> bool {
        let len = self.words.len().max(other.words.len());
        (0..len).all(|i| {
            self.words.get(i).copied().unwrap_or(0) == other.words.get(i).copied().unwrap_or(0)
        })
    }
}

impl Eq for ModuleMask {}

impl fmt::Debug for ModuleMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
