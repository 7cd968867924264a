//! Fixed-size bitset of document ordinals within one table of one cube.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocSet {
    words: Vec<u64>,
    len: usize,
}

impl DocSet {
    pub fn empty(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    pub fn full(len: usize) -> Self {
        let mut set = Self {
            words: vec![u64::MAX; len.div_ceil(64)],
            len,
        };
        set.clear_tail();
        set
    }

    pub fn from_fn(len: usize, mut pred: impl FnMut(u32) -> bool) -> Self {
        let mut set = Self::empty(len);
        for doc in 0..len as u32 {
            if pred(doc) {
                set.insert(doc);
            }
        }
        set
    }

    /// Universe size (number of documents in the table).
    pub fn universe(&self) -> usize {
        self.len
    }

    pub fn insert(&mut self, doc: u32) {
        let doc = doc as usize;
        if doc < self.len {
            self.words[doc / 64] |= 1 << (doc % 64);
        }
    }

    pub fn contains(&self, doc: u32) -> bool {
        let doc = doc as usize;
        doc < self.len && self.words[doc / 64] & (1 << (doc % 64)) != 0
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn intersect(&mut self, other: &DocSet) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= b;
        }
    }

    pub fn union(&mut self, other: &DocSet) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
    }

    pub fn negate(&mut self) {
        for w in &mut self.words {
            *w = !*w;
        }
        self.clear_tail();
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros();
                bits &= bits - 1;
                Some((i * 64) as u32 + bit)
            })
        })
    }

    fn clear_tail(&mut self) {
        let rem = self.len % 64;
        if rem != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << rem) - 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_respects_universe() {
        let set = DocSet::full(70);
        assert_eq!(set.count(), 70);
        assert!(set.contains(69));
        assert!(!set.contains(70));
    }

    #[test]
    fn test_negate_clears_tail() {
        let mut set = DocSet::from_fn(10, |d| d % 2 == 0);
        set.negate();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_set_algebra() {
        let mut a = DocSet::from_fn(130, |d| d < 100);
        let b = DocSet::from_fn(130, |d| d >= 64);
        a.intersect(&b);
        assert_eq!(a.count(), 36);
        a.union(&DocSet::from_fn(130, |d| d == 129));
        assert!(a.contains(129));
        assert_eq!(a.iter().next(), Some(64));
    }

    #[test]
    fn test_empty_universe() {
        let set = DocSet::full(0);
        assert!(set.is_empty());
        assert_eq!(set.iter().count(), 0);
    }
}
