use std::collections::HashSet;

/// The set of particle pairs currently inside an interaction's capture
/// radius (in the well, or with intersecting bounding spheres).
///
/// Keys are unordered: `(min(i, j), max(i, j))`. The map grows on
/// neighbourhood-entry events and shrinks on exit events, and is persisted
/// alongside the interaction's parameters so a reloaded configuration
/// resumes with identical pair states.
#[derive(Debug, Clone, Default)]
pub struct CaptureMap {
    pairs: HashSet<(usize, usize)>,
}

#[inline]
fn key(p1: usize, p2: usize) -> (usize, usize) {
    (p1.min(p2), p1.max(p2))
}

impl CaptureMap {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn contains(&self, p1: usize, p2: usize) -> bool {
        self.pairs.contains(&key(p1, p2))
    }

    #[inline]
    pub fn add(&mut self, p1: usize, p2: usize) {
        self.pairs.insert(key(p1, p2));
    }

    #[inline]
    pub fn remove(&mut self, p1: usize, p2: usize) {
        self.pairs.remove(&key(p1, p2));
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    /// Pairs in a deterministic order, for persistence.
    pub fn sorted_pairs(&self) -> Vec<(usize, usize)> {
        let mut v: Vec<_> = self.pairs.iter().copied().collect();
        v.sort_unstable();
        v
    }
}
