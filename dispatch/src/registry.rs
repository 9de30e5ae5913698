use std::sync::Arc;

use crate::{ObserverList, SubjectId};

/// Fixed-size hash table from subject identity to its observer list.
///
/// Each bucket is a short chain scanned by identity; there is exactly one list per subject.
pub(crate) struct Registry {
    buckets: Vec<Vec<Arc<ObserverList>>>,
}

impl Registry {
    pub fn new(buckets: usize) -> Self { Self { buckets: (0..buckets.max(1)).map(|_| Vec::new()).collect() } }

    fn hash(&self, subject: SubjectId) -> usize {
        // Fibonacci hashing; addresses are aligned so the low bits carry little information
        let mixed = (subject.as_raw() as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32;
        (mixed as usize) % self.buckets.len()
    }

    pub fn lookup(&self, subject: SubjectId) -> Option<&Arc<ObserverList>> {
        self.buckets[self.hash(subject)].iter().find(|list| list.subject() == subject)
    }

    /// The list for `subject`, created on first use. The flag tells whether it was created.
    pub fn get_or_insert(&mut self, subject: SubjectId) -> (Arc<ObserverList>, bool) {
        if let Some(list) = self.lookup(subject) {
            return (Arc::clone(list), false);
        }
        let list = Arc::new(ObserverList::new(subject));
        let bucket = self.hash(subject);
        self.buckets[bucket].push(Arc::clone(&list));
        (list, true)
    }

    /// Unlinks `list` if it is still the registered list of its subject
    pub fn remove(&mut self, list: &Arc<ObserverList>) -> Option<Arc<ObserverList>> {
        let bucket = self.hash(list.subject());
        let chain = &mut self.buckets[bucket];
        let index = chain.iter().position(|candidate| Arc::ptr_eq(candidate, list))?;
        Some(chain.remove(index))
    }

    pub fn len(&self) -> usize { self.buckets.iter().map(Vec::len).sum() }

    pub fn is_empty(&self) -> bool { self.buckets.iter().all(Vec::is_empty) }

    pub fn lists(&self) -> impl Iterator<Item = &Arc<ObserverList>> { self.buckets.iter().flatten() }

    /// Unlinks every list
    pub fn clear(&mut self) -> Vec<Arc<ObserverList>> { self.buckets.iter_mut().flat_map(std::mem::take).collect() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_list_per_subject() {
        let mut registry = Registry::new(8);
        let (first, created) = registry.get_or_insert(SubjectId::from_raw(0x1000));
        assert!(created);
        let (again, created) = registry.get_or_insert(SubjectId::from_raw(0x1000));
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_colliding_subjects_share_a_chain() {
        let mut registry = Registry::new(1);
        let (a, _) = registry.get_or_insert(SubjectId::from_raw(1));
        let (b, _) = registry.get_or_insert(SubjectId::from_raw(2));
        assert_eq!(registry.len(), 2);
        assert!(Arc::ptr_eq(registry.lookup(SubjectId::from_raw(2)).unwrap(), &b));

        assert!(registry.remove(&a).is_some());
        assert!(registry.remove(&a).is_none());
        assert!(registry.lookup(SubjectId::from_raw(1)).is_none());
        assert!(registry.lookup(SubjectId::from_raw(2)).is_some());
    }

    #[test]
    fn test_remove_ignores_stale_list() {
        let mut registry = Registry::new(4);
        let stale = Arc::new(ObserverList::new(SubjectId::from_raw(5)));
        registry.get_or_insert(SubjectId::from_raw(5));
        assert!(registry.remove(&stale).is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.clear().len(), 1);
        assert!(registry.is_empty());
    }
}
