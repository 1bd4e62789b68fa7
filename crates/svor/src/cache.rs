//! Cache list of free examples.
//!
//! Examples whose multipliers sit strictly inside the box at some
//! threshold are "free": their decision values are maintained
//! incrementally after every pair update, and they are the only examples
//! that re-vote the bias bounds in the hot loop.
//!
//! The list is a doubly-linked list over array indices. Node `i` belongs
//! to example `i`, so a node's presence is the example's back-reference
//! and the list can never point at a record that does not own it. Index
//! `n` is the sentinel head. Insertion at the front and removal are O(1).

use crate::error::SvorError;

/// Sentinel index representing "no link".
const NONE: usize = usize::MAX;

/// Per-example node: prev/next indices in the circular list.
#[derive(Debug, Clone, Copy)]
struct ListNode {
    prev: usize,
    next: usize,
}

/// Doubly-linked list of free example indices.
#[derive(Debug, Clone)]
pub struct CacheList {
    /// Number of examples that may be linked.
    n: usize,
    /// Linked members.
    count: usize,
    /// Nodes `0..n` for examples, node `n` is the sentinel head.
    /// Nodes with `prev == NONE` are not linked.
    nodes: Vec<ListNode>,
}

impl CacheList {
    /// Create an empty list able to hold examples `0..n`.
    pub fn new(n: usize) -> Self {
        let mut nodes = vec![ListNode { prev: NONE, next: NONE }; n];
        nodes.push(ListNode { prev: n, next: n });
        Self { n, count: 0, nodes }
    }

    /// Check if example `i` is linked.
    #[inline]
    pub fn contains(&self, i: usize) -> bool {
        i < self.n && self.nodes[i].prev != NONE
    }

    /// Number of linked examples.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// True when no example is linked.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Splice `i` in after node `after`. Caller guarantees `i` is unlinked.
    #[inline]
    fn link_after(&mut self, after: usize, i: usize) {
        let next = self.nodes[after].next;
        self.nodes[i] = ListNode { prev: after, next };
        self.nodes[after].next = i;
        self.nodes[next].prev = i;
        self.count += 1;
    }

    fn check_unlinked(&self, i: usize) -> Result<(), SvorError> {
        if i >= self.n {
            return Err(SvorError::CacheList(format!("index {i} out of range")));
        }
        if self.contains(i) {
            return Err(SvorError::CacheList(format!("example {i} is already linked")));
        }
        Ok(())
    }

    /// Insert example `i` at the front. O(1).
    pub fn add(&mut self, i: usize) -> Result<(), SvorError> {
        self.check_unlinked(i)?;
        let head = self.n;
        self.link_after(head, i);
        Ok(())
    }

    /// Insert example `i` keeping the list ordered by decreasing `key`.
    ///
    /// The caller supplies the key of every member (typically `|f_cache|`).
    /// O(len).
    pub fn insert_sorted<F>(&mut self, i: usize, key: F) -> Result<(), SvorError>
    where
        F: Fn(usize) -> f64,
    {
        self.check_unlinked(i)?;
        let head = self.n;
        let k = key(i);
        let mut after = head;
        let mut cur = self.nodes[head].next;
        while cur != head && key(cur) > k {
            after = cur;
            cur = self.nodes[cur].next;
        }
        self.link_after(after, i);
        Ok(())
    }

    /// Remove example `i`. O(1).
    pub fn remove(&mut self, i: usize) -> Result<(), SvorError> {
        if self.is_empty() {
            return Err(SvorError::CacheList("remove from an empty list".into()));
        }
        if !self.contains(i) {
            return Err(SvorError::CacheList(format!("example {i} is not linked")));
        }
        let ListNode { prev, next } = self.nodes[i];
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
        self.nodes[i] = ListNode { prev: NONE, next: NONE };
        self.count -= 1;
        Ok(())
    }

    /// Link or unlink `i` so that membership equals `free`.
    pub(crate) fn set_membership(&mut self, i: usize, free: bool) -> Result<(), SvorError> {
        match (free, self.contains(i)) {
            (true, false) => self.add(i),
            (false, true) => self.remove(i),
            _ => Ok(()),
        }
    }

    /// Unlink every member.
    pub fn clear(&mut self) {
        for node in self.nodes.iter_mut().take(self.n) {
            *node = ListNode { prev: NONE, next: NONE };
        }
        let head = self.n;
        self.nodes[head] = ListNode { prev: head, next: head };
        self.count = 0;
    }

    /// Members from front to back.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cur: self.nodes[self.n].next,
        }
    }

    /// Members collected into a vector, front to back.
    pub fn to_vec(&self) -> Vec<usize> {
        self.iter().collect()
    }

    /// Verify that links are consistent and that the count matches the
    /// number of examples holding a node.
    pub fn is_consistent(&self) -> bool {
        let linked = (0..self.n).filter(|&i| self.contains(i)).count();
        if linked != self.count {
            return false;
        }
        let mut walked = 0;
        let head = self.n;
        let mut prev = head;
        let mut cur = self.nodes[head].next;
        while cur != head {
            if cur >= self.n || self.nodes[cur].prev != prev {
                return false;
            }
            walked += 1;
            if walked > self.count {
                return false;
            }
            prev = cur;
            cur = self.nodes[cur].next;
        }
        walked == self.count && self.nodes[head].prev == prev
    }
}

/// Front-to-back iterator over [`CacheList`] members.
pub struct Iter<'a> {
    list: &'a CacheList,
    cur: usize,
}

impl Iterator for Iter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.cur == self.list.n {
            return None;
        }
        let i = self.cur;
        self.cur = self.list.nodes[i].next;
        Some(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_at_front() {
        let mut list = CacheList::new(4);
        list.add(1).unwrap();
        list.add(3).unwrap();
        list.add(0).unwrap();
        assert_eq!(list.to_vec(), vec![0, 3, 1]);
        assert_eq!(list.len(), 3);
        assert!(list.is_consistent());
    }

    #[test]
    fn remove_middle_and_ends() {
        let mut list = CacheList::new(5);
        for i in 0..5 {
            list.add(i).unwrap();
        }
        list.remove(2).unwrap();
        list.remove(4).unwrap();
        list.remove(0).unwrap();
        assert_eq!(list.to_vec(), vec![3, 1]);
        assert!(!list.contains(2));
        assert!(list.is_consistent());
    }

    #[test]
    fn double_add_is_error() {
        let mut list = CacheList::new(2);
        list.add(1).unwrap();
        assert!(matches!(list.add(1), Err(SvorError::CacheList(_))));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn remove_unlinked_is_error() {
        let mut list = CacheList::new(3);
        assert!(list.remove(0).is_err());
        list.add(1).unwrap();
        assert!(list.remove(0).is_err());
        assert!(list.remove(1).is_ok());
        assert!(list.is_empty());
    }

    #[test]
    fn out_of_range_add_is_error() {
        let mut list = CacheList::new(2);
        assert!(list.add(2).is_err());
    }

    #[test]
    fn clear_unlinks_everything() {
        let mut list = CacheList::new(3);
        list.add(0).unwrap();
        list.add(2).unwrap();
        list.clear();
        assert!(list.is_empty());
        assert!(!list.contains(0));
        assert!(!list.contains(2));
        assert_eq!(list.iter().count(), 0);
        list.add(2).unwrap();
        assert_eq!(list.to_vec(), vec![2]);
    }

    #[test]
    fn sorted_insert_orders_by_decreasing_key() {
        let keys = [0.5, 3.0, 1.0, 2.0];
        let mut list = CacheList::new(4);
        for i in 0..4 {
            list.insert_sorted(i, |j| keys[j]).unwrap();
        }
        assert_eq!(list.to_vec(), vec![1, 3, 2, 0]);
        assert!(list.is_consistent());
    }

    #[test]
    fn membership_toggle() {
        let mut list = CacheList::new(2);
        list.set_membership(0, true).unwrap();
        list.set_membership(0, true).unwrap();
        assert_eq!(list.len(), 1);
        list.set_membership(0, false).unwrap();
        list.set_membership(0, false).unwrap();
        assert!(list.is_empty());
    }
}
