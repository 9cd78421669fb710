//! Eviction deque.
//!
//! A doubly linked list of nodes ordered from least recently used (head) to
//! most recently used (tail). Links live in an arena owned by the deque and
//! are addressed by index; each node remembers its own index so membership
//! checks, unlinking and moves are all O(1) without scanning.
//!
//! The deque is not synchronized. It lives inside the map's eviction lock and
//! every method assumes that lock is held, which is also what makes the
//! relaxed accesses to a node's slot index sound.

use std::sync::Arc;

use crate::node::{Node, UNLINKED};

/// One arena cell. Vacant cells have no node and sit on the free list.
struct Link<K, V> {
    node: Option<Arc<Node<K, V>>>,
    prev: usize,
    next: usize,
}

/// Arena-backed doubly linked list of nodes, LRU at the head.
pub(crate) struct LinkedDeque<K, V> {
    links: Vec<Link<K, V>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
    len: usize,
}

impl<K, V> LinkedDeque<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            links: Vec::new(),
            free: Vec::new(),
            head: UNLINKED,
            tail: UNLINKED,
            len: 0,
        }
    }

    /// Returns the number of linked nodes.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no node is linked.
    pub(crate) fn is_empty(&self) -> bool {
        self.head == UNLINKED
    }

    /// Returns true if `node` is linked into this deque.
    ///
    /// A node carries a slot handle exactly while it has a predecessor, a
    /// successor, or is the head, so this is a field read rather than a scan.
    #[inline]
    pub(crate) fn contains(&self, node: &Node<K, V>) -> bool {
        node.slot() != UNLINKED
    }

    /// Links `node` at the tail. Returns false if it is already linked.
    pub(crate) fn offer_last(&mut self, node: &Arc<Node<K, V>>) -> bool {
        if self.contains(node) {
            return false;
        }
        let slot = match self.free.pop() {
            Some(slot) => {
                self.links[slot].node = Some(Arc::clone(node));
                slot
            }
            None => {
                self.links.push(Link {
                    node: Some(Arc::clone(node)),
                    prev: UNLINKED,
                    next: UNLINKED,
                });
                self.links.len() - 1
            }
        };
        node.set_slot(slot);
        self.attach_last(slot);
        self.len += 1;
        true
    }

    /// Unlinks `node`. Returns false if it was not linked.
    pub(crate) fn remove(&mut self, node: &Node<K, V>) -> bool {
        let slot = node.slot();
        if slot == UNLINKED {
            return false;
        }
        self.release(slot);
        true
    }

    /// Moves a linked `node` to the tail. Unlinked nodes are ignored.
    pub(crate) fn move_to_back(&mut self, node: &Node<K, V>) {
        let slot = node.slot();
        if slot == UNLINKED || slot == self.tail {
            return;
        }
        self.detach(slot);
        self.attach_last(slot);
    }

    /// Unlinks and returns the least recently used node.
    pub(crate) fn poll_first(&mut self) -> Option<Arc<Node<K, V>>> {
        if self.is_empty() {
            return None;
        }
        self.release(self.head)
    }

    /// Iterates linked nodes from head (LRU) to tail (MRU).
    pub(crate) fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            deque: self,
            cursor: self.head,
        }
    }

    /// Detaches `slot`, returns its node and puts the cell on the free list.
    fn release(&mut self, slot: usize) -> Option<Arc<Node<K, V>>> {
        self.detach(slot);
        self.free.push(slot);
        self.len -= 1;
        let node = self.links[slot].node.take();
        if let Some(node) = &node {
            node.set_slot(UNLINKED);
        }
        node
    }

    /// Splices `slot` out of the chain without freeing it.
    fn detach(&mut self, slot: usize) {
        let Link { prev, next, .. } = self.links[slot];
        if prev == UNLINKED {
            self.head = next;
        } else {
            self.links[prev].next = next;
        }
        if next == UNLINKED {
            self.tail = prev;
        } else {
            self.links[next].prev = prev;
        }
        self.links[slot].prev = UNLINKED;
        self.links[slot].next = UNLINKED;
    }

    /// Splices a detached `slot` in after the current tail.
    fn attach_last(&mut self, slot: usize) {
        self.links[slot].prev = self.tail;
        self.links[slot].next = UNLINKED;
        if self.tail == UNLINKED {
            self.head = slot;
        } else {
            self.links[self.tail].next = slot;
        }
        self.tail = slot;
    }
}

impl<K, V> Default for LinkedDeque<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Head-to-tail iterator over a [`LinkedDeque`].
pub(crate) struct Iter<'a, K, V> {
    deque: &'a LinkedDeque<K, V>,
    cursor: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = &'a Arc<Node<K, V>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == UNLINKED {
            return None;
        }
        let link = &self.deque.links[self.cursor];
        self.cursor = link.next;
        link.node.as_ref()
    }
}

impl<K, V> Drop for LinkedDeque<K, V> {
    fn drop(&mut self) {
        // Nodes may outlive the deque through the table; leave them unlinked.
        while self.poll_first().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::WeightedValue;

    fn node(key: u32) -> Arc<Node<u32, u32>> {
        Arc::new(Node::new(
            key,
            Arc::new(WeightedValue::new(Arc::new(key), 1)),
        ))
    }

    fn keys(deque: &LinkedDeque<u32, u32>) -> Vec<u32> {
        deque.iter().map(|n| *n.key()).collect()
    }

    #[test]
    fn test_offer_last_orders_lru_to_mru() {
        let mut deque = LinkedDeque::new();
        let (a, b, c) = (node(1), node(2), node(3));
        assert!(deque.offer_last(&a));
        assert!(deque.offer_last(&b));
        assert!(deque.offer_last(&c));
        assert_eq!(keys(&deque), vec![1, 2, 3]);
        assert_eq!(deque.len(), 3);
    }

    #[test]
    fn test_offer_last_rejects_linked_node() {
        let mut deque = LinkedDeque::new();
        let a = node(1);
        assert!(deque.offer_last(&a));
        assert!(!deque.offer_last(&a));
        assert_eq!(deque.len(), 1);
    }

    #[test]
    fn test_contains_single_element() {
        let mut deque = LinkedDeque::new();
        let a = node(1);
        assert!(!deque.contains(&a));
        deque.offer_last(&a);
        assert!(deque.contains(&a));
        deque.remove(&a);
        assert!(!deque.contains(&a));
        assert!(deque.is_empty());
    }

    #[test]
    fn test_move_to_back() {
        let mut deque = LinkedDeque::new();
        let (a, b, c) = (node(1), node(2), node(3));
        deque.offer_last(&a);
        deque.offer_last(&b);
        deque.offer_last(&c);

        deque.move_to_back(&a);
        assert_eq!(keys(&deque), vec![2, 3, 1]);
        deque.move_to_back(&c);
        assert_eq!(keys(&deque), vec![2, 1, 3]);
        deque.move_to_back(&c);
        assert_eq!(keys(&deque), vec![2, 1, 3]);

        let unlinked = node(9);
        deque.move_to_back(&unlinked);
        assert_eq!(keys(&deque), vec![2, 1, 3]);
    }

    #[test]
    fn test_remove_middle_and_ends() {
        let mut deque = LinkedDeque::new();
        let nodes: Vec<_> = (1..=5).map(node).collect();
        for n in &nodes {
            deque.offer_last(n);
        }
        assert!(deque.remove(&nodes[2]));
        assert!(deque.remove(&nodes[0]));
        assert!(deque.remove(&nodes[4]));
        assert!(!deque.remove(&nodes[4]));
        assert_eq!(keys(&deque), vec![2, 4]);
        assert_eq!(deque.len(), 2);
    }

    #[test]
    fn test_poll_first_and_slot_reuse() {
        let mut deque = LinkedDeque::new();
        let (a, b) = (node(1), node(2));
        deque.offer_last(&a);
        deque.offer_last(&b);

        let polled = deque.poll_first().map(|n| *n.key());
        assert_eq!(polled, Some(1));
        assert!(!deque.contains(&a));

        let c = node(3);
        deque.offer_last(&c);
        assert_eq!(deque.links.len(), 2);
        assert_eq!(keys(&deque), vec![2, 3]);

        assert_eq!(deque.poll_first().map(|n| *n.key()), Some(2));
        assert_eq!(deque.poll_first().map(|n| *n.key()), Some(3));
        assert!(deque.poll_first().is_none());
    }

    #[test]
    fn test_drop_unlinks_nodes() {
        let a = node(1);
        {
            let mut deque = LinkedDeque::new();
            deque.offer_last(&a);
            assert_eq!(a.slot(), 0);
        }
        assert_eq!(a.slot(), UNLINKED);
        assert_eq!(Arc::strong_count(&a), 1);
    }
}
