//! # Ordered List
//!
//! Circular doubly-linked list with an end marker, optionally kept sorted
//! by an ascending tick key. It is the only container the kernel uses:
//! every ready list and both delay lists are `OrderedList`s.
//!
//! ## Arena Layout
//!
//! Nodes and list headers don't point at each other. They live in an
//! arena (anything implementing [`ListArena`]) and refer to one another
//! through [`NodeId`] and [`ListId`] handles. A [`Link`] is either a real
//! node or the end marker embedded in a list header:
//!
//! ```text
//!           ┌──────────────────────────────────────────────┐
//!           ▼                                              │
//!   ┌──────────────┐    ┌─────────┐    ┌─────────┐    ┌─────────┐
//!   │ End(list)    │───►│ Node(a) │───►│ Node(b) │───►│ Node(c) │
//!   │ key = MAX    │◄───│ key = 3 │◄───│ key = 7 │◄───│ key = 7 │
//!   └──────────────┘    └─────────┘    └─────────┘    └─────────┘
//! ```
//!
//! Unlinking a node is O(1) because the node records its container.

use crate::config::{TickType, MAX_DELAY};

/// Handle of a list node within its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// Handle of a list header within its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListId(pub usize);

/// A position in a list: a real node, or the end marker of a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Node(NodeId),
    End(ListId),
}

/// A list node. `owner` refers back to the object the node belongs to
/// (a task, in the scheduler).
///
/// `container` is `Some` iff the node is linked into a list. The links of
/// a detached node are stale and never read.
#[derive(Debug, Clone, Copy)]
pub struct ListNode<O> {
    key: TickType,
    next: Link,
    prev: Link,
    owner: Option<O>,
    container: Option<ListId>,
}

impl<O: Copy> ListNode<O> {
    /// A detached node with no owner.
    pub const fn new() -> Self {
        Self {
            key: 0,
            next: Link::End(ListId(0)),
            prev: Link::End(ListId(0)),
            owner: None,
            container: None,
        }
    }

    pub fn key(&self) -> TickType {
        self.key
    }

    pub fn set_key(&mut self, key: TickType) {
        self.key = key;
    }

    pub fn owner(&self) -> Option<O> {
        self.owner
    }

    pub fn set_owner(&mut self, owner: O) {
        self.owner = Some(owner);
    }

    pub fn container(&self) -> Option<ListId> {
        self.container
    }

    pub fn is_linked(&self) -> bool {
        self.container.is_some()
    }
}

impl<O: Copy> Default for ListNode<O> {
    fn default() -> Self {
        Self::new()
    }
}

/// The end marker every list carries. Its key is always `MAX_DELAY`, so a
/// sorted scan stops at it.
#[derive(Debug, Clone, Copy)]
struct EndMarker {
    key: TickType,
    next: Link,
    prev: Link,
}

/// List header: item count, round-robin cursor and the end marker.
#[derive(Debug, Clone, Copy)]
pub struct OrderedList {
    count: usize,
    cursor: Link,
    end: EndMarker,
}

impl OrderedList {
    /// An empty list whose end marker links to itself. `id` must be the
    /// handle the arena will store this header under.
    pub const fn new(id: ListId) -> Self {
        Self {
            count: 0,
            cursor: Link::End(id),
            end: EndMarker {
                key: MAX_DELAY,
                next: Link::End(id),
                prev: Link::End(id),
            },
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Current round-robin position.
    pub fn cursor(&self) -> Link {
        self.cursor
    }
}

/// Storage for list nodes and list headers, addressed by handle.
///
/// Implementors provide the four accessors; the list operations are
/// provided methods. Every operation assumes exclusive access to the
/// arena, which the scheduler guarantees with a critical section.
pub trait ListArena {
    /// Handle type stored in each node's `owner`.
    type Owner: Copy;

    fn node(&self, id: NodeId) -> &ListNode<Self::Owner>;
    fn node_mut(&mut self, id: NodeId) -> &mut ListNode<Self::Owner>;
    fn list(&self, id: ListId) -> &OrderedList;
    fn list_mut(&mut self, id: ListId) -> &mut OrderedList;

    /// Reset `list` to empty.
    fn init_list(&mut self, list: ListId) {
        *self.list_mut(list) = OrderedList::new(list);
    }

    /// Detach `node` without touching its neighbours. Only valid for a
    /// node that is known not to be in any list.
    fn init_node(&mut self, node: NodeId) {
        self.node_mut(node).container = None;
    }

    /// Insert `node` right before the list's cursor, ignoring key order.
    ///
    /// With the cursor on the running task, the new node is the last one
    /// the round-robin rotation reaches.
    fn insert_end(&mut self, list: ListId, node: NodeId) {
        let index = self.list(list).cursor;
        let last = prev_of(self, index);
        link_between(self, list, node, last, index);
    }

    /// Insert `node` in ascending key order. Nodes with equal keys keep
    /// insertion order.
    fn insert_sorted(&mut self, list: ListId, node: NodeId) {
        let key = self.node(node).key;
        let after = if key == MAX_DELAY {
            // Nothing sorts after MAX_DELAY, skip the scan.
            prev_of(self, Link::End(list))
        } else {
            let mut at = Link::End(list);
            while key_of(self, next_of(self, at)) <= key {
                at = next_of(self, at);
            }
            at
        };
        let before = next_of(self, after);
        link_between(self, list, node, after, before);
    }

    /// Unlink `node` from its list and return the list's new length.
    ///
    /// Returns `None` if the node isn't linked anywhere; the arena is left
    /// untouched in that case. Removing a detached node is a caller error.
    fn remove(&mut self, node: NodeId) -> Option<usize> {
        let list = self.node(node).container?;
        let ListNode { next, prev, .. } = *self.node(node);

        // Keep round robin on track: the next advance must land on the
        // node that followed the removed one.
        if self.list(list).cursor == Link::Node(node) {
            self.list_mut(list).cursor = prev;
        }

        set_prev(self, next, prev);
        set_next(self, prev, next);
        self.node_mut(node).container = None;

        let header = self.list_mut(list);
        header.count -= 1;
        Some(header.count)
    }

    /// Move the cursor one step forward, stepping over the end marker,
    /// and return the owner of the node it lands on.
    ///
    /// The flag reports whether the end marker was skipped. On an empty
    /// list the cursor stays on the end marker and the owner is `None`.
    fn advance_cursor(&mut self, list: ListId) -> (Option<Self::Owner>, bool) {
        let mut cursor = next_of(self, self.list(list).cursor);
        let mut skipped_end = false;
        if cursor == Link::End(list) {
            cursor = next_of(self, cursor);
            skipped_end = true;
        }
        self.list_mut(list).cursor = cursor;

        let owner = match cursor {
            Link::Node(id) => self.node(id).owner,
            Link::End(_) => None,
        };
        (owner, skipped_end)
    }

    /// The first node after the end marker, i.e. the smallest key of a
    /// sorted list. Does not move the cursor.
    fn peek_head(&self, list: ListId) -> Option<NodeId> {
        match self.list(list).end.next {
            Link::Node(id) => Some(id),
            Link::End(_) => None,
        }
    }

    fn is_empty(&self, list: ListId) -> bool {
        self.list(list).is_empty()
    }

    fn length(&self, list: ListId) -> usize {
        self.list(list).len()
    }

    /// Walk the list from head to tail.
    fn iter(&self, list: ListId) -> Iter<'_, Self>
    where
        Self: Sized,
    {
        Iter {
            arena: self,
            at: self.list(list).end.next,
            remaining: self.list(list).count,
        }
    }
}

/// Iterator over the nodes of a list, head first.
pub struct Iter<'a, A> {
    arena: &'a A,
    at: Link,
    remaining: usize,
}

impl<A: ListArena> Iterator for Iter<'_, A> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.remaining == 0 {
            return None;
        }
        match self.at {
            Link::Node(id) => {
                self.remaining -= 1;
                self.at = self.arena.node(id).next;
                Some(id)
            }
            Link::End(_) => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

fn key_of<A: ListArena + ?Sized>(arena: &A, link: Link) -> TickType {
    match link {
        Link::Node(id) => arena.node(id).key,
        Link::End(list) => arena.list(list).end.key,
    }
}

fn next_of<A: ListArena + ?Sized>(arena: &A, link: Link) -> Link {
    match link {
        Link::Node(id) => arena.node(id).next,
        Link::End(list) => arena.list(list).end.next,
    }
}

fn prev_of<A: ListArena + ?Sized>(arena: &A, link: Link) -> Link {
    match link {
        Link::Node(id) => arena.node(id).prev,
        Link::End(list) => arena.list(list).end.prev,
    }
}

fn set_next<A: ListArena + ?Sized>(arena: &mut A, link: Link, to: Link) {
    match link {
        Link::Node(id) => arena.node_mut(id).next = to,
        Link::End(list) => arena.list_mut(list).end.next = to,
    }
}

fn set_prev<A: ListArena + ?Sized>(arena: &mut A, link: Link, to: Link) {
    match link {
        Link::Node(id) => arena.node_mut(id).prev = to,
        Link::End(list) => arena.list_mut(list).end.prev = to,
    }
}

/// Splice `node` in between the adjacent links `prev` and `next` of `list`.
fn link_between<A: ListArena + ?Sized>(
    arena: &mut A,
    list: ListId,
    node: NodeId,
    prev: Link,
    next: Link,
) {
    {
        let item = arena.node_mut(node);
        item.prev = prev;
        item.next = next;
        item.container = Some(list);
    }
    set_next(arena, prev, Link::Node(node));
    set_prev(arena, next, Link::Node(node));
    arena.list_mut(list).count += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use std::{vec, vec::Vec};

    struct TestArena {
        nodes: Vec<ListNode<usize>>,
        lists: Vec<OrderedList>,
    }

    impl TestArena {
        fn new(nodes: usize, lists: usize) -> Self {
            let mut arena = Self {
                nodes: vec![ListNode::new(); nodes],
                lists: (0..lists).map(|i| OrderedList::new(ListId(i))).collect(),
            };
            for i in 0..nodes {
                arena.init_node(NodeId(i));
                arena.node_mut(NodeId(i)).set_owner(i);
            }
            arena
        }

        fn keys(&self, list: ListId) -> Vec<TickType> {
            self.iter(list).map(|id| self.node(id).key()).collect()
        }

        fn ids(&self, list: ListId) -> Vec<usize> {
            self.iter(list).map(|id| id.0).collect()
        }

        fn insert_with_key(&mut self, list: ListId, node: usize, key: TickType) {
            self.node_mut(NodeId(node)).set_key(key);
            self.insert_sorted(list, NodeId(node));
        }

        /// Walk the raw links and check every structural invariant.
        fn check_integrity(&self, list: ListId) {
            let header = self.list(list);
            let mut at = Link::End(list);
            for _ in 0..=header.len() {
                let next = next_of(self, at);
                assert_eq!(prev_of(self, next), at, "broken back link");
                if let Link::Node(id) = next {
                    assert_eq!(self.node(id).container(), Some(list));
                }
                at = next;
            }
            assert_eq!(at, Link::End(list), "list is not circular over count + 1 steps");
            if let Link::Node(id) = header.cursor() {
                assert_eq!(self.node(id).container(), Some(list));
                assert!(self.node(id).owner().is_some());
            }
        }
    }

    impl ListArena for TestArena {
        type Owner = usize;

        fn node(&self, id: NodeId) -> &ListNode<usize> {
            &self.nodes[id.0]
        }
        fn node_mut(&mut self, id: NodeId) -> &mut ListNode<usize> {
            &mut self.nodes[id.0]
        }
        fn list(&self, id: ListId) -> &OrderedList {
            &self.lists[id.0]
        }
        fn list_mut(&mut self, id: ListId) -> &mut OrderedList {
            &mut self.lists[id.0]
        }
    }

    const L: ListId = ListId(0);

    #[test]
    fn empty_list_links_to_itself() {
        let arena = TestArena::new(0, 1);
        assert!(ListArena::is_empty(&arena, L));
        assert_eq!(arena.peek_head(L), None);
        assert_eq!(arena.list(L).cursor(), Link::End(L));
        arena.check_integrity(L);
    }

    #[test]
    fn sorted_insert_orders_by_key() {
        let mut arena = TestArena::new(3, 1);
        arena.insert_with_key(L, 1, 2);
        arena.insert_with_key(L, 0, 1);
        arena.insert_with_key(L, 2, 3);
        assert_eq!(arena.keys(L), [1, 2, 3]);
        assert_eq!(arena.peek_head(L), Some(NodeId(0)));
        assert_eq!(arena.length(L), 3);
        arena.check_integrity(L);
    }

    #[test]
    fn equal_keys_are_fifo() {
        let mut arena = TestArena::new(4, 1);
        arena.insert_with_key(L, 0, 5);
        arena.insert_with_key(L, 1, 5);
        arena.insert_with_key(L, 2, 1);
        arena.insert_with_key(L, 3, 5);
        assert_eq!(arena.ids(L), [2, 0, 1, 3]);
    }

    #[test]
    fn max_key_goes_last() {
        let mut arena = TestArena::new(3, 1);
        arena.insert_with_key(L, 0, MAX_DELAY);
        arena.insert_with_key(L, 1, MAX_DELAY - 1);
        arena.insert_with_key(L, 2, MAX_DELAY);
        assert_eq!(arena.ids(L), [1, 0, 2]);
        assert_eq!(arena.list(L).end.prev, Link::Node(NodeId(2)));
        arena.check_integrity(L);
    }

    #[test]
    fn insert_end_goes_before_cursor() {
        let mut arena = TestArena::new(3, 1);
        arena.insert_end(L, NodeId(0));
        arena.insert_end(L, NodeId(1));
        assert_eq!(arena.ids(L), [0, 1]);

        // Cursor on node 0: the next insertion lands right before it.
        assert_eq!(arena.advance_cursor(L), (Some(0), false));
        arena.insert_end(L, NodeId(2));
        assert_eq!(arena.ids(L), [2, 0, 1]);
        arena.check_integrity(L);
    }

    #[test]
    fn advance_cursor_skips_end_marker() {
        let mut arena = TestArena::new(2, 1);
        arena.insert_end(L, NodeId(0));
        arena.insert_end(L, NodeId(1));
        assert_eq!(arena.advance_cursor(L), (Some(0), false));
        assert_eq!(arena.advance_cursor(L), (Some(1), false));
        // Wrapping from the tail steps over the end marker.
        assert_eq!(arena.advance_cursor(L), (Some(0), true));
    }

    #[test]
    fn advance_cursor_on_single_node_repeats() {
        let mut arena = TestArena::new(1, 1);
        arena.insert_end(L, NodeId(0));
        for _ in 0..4 {
            assert_eq!(arena.advance_cursor(L).0, Some(0));
        }
    }

    #[test]
    fn advance_cursor_on_empty_list() {
        let mut arena = TestArena::new(0, 1);
        assert_eq!(arena.advance_cursor(L), (None, true));
        assert_eq!(arena.list(L).cursor(), Link::End(L));
    }

    #[test]
    fn remove_returns_new_length() {
        let mut arena = TestArena::new(3, 1);
        for i in 0..3 {
            arena.insert_end(L, NodeId(i));
        }
        assert_eq!(arena.remove(NodeId(1)), Some(2));
        assert!(!arena.node(NodeId(1)).is_linked());
        assert_eq!(arena.ids(L), [0, 2]);
        assert_eq!(arena.remove(NodeId(0)), Some(1));
        assert_eq!(arena.remove(NodeId(2)), Some(0));
        assert!(ListArena::is_empty(&arena, L));
        arena.check_integrity(L);
    }

    #[test]
    fn removing_cursor_node_steps_back() {
        let mut arena = TestArena::new(3, 1);
        for i in 0..3 {
            arena.insert_end(L, NodeId(i));
        }
        arena.advance_cursor(L);
        arena.advance_cursor(L);
        assert_eq!(arena.list(L).cursor(), Link::Node(NodeId(1)));

        arena.remove(NodeId(1));
        assert_eq!(arena.list(L).cursor(), Link::Node(NodeId(0)));
        // Rotation continues with the removed node's successor.
        assert_eq!(arena.advance_cursor(L).0, Some(2));
    }

    #[test]
    fn remove_detached_node_is_rejected() {
        let mut arena = TestArena::new(2, 1);
        arena.insert_end(L, NodeId(0));
        arena.insert_end(L, NodeId(1));

        assert_eq!(arena.remove(NodeId(0)), Some(1));
        assert_eq!(arena.node(NodeId(0)).container(), None);
        assert_eq!(arena.length(L), 1);

        // Second removal of the same node is a caller error; it must not
        // disturb the list.
        assert_eq!(arena.remove(NodeId(0)), None);
        assert_eq!(arena.ids(L), [1]);
        arena.check_integrity(L);
    }

    #[test]
    fn nodes_move_between_lists() {
        let mut arena = TestArena::new(2, 2);
        arena.insert_end(ListId(0), NodeId(0));
        arena.insert_end(ListId(0), NodeId(1));
        arena.remove(NodeId(0));
        arena.insert_with_key(ListId(1), 0, 9);
        assert_eq!(arena.ids(ListId(0)), [1]);
        assert_eq!(arena.ids(ListId(1)), [0]);
        assert_eq!(arena.node(NodeId(0)).container(), Some(ListId(1)));
        arena.check_integrity(ListId(0));
        arena.check_integrity(ListId(1));
    }

    /// A modifying operation on a set of lists.
    #[derive(Debug)]
    enum Cmd {
        InsertEnd(ListId, NodeId),
        InsertSorted(ListId, NodeId, TickType),
        Remove(NodeId),
        Advance(ListId),
    }

    const NODES: usize = 12;
    const LISTS: usize = 3;

    /// Map random bytes to list operations. Only detached nodes are
    /// inserted and only linked nodes are removed.
    fn interpret(bytecode: &[u8], sorted_only: bool) -> impl Iterator<Item = Cmd> + '_ {
        let mut i = 0;
        let mut linked = [false; NODES];
        std::iter::from_fn(move || {
            let instr = bytecode.get(i..i + 4)?;
            i += 4;

            let op = instr[0] % 4;
            let node = NodeId(instr[1] as usize % NODES);
            let list = ListId(instr[2] as usize % LISTS);
            // Small key space so ties are common; 0xff maps to MAX_DELAY.
            let key = if instr[3] == 0xff {
                MAX_DELAY
            } else {
                TickType::from(instr[3] % 8)
            };

            if !linked[node.0] && (op < 2 || sorted_only) {
                linked[node.0] = true;
                Some(if sorted_only || op == 1 {
                    Cmd::InsertSorted(list, node, key)
                } else {
                    Cmd::InsertEnd(list, node)
                })
            } else if linked[node.0] && (op == 2 || sorted_only) {
                linked[node.0] = false;
                Some(Cmd::Remove(node))
            } else {
                Some(Cmd::Advance(list))
            }
        })
    }

    #[quickcheck]
    fn list_integrity(bytecode: Vec<u8>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut arena = TestArena::new(NODES, LISTS);

        for cmd in interpret(&bytecode, false) {
            log::trace!("    {cmd:?}");
            match cmd {
                Cmd::InsertEnd(list, node) => arena.insert_end(list, node),
                Cmd::InsertSorted(list, node, key) => arena.insert_with_key(list, node.0, key),
                Cmd::Remove(node) => {
                    arena.remove(node).unwrap();
                }
                Cmd::Advance(list) => {
                    arena.advance_cursor(list);
                }
            }

            let mut total = 0;
            for l in 0..LISTS {
                let list = ListId(l);
                arena.check_integrity(list);
                assert_eq!(arena.iter(list).count(), arena.length(list));
                total += arena.length(list);
            }
            let linked = arena.nodes.iter().filter(|n| n.is_linked()).count();
            assert_eq!(total, linked);
        }
    }

    #[quickcheck]
    fn sorted_insert_matches_stable_sort(bytecode: Vec<u8>) {
        let mut arena = TestArena::new(NODES, LISTS);
        let mut reference: Vec<Vec<(TickType, usize)>> = vec![Vec::new(); LISTS];

        for cmd in interpret(&bytecode, true) {
            match cmd {
                Cmd::InsertSorted(list, node, key) => {
                    arena.insert_with_key(list, node.0, key);
                    let model = &mut reference[list.0];
                    let at = model.iter().position(|&(k, _)| k > key).unwrap_or(model.len());
                    model.insert(at, (key, node.0));
                }
                Cmd::Remove(node) => {
                    let list = arena.node(node).container().unwrap();
                    arena.remove(node).unwrap();
                    reference[list.0].retain(|&(_, id)| id != node.0);
                }
                Cmd::InsertEnd(..) | Cmd::Advance(_) => unreachable!(),
            }
        }

        for (l, model) in reference.iter().enumerate() {
            let keys = arena.keys(ListId(l));
            assert!(keys.windows(2).all(|w| w[0] <= w[1]));
            let ids: Vec<usize> = model.iter().map(|&(_, id)| id).collect();
            assert_eq!(arena.ids(ListId(l)), ids);
        }
    }
}
