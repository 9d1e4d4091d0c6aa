//! Intrusive ordered list over arena-owned nodes
//!
//! Nodes live in an [`Arena`] and are addressed by stable [`NodeId`] handles.
//! Each node carries its own `prev`/`next` link slots; a [`DList`] only threads
//! those handles together and never creates or frees nodes. A node belongs to
//! at most one list at a time, so it can be moved between lists built on the
//! same arena without reallocating.
//!
//! All linking operations are O(1) given a handle.
//!
//! ```
//! use nntp_engine::list::Arena;
//!
//! let mut arena = Arena::new();
//! let mut queue = arena.new_list();
//!
//! let a = arena.insert("a");
//! let b = arena.insert("b");
//! queue.push_back(&mut arena, a);
//! queue.push_front(&mut arena, b);
//!
//! let order: Vec<_> = queue.iter(&arena).map(|(_, v)| *v).collect();
//! assert_eq!(order, ["b", "a"]);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable handle to a node in an [`Arena`]
///
/// Handles carry a generation, so a handle to a removed node never aliases a
/// node later stored in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

/// Identity of a [`DList`], unique across all arenas in the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ListId(u64);

static NEXT_LIST_ID: AtomicU64 = AtomicU64::new(0);

impl ListId {
    fn next() -> Self {
        ListId(NEXT_LIST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Links {
    owner: Option<ListId>,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

#[derive(Debug)]
struct Node<T> {
    links: Links,
    value: T,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    node: Option<Node<T>>,
}

/// Owner of list nodes
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("len", &self.len)
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl<T> Arena<T> {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty arena with room for `capacity` nodes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Create an empty list threading nodes of this arena
    pub fn new_list(&mut self) -> DList {
        DList {
            id: ListId::next(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Store a value as an unlinked node
    pub fn insert(&mut self, value: T) -> NodeId {
        let node = Node {
            links: Links::default(),
            value,
        };
        self.len += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    /// Take a node out of the arena
    ///
    /// Returns `None` for stale handles and for nodes still linked into a
    /// list; unlink them first.
    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        if self.node(id)?.links.owner.is_some() {
            return None;
        }
        let slot = &mut self.slots[id.index];
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(node.value)
    }

    /// Borrow a node's value
    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.node(id).map(|node| &node.value)
    }

    /// Mutably borrow a node's value
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.node_mut(id).map(|node| &mut node.value)
    }

    /// Whether the handle refers to a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Whether the node is currently linked into some list
    pub fn is_linked(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|node| node.links.owner.is_some())
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the arena holds no nodes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn node(&self, id: NodeId) -> Option<&Node<T>> {
        let slot = self.slots.get(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node<T>> {
        let slot = self.slots.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    fn links(&self, id: NodeId) -> Option<Links> {
        self.node(id).map(|node| node.links)
    }

    fn links_mut(&mut self, id: NodeId) -> Option<&mut Links> {
        self.node_mut(id).map(|node| &mut node.links)
    }
}

/// Doubly linked list of arena nodes
///
/// Every operation takes the arena the list was created from. Operations that
/// would break the list's shape (linking a node that is already linked,
/// unlinking a node owned by another list, stale handles) are refused and
/// reported through the return value.
#[derive(Debug)]
pub struct DList {
    id: ListId,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
}

impl DList {
    /// Whether the list has no nodes
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Whether the list has exactly one node
    pub fn is_singular(&self) -> bool {
        self.len == 1
    }

    /// Whether the list has at most one node
    pub fn is_empty_or_singular(&self) -> bool {
        self.len <= 1
    }

    /// Number of linked nodes
    pub fn len(&self) -> usize {
        self.len
    }

    /// First node
    pub fn front(&self) -> Option<NodeId> {
        self.head
    }

    /// Last node
    pub fn back(&self) -> Option<NodeId> {
        self.tail
    }

    /// Whether `id` is the first node
    pub fn is_front(&self, id: NodeId) -> bool {
        self.head == Some(id)
    }

    /// Whether `id` is the last node
    pub fn is_back(&self, id: NodeId) -> bool {
        self.tail == Some(id)
    }

    /// Whether `id` is linked into this list
    pub fn contains<T>(&self, arena: &Arena<T>, id: NodeId) -> bool {
        arena
            .links(id)
            .is_some_and(|links| links.owner == Some(self.id))
    }

    /// Link an unlinked node at the front
    pub fn push_front<T>(&mut self, arena: &mut Arena<T>, id: NodeId) -> bool {
        if !is_free(arena, id) {
            return false;
        }
        let next = self.head;
        self.link(arena, id, None, next);
        true
    }

    /// Link an unlinked node at the back
    pub fn push_back<T>(&mut self, arena: &mut Arena<T>, id: NodeId) -> bool {
        if !is_free(arena, id) {
            return false;
        }
        let prev = self.tail;
        self.link(arena, id, prev, None);
        true
    }

    /// Link an unlinked node right before `reference`, which must be in this list
    pub fn insert_before<T>(&mut self, arena: &mut Arena<T>, id: NodeId, reference: NodeId) -> bool {
        if !is_free(arena, id) || !self.contains(arena, reference) {
            return false;
        }
        let prev = arena.links(reference).and_then(|links| links.prev);
        self.link(arena, id, prev, Some(reference));
        true
    }

    /// Link an unlinked node right after `reference`, which must be in this list
    pub fn insert_after<T>(&mut self, arena: &mut Arena<T>, id: NodeId, reference: NodeId) -> bool {
        if !is_free(arena, id) || !self.contains(arena, reference) {
            return false;
        }
        let next = arena.links(reference).and_then(|links| links.next);
        self.link(arena, id, Some(reference), next);
        true
    }

    /// Move a node of this list to the front
    pub fn move_to_front<T>(&mut self, arena: &mut Arena<T>, id: NodeId) -> bool {
        if !self.contains(arena, id) {
            return false;
        }
        if self.head != Some(id) {
            self.unlink(arena, id);
            let next = self.head;
            self.link(arena, id, None, next);
        }
        true
    }

    /// Move a node of this list to the back
    pub fn move_to_back<T>(&mut self, arena: &mut Arena<T>, id: NodeId) -> bool {
        if !self.contains(arena, id) {
            return false;
        }
        if self.tail != Some(id) {
            self.unlink(arena, id);
            let prev = self.tail;
            self.link(arena, id, prev, None);
        }
        true
    }

    /// Unlink and return the first node
    pub fn pop_front<T>(&mut self, arena: &mut Arena<T>) -> Option<NodeId> {
        let id = self.head?;
        self.unlink(arena, id);
        Some(id)
    }

    /// Unlink and return the last node
    pub fn pop_back<T>(&mut self, arena: &mut Arena<T>) -> Option<NodeId> {
        let id = self.tail?;
        self.unlink(arena, id);
        Some(id)
    }

    /// Unlink a node of this list; the node stays in the arena
    pub fn remove<T>(&mut self, arena: &mut Arena<T>, id: NodeId) -> Option<NodeId> {
        if !self.contains(arena, id) {
            return None;
        }
        self.unlink(arena, id);
        Some(id)
    }

    /// Lazy front-to-back traversal
    pub fn iter<'a, T>(&self, arena: &'a Arena<T>) -> Iter<'a, T> {
        Iter {
            arena,
            cursor: self.head,
            forward: true,
        }
    }

    /// Lazy back-to-front traversal
    pub fn iter_rev<'a, T>(&self, arena: &'a Arena<T>) -> Iter<'a, T> {
        Iter {
            arena,
            cursor: self.tail,
            forward: false,
        }
    }

    fn link<T>(
        &mut self,
        arena: &mut Arena<T>,
        id: NodeId,
        prev: Option<NodeId>,
        next: Option<NodeId>,
    ) {
        if let Some(links) = arena.links_mut(id) {
            *links = Links {
                owner: Some(self.id),
                prev,
                next,
            };
        }
        match prev.and_then(|p| arena.links_mut(p)) {
            Some(links) => links.next = Some(id),
            None => self.head = Some(id),
        }
        match next.and_then(|n| arena.links_mut(n)) {
            Some(links) => links.prev = Some(id),
            None => self.tail = Some(id),
        }
        self.len += 1;
    }

    fn unlink<T>(&mut self, arena: &mut Arena<T>, id: NodeId) {
        let Some(links) = arena.links(id) else {
            return;
        };
        match links.prev.and_then(|p| arena.links_mut(p)) {
            Some(prev) => prev.next = links.next,
            None => self.head = links.next,
        }
        match links.next.and_then(|n| arena.links_mut(n)) {
            Some(next) => next.prev = links.prev,
            None => self.tail = links.prev,
        }
        if let Some(links) = arena.links_mut(id) {
            *links = Links::default();
        }
        self.len -= 1;
    }
}

fn is_free<T>(arena: &Arena<T>, id: NodeId) -> bool {
    arena.links(id).is_some_and(|links| links.owner.is_none())
}

/// Traversal over a [`DList`], yielding handles with their values
///
/// A clone resumes from the same position; call [`DList::iter`] again to start
/// over from the current head.
pub struct Iter<'a, T> {
    arena: &'a Arena<T>,
    cursor: Option<NodeId>,
    forward: bool,
}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Self {
            arena: self.arena,
            cursor: self.cursor,
            forward: self.forward,
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (NodeId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = self.arena.node(id)?;
        self.cursor = if self.forward {
            node.links.next
        } else {
            node.links.prev
        };
        Some((id, &node.value))
    }
}
