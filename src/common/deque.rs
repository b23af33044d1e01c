//! A doubly linked list whose nodes live in a slab and are addressed by stable
//! slot indices. Replacement strategies store the slot of an entry on the entry
//! itself so that unlinking and reordering are O(1) without raw pointers.

#[derive(Debug)]
struct DeqNode<T> {
    element: Option<T>,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
pub(crate) struct Deque<T> {
    nodes: Vec<DeqNode<T>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> Default for Deque<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }
}

impl<T> Deque<T> {
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn contains(&self, slot: usize) -> bool {
        self.nodes
            .get(slot)
            .map(|n| n.element.is_some())
            .unwrap_or_default()
    }

    pub(crate) fn get(&self, slot: usize) -> Option<&T> {
        self.nodes.get(slot).and_then(|n| n.element.as_ref())
    }

    #[cfg(test)]
    pub(crate) fn front_slot(&self) -> Option<usize> {
        self.head
    }

    pub(crate) fn peek_front(&self) -> Option<&T> {
        self.head.and_then(|slot| self.get(slot))
    }

    /// Adds the element to the back of the list and returns its slot.
    pub(crate) fn push_back(&mut self, element: T) -> usize {
        let node = DeqNode {
            element: Some(element),
            prev: self.tail,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };

        match self.tail {
            None => self.head = Some(slot),
            Some(tail) => self.nodes[tail].next = Some(slot),
        }
        self.tail = Some(slot);
        self.len += 1;
        slot
    }

    /// Removes and returns the element at the front of the list.
    pub(crate) fn pop_front(&mut self) -> Option<T> {
        let slot = self.head?;
        self.unlink(slot)
    }

    /// Unlinks the element at `slot` and releases the slot for reuse.
    ///
    /// Returns `None` if the slot is not occupied.
    pub(crate) fn unlink(&mut self, slot: usize) -> Option<T> {
        if !self.contains(slot) {
            return None;
        }
        self.detach(slot);
        let node = &mut self.nodes[slot];
        let element = node.element.take();
        self.free.push(slot);
        self.len -= 1;
        element
    }

    pub(crate) fn move_to_back(&mut self, slot: usize) {
        if !self.contains(slot) || self.tail == Some(slot) {
            return;
        }
        self.detach(slot);

        let node = &mut self.nodes[slot];
        node.prev = self.tail;
        node.next = None;
        match self.tail {
            None => self.head = Some(slot),
            Some(tail) => self.nodes[tail].next = Some(slot),
        }
        self.tail = Some(slot);
    }

    pub(crate) fn move_front_to_back(&mut self) {
        if let Some(slot) = self.head {
            self.move_to_back(slot);
        }
    }

    /// Removes every element, returning them in list order.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let mut elements = Vec::with_capacity(self.len);
        while let Some(element) = self.pop_front() {
            elements.push(element);
        }
        self.nodes.clear();
        self.free.clear();
        elements
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> Iter<'_, T> {
        Iter {
            deque: self,
            cursor: self.head,
        }
    }

    // Takes the node out of the link structure but keeps its element.
    fn detach(&mut self, slot: usize) {
        let (prev, next) = {
            let node = &self.nodes[slot];
            (node.prev, node.next)
        };
        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }
        let node = &mut self.nodes[slot];
        node.prev = None;
        node.next = None;
    }
}

#[cfg(test)]
pub(crate) struct Iter<'a, T> {
    deque: &'a Deque<T>,
    cursor: Option<usize>,
}

#[cfg(test)]
impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let deque: &'a Deque<T> = self.deque;
        let node = &deque.nodes[slot];
        self.cursor = node.next;
        node.element.as_ref()
    }
}
