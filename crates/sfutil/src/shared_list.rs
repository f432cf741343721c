use std::fmt;
use std::sync::Arc;

/// An immutable list whose instances share structure.
///
/// Extending by one element and concatenating existing lists never copy
/// elements: extension wraps the old list plus a trailing element, and
/// concatenation stores a thin index over its parts. Indexing descends
/// through the sharing structure, so `get` costs O(depth) rather than O(1).
///
/// Cloning a `SharedList` clones one `Arc`.
pub struct SharedList<T> {
    node: Arc<Node<T>>,
}

enum Node<T> {
    Empty,
    Single(T),
    /// A flat block of elements, possibly shared with an owner that appends
    /// to it through copy-on-write.
    Array(Arc<Vec<T>>),
    /// `prefix` followed by `last`.
    OneMore {
        prefix: SharedList<T>,
        last: T,
        len: usize,
    },
    /// Non-empty parts laid end to end. `starts[k]` is the flattened index of
    /// the first element of `parts[k]`.
    Concat {
        parts: Vec<SharedList<T>>,
        starts: Vec<usize>,
        len: usize,
    },
}

impl<T> Clone for SharedList<T> {
    fn clone(&self) -> Self {
        SharedList {
            node: Arc::clone(&self.node),
        }
    }
}

impl<T> Default for SharedList<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> SharedList<T> {
    pub fn empty() -> Self {
        SharedList {
            node: Arc::new(Node::Empty),
        }
    }

    pub fn singleton(item: T) -> Self {
        SharedList {
            node: Arc::new(Node::Single(item)),
        }
    }

    /// Take ownership of a vector as one flat block.
    pub fn from_vec(items: Vec<T>) -> Self {
        Self::from_shared_vec(Arc::new(items))
    }

    /// View a shared vector without copying it.
    ///
    /// The owner may keep appending through `Arc::make_mut`; the view keeps
    /// seeing the elements that existed when it was taken.
    pub fn from_shared_vec(items: Arc<Vec<T>>) -> Self {
        match items.len() {
            0 => Self::empty(),
            _ => SharedList {
                node: Arc::new(Node::Array(items)),
            },
        }
    }

    /// A new list equal to `self` followed by `item`. O(1).
    pub fn extend_by_one(&self, item: T) -> Self {
        if self.is_empty() {
            return Self::singleton(item);
        }
        SharedList {
            node: Arc::new(Node::OneMore {
                prefix: self.clone(),
                last: item,
                len: self.len() + 1,
            }),
        }
    }

    /// Concatenate lists. O(k) in the number of lists; empty parts are
    /// dropped and a single remaining part is returned as is.
    pub fn concat<I>(lists: I) -> Self
    where
        I: IntoIterator<Item = SharedList<T>>,
    {
        let mut parts: Vec<SharedList<T>> = lists.into_iter().filter(|l| !l.is_empty()).collect();
        match parts.len() {
            0 => Self::empty(),
            1 => parts.remove(0),
            _ => {
                let mut starts = Vec::with_capacity(parts.len());
                let mut len = 0;
                for part in &parts {
                    starts.push(len);
                    len += part.len();
                }
                SharedList {
                    node: Arc::new(Node::Concat { parts, starts, len }),
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        match &*self.node {
            Node::Empty => 0,
            Node::Single(_) => 1,
            Node::Array(items) => items.len(),
            Node::OneMore { len, .. } => *len,
            Node::Concat { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at flattened position `index`.
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len() {
            return None;
        }
        let mut node: &Node<T> = &*self.node;
        let mut i = index;
        loop {
            match node {
                Node::Empty => return None,
                Node::Single(item) => return (i == 0).then_some(item),
                Node::Array(items) => return items.get(i),
                Node::OneMore { prefix, last, len } => {
                    if i + 1 == *len {
                        return Some(last);
                    }
                    node = &*prefix.node;
                }
                Node::Concat { parts, starts, .. } => {
                    let k = part_index(starts, i);
                    i -= starts[k];
                    node = &*parts[k].node;
                }
            }
        }
    }

    pub fn last(&self) -> Option<&T> {
        match self.len() {
            0 => None,
            n => self.get(n - 1),
        }
    }

    /// The smallest existing sub-structure of this list containing `index`.
    ///
    /// The result is one of the lists this list was built from (or the list
    /// itself); it need not start at position 0 of `self`. Returns the
    /// fragment together with the position `index` has inside it.
    pub fn sublist_containing(&self, index: usize) -> Option<(SharedList<T>, usize)> {
        if index >= self.len() {
            return None;
        }
        let mut current = self;
        let mut i = index;
        loop {
            match &*current.node {
                Node::OneMore { prefix, len, .. } if i + 1 < *len => current = prefix,
                Node::Concat { parts, starts, .. } => {
                    let k = part_index(starts, i);
                    i -= starts[k];
                    current = &parts[k];
                }
                _ => return Some((current.clone(), i)),
            }
        }
    }

    /// Number of sharing levels above the deepest element.
    pub fn depth(&self) -> usize {
        match &*self.node {
            Node::Empty | Node::Single(_) | Node::Array(_) => 0,
            Node::OneMore { prefix, .. } => prefix.depth() + 1,
            Node::Concat { parts, .. } => parts.iter().map(|p| p.depth()).max().unwrap_or(0) + 1,
        }
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            stack: vec![Frame::Node(&*self.node)],
        }
    }

    /// True when both lists are the same physical structure.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl<T: Clone> SharedList<T> {
    /// Copy the elements out into a flat vector.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

fn part_index(starts: &[usize], index: usize) -> usize {
    // starts[0] == 0, so at least one start is <= index.
    starts.partition_point(|&s| s <= index) - 1
}

enum Frame<'a, T> {
    Node(&'a Node<T>),
    Item(&'a T),
    Slice(std::slice::Iter<'a, T>),
}

/// In-order iterator over a [`SharedList`].
pub struct Iter<'a, T> {
    stack: Vec<Frame<'a, T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        loop {
            match self.stack.pop()? {
                Frame::Item(item) => return Some(item),
                Frame::Slice(mut items) => {
                    if let Some(item) = items.next() {
                        self.stack.push(Frame::Slice(items));
                        return Some(item);
                    }
                }
                Frame::Node(node) => match node {
                    Node::Empty => {}
                    Node::Single(item) => return Some(item),
                    Node::Array(items) => self.stack.push(Frame::Slice(items.iter())),
                    Node::OneMore { prefix, last, .. } => {
                        self.stack.push(Frame::Item(last));
                        self.stack.push(Frame::Node(&*prefix.node));
                    }
                    Node::Concat { parts, .. } => {
                        for part in parts.iter().rev() {
                            self.stack.push(Frame::Node(&*part.node));
                        }
                    }
                },
            }
        }
    }
}

impl<'a, T> IntoIterator for &'a SharedList<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

impl<T> FromIterator<T> for SharedList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<T: PartialEq> PartialEq for SharedList<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || (self.len() == other.len() && self.iter().eq(other.iter()))
    }
}

impl<T: Eq> Eq for SharedList<T> {}

impl<T: fmt::Debug> fmt::Debug for SharedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
