//! Fixed-capacity owning list with stable, non-owning sub-range views.
//!
//! The sample store needs one owning sequence of leaf samples and, for every
//! reduction-level node, a view over the contiguous block of leaves beneath
//! it. Views are plain index ranges ([`SubRange`]) resolved against the owner
//! through a borrow, so a view can never outlive the storage it refers to and
//! dropping a view never touches the elements.
//!
//! Elements are released exactly once when the owning list is dropped, via
//! an optional release hook supplied at construction (the sample store uses
//! it to close each sample's counter handle).

use std::fmt;
use std::ops::Range;

/// Error returned by [`FixedList`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListError {
    /// A push was attempted on a list already holding `capacity` elements.
    Full {
        /// Capacity fixed at construction.
        capacity: usize,
    },
    /// A sub-range extends past the end of the list.
    OutOfRange {
        /// First index of the requested range.
        start: usize,
        /// Number of elements requested.
        len: usize,
        /// Current length of the list.
        available: usize,
    },
}

impl fmt::Display for ListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListError::Full { capacity } => {
                write!(f, "list is full (capacity {})", capacity)
            }
            ListError::OutOfRange {
                start,
                len,
                available,
            } => write!(
                f,
                "sub-range {}..{} exceeds list length {}",
                start,
                start + len,
                available
            ),
        }
    }
}

impl std::error::Error for ListError {}

/// A contiguous, non-owning view into a [`FixedList`].
///
/// Resolve it with [`FixedList::view`]; mutations made through the owner are
/// visible through the view and vice versa since both address the same
/// storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubRange {
    start: usize,
    len: usize,
}

impl SubRange {
    /// First index covered by the view.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Number of elements covered by the view.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the view covers no element.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last index covered by the view.
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Whether `index` falls inside the view.
    pub fn contains(&self, index: usize) -> bool {
        (self.start..self.end()).contains(&index)
    }

    /// The covered indices.
    pub fn indices(&self) -> Range<usize> {
        self.start..self.end()
    }
}

type ReleaseFn<T> = Box<dyn Fn(&mut T) + Send + Sync>;

/// Owning, fixed-capacity ordered sequence.
pub struct FixedList<T> {
    items: Vec<T>,
    capacity: usize,
    release: Option<ReleaseFn<T>>,
}

impl<T> FixedList<T> {
    /// Create an empty list able to hold `capacity` elements.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            release: None,
        }
    }

    /// Create an empty list whose elements are passed to `release` when the
    /// list is dropped.
    pub fn with_release<F>(capacity: usize, release: F) -> Self
    where
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            release: Some(Box::new(release)),
        }
    }

    /// Append an element.
    ///
    /// # Errors
    ///
    /// Returns [`ListError::Full`] if the list already holds `capacity`
    /// elements. The rejected element is released and dropped.
    pub fn push(&mut self, mut item: T) -> Result<(), ListError> {
        if self.items.len() == self.capacity {
            if let Some(release) = &self.release {
                release(&mut item);
            }
            return Err(ListError::Full {
                capacity: self.capacity,
            });
        }
        self.items.push(item);
        Ok(())
    }

    /// Element at `index`.
    ///
    /// Indices are derived from valid leaf logical indices, so an out-of-range
    /// index is a programming error and panics.
    #[inline]
    pub fn get(&self, index: usize) -> &T {
        &self.items[index]
    }

    /// Number of elements currently held.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list holds no element.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Capacity fixed at construction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Create a view over `len` elements starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`ListError::OutOfRange`] if the range extends past the
    /// elements pushed so far.
    pub fn sub_range(&self, start: usize, len: usize) -> Result<SubRange, ListError> {
        if start.checked_add(len).map_or(true, |end| end > self.items.len()) {
            return Err(ListError::OutOfRange {
                start,
                len,
                available: self.items.len(),
            });
        }
        Ok(SubRange { start, len })
    }

    /// Resolve a view to the elements it covers.
    pub fn view(&self, range: SubRange) -> &[T] {
        &self.items[range.indices()]
    }

    /// Fold the elements of `range` left to right into `seed`.
    ///
    /// `combine` must be associative and commutative for the result to be
    /// independent of element order.
    pub fn reduce<A, F>(&self, range: SubRange, seed: A, combine: F) -> A
    where
        F: FnMut(A, &T) -> A,
    {
        self.view(range).iter().fold(seed, combine)
    }

    /// Invoke `f` on every element.
    pub fn apply<F>(&self, f: F)
    where
        F: FnMut(&T),
    {
        self.items.iter().for_each(f);
    }

    /// Iterate over all elements in index order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> Drop for FixedList<T> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            for item in &mut self.items {
                release(item);
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for FixedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedList")
            .field("len", &self.items.len())
            .field("capacity", &self.capacity)
            .field("items", &self.items)
            .finish()
    }
}
