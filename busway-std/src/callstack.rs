//! # Traversal frames (CallstackEntry)
//!
//! Every in-progress traversal owns a [`Frame`] pushed onto the context's
//! frame stack. A frame holds explicit index cursors instead of borrowing
//! the handler list, so the list can change underneath it. Structural
//! changes notify every frame over the affected holder (or table) before
//! and after they happen:
//!
//! 1. [`Cursor::on_will_remove`] or [`Cursor::on_will_insert`] with the
//!    index about to disappear or appear;
//! 2. [`Cursor::on_list_mutated`] with the new length, refreshing the end.
//!
//! With these hooks a handler that disconnects itself is still visited
//! exactly once, a handler removed before its turn is never visited, and
//! handlers already visited are unaffected. An element inserted into the
//! part of the list the pass has yet to reach is visited; one inserted into
//! the part already behind it is not.
//!
//! The frame stack lives inside the context lock, so only the thread that
//! owns the lock ever has frames on it; when that thread's outermost call
//! returns the stack is empty again.

use crate::table::HolderSlot;

/// Visitation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Forward,
    Reverse,
}

/// An index cursor over a list that may shrink or grow while it is used.
///
/// Forward cursors visit `next..end` and re-read `end` on every mutation,
/// so elements appended during the pass are visited too. Reverse cursors
/// visit `0..next` from the top down; elements appended at the tail lie
/// above the cursor and are left for the next pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor {
    direction: Direction,
    next: usize,
    end: usize,
}

impl Cursor {
    pub(crate) const fn new(direction: Direction, len: usize) -> Self {
        match direction {
            Direction::Forward => Self {
                direction,
                next: 0,
                end: len,
            },
            Direction::Reverse => Self {
                direction,
                next: len,
                end: len,
            },
        }
    }

    /// Yield the next index to visit.
    pub(crate) fn advance(&mut self) -> Option<usize> {
        match self.direction {
            Direction::Forward if self.next < self.end => {
                self.next += 1;
                Some(self.next - 1)
            }
            Direction::Reverse if self.next > 0 => {
                self.next -= 1;
                Some(self.next)
            }
            _ => None,
        }
    }

    /// The element at `index` is about to be removed.
    ///
    /// Everything after it shifts down by one. Forward cursors have already
    /// passed anything below `next`; reverse cursors have yet to reach it.
    /// Either way `next` moves with the shift.
    pub(crate) fn on_will_remove(&mut self, index: usize) {
        if index < self.next {
            self.next -= 1;
        }
    }

    /// An element is about to be inserted at `index`, shifting everything
    /// from `index` up by one.
    ///
    /// The new element sits between positions `index - 1` and `index`. A
    /// forward cursor has passed it when `index < next`. A reverse cursor
    /// has passed it only when it lies above the element visited last, so
    /// an insert right below that element (`index == next`) is still ahead.
    pub(crate) fn on_will_insert(&mut self, index: usize) {
        let passed = match self.direction {
            Direction::Forward => index < self.next,
            Direction::Reverse => index <= self.next,
        };
        if passed {
            self.next += 1;
        }
    }

    /// The list now has `len` elements.
    pub(crate) fn on_list_mutated(&mut self, len: usize) {
        if self.direction == Direction::Forward {
            self.end = len;
        }
        self.next = self.next.min(len);
    }
}

/// One in-flight traversal.
pub(crate) struct Frame<Id> {
    /// Address currently being delivered to, `None` for a broadcast
    /// between addresses.
    pub(crate) id: Option<Id>,
    /// Holder whose handler list `handlers` walks.
    pub(crate) holder: Option<HolderSlot>,
    pub(crate) handlers: Cursor,
    /// Table cursor, only for traversals spanning every address.
    pub(crate) addresses: Option<Cursor>,
    /// Holders this frame keeps alive; released when the frame pops.
    pub(crate) pins: Vec<HolderSlot>,
}

impl<Id> Frame<Id> {
    /// A frame that visits nothing by itself (routing, bookkeeping).
    pub(crate) fn marker(id: Option<Id>) -> Self {
        Self {
            id,
            holder: None,
            handlers: Cursor::new(Direction::Forward, 0),
            addresses: None,
            pins: Vec::new(),
        }
    }

    /// A frame walking the handlers of one holder.
    pub(crate) fn over_holder(id: Id, holder: HolderSlot, handlers: Cursor) -> Self {
        Self {
            id: Some(id),
            holder: Some(holder),
            handlers,
            addresses: None,
            pins: Vec::new(),
        }
    }

    /// A frame walking every address in table order.
    pub(crate) fn over_table(addresses: Cursor) -> Self {
        Self {
            id: None,
            holder: None,
            handlers: Cursor::new(Direction::Forward, 0),
            addresses: Some(addresses),
            pins: Vec::new(),
        }
    }
}

/// Notify every frame walking `holder` that `index` is about to go.
pub(crate) fn will_remove_handler<Id>(frames: &mut [Frame<Id>], holder: HolderSlot, index: usize) {
    for frame in frames.iter_mut().filter(|f| f.holder == Some(holder)) {
        frame.handlers.on_will_remove(index);
    }
}

/// Notify every frame walking `holder` that its list now has `len` entries.
pub(crate) fn handler_list_mutated<Id>(frames: &mut [Frame<Id>], holder: HolderSlot, len: usize) {
    for frame in frames.iter_mut().filter(|f| f.holder == Some(holder)) {
        frame.handlers.on_list_mutated(len);
    }
}

/// Notify every frame walking `holder` that a handler is about to be
/// inserted at `index`.
pub(crate) fn will_insert_handler<Id>(frames: &mut [Frame<Id>], holder: HolderSlot, index: usize) {
    for frame in frames.iter_mut().filter(|f| f.holder == Some(holder)) {
        frame.handlers.on_will_insert(index);
    }
}

/// Notify every table-spanning frame that an address is about to be inserted
/// at table position `index`.
pub(crate) fn will_insert_address<Id>(frames: &mut [Frame<Id>], index: usize) {
    for cursor in frames.iter_mut().filter_map(|f| f.addresses.as_mut()) {
        cursor.on_will_insert(index);
    }
}

/// Notify every table-spanning frame that table position `index` is about
/// to go.
pub(crate) fn will_remove_address<Id>(frames: &mut [Frame<Id>], index: usize) {
    for cursor in frames.iter_mut().filter_map(|f| f.addresses.as_mut()) {
        cursor.on_will_remove(index);
    }
}

/// Notify every table-spanning frame that the table now has `len` entries.
pub(crate) fn address_list_mutated<Id>(frames: &mut [Frame<Id>], len: usize) {
    for cursor in frames.iter_mut().filter_map(|f| f.addresses.as_mut()) {
        cursor.on_list_mutated(len);
    }
}
