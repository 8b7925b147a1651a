//! Compile-time qubit and result address allocation.
//!
//! The [`AllocationManager`] hands out integer addresses for qubits and
//! results the way a runtime qubit manager would, but at compile time, so
//! that dynamic allocation calls can be replaced by constant pointers.
//!
//! # Reuse areas
//!
//! Released addresses go to the free list of the innermost open scope. A
//! restricted reuse area splits its lifetime into segments: an address
//! released in one segment may be handed out again in that same segment,
//! but once the next segment starts it stays blocked until the whole area
//! ends. Ending an area returns all of its free addresses to the enclosing
//! scope.
//!
//! ```
//! use qat_compile::AllocationManager;
//!
//! let mut manager = AllocationManager::new();
//! manager.start_restricted_reuse_area();
//! let a = manager.allocate("a", 1).unwrap();
//! manager.release(a).unwrap();
//! manager.next_restricted_reuse_segment().unwrap();
//!
//! // `a` was released in the previous segment and cannot be reused yet.
//! let b = manager.allocate("b", 1).unwrap();
//! assert_ne!(a, b);
//!
//! manager.end_restricted_reuse_area().unwrap();
//! manager.release(b).unwrap();
//! assert!(manager.allocate("c", 1).unwrap() <= 1);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::Serialize;
use thiserror::Error;
use tracing::trace;

/// An allocated address.
pub type Address = u64;

/// Shared handle to an allocation manager.
///
/// A profile owns one manager for qubits and one for results; the rules
/// built from it and the transformation pass hold clones of the handle.
pub type AllocationManagerPtr = Rc<RefCell<AllocationManager>>;

/// Default number of addresses reserved before the first extension.
pub const DEFAULT_CAPACITY: u64 = 8;

/// Errors reported by the allocation manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AllocationError {
    /// The capacity is exhausted and may not be extended.
    #[error("Cannot allocate {requested} address(es): capacity of {capacity} is exhausted")]
    CapacityExhausted {
        /// Configured capacity.
        capacity: u64,
        /// Number of addresses requested.
        requested: u64,
    },

    /// The address does not start a live allocation.
    #[error("Address {0} is not allocated")]
    NotAllocated(Address),

    /// A segment or area operation was issued without an open area.
    #[error("No restricted reuse area is open")]
    NoOpenArea,
}

/// Result type for allocation operations.
pub type AllocationResult<T> = Result<T, AllocationError>;

/// A contiguous range of allocated addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocatedBlock {
    /// Name of the allocation, empty if unnamed.
    pub name: String,
    /// Number of addresses in the block.
    pub count: u64,
    /// First address.
    pub start: Address,
    /// One past the last address.
    pub end: Address,
}

#[derive(Debug, Clone, Default)]
struct ReuseScope {
    reuse_allowed: Vec<Address>,
    reuse_prohibited: Vec<Address>,
    /// Nearest enclosing scope that may still hold reusable addresses.
    prev_with_free: usize,
}

/// Allocates addresses with scoped reuse control.
#[derive(Debug, Clone)]
pub struct AllocationManager {
    next_id: Address,
    initial_capacity: u64,
    capacity: u64,
    may_extend: bool,
    reuse: bool,
    scopes: Vec<ReuseScope>,
    allocated: FxHashMap<Address, AllocatedBlock>,
    in_use: u64,
    max_used: u64,
}

impl AllocationManager {
    /// Create a manager with the default capacity that extends on demand.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, true)
    }

    /// Create a manager with a fixed initial capacity.
    ///
    /// If `may_extend` is false, requests beyond `capacity` fail.
    pub fn with_capacity(capacity: u64, may_extend: bool) -> Self {
        Self {
            next_id: 0,
            initial_capacity: capacity,
            capacity,
            may_extend,
            reuse: true,
            scopes: vec![ReuseScope::default()],
            allocated: FxHashMap::default(),
            in_use: 0,
            max_used: 0,
        }
    }

    /// Create a shared handle to a new manager.
    pub fn create_new() -> AllocationManagerPtr {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Enable or disable reuse of released addresses.
    pub fn set_reuse_registers(&mut self, reuse: bool) {
        self.reuse = reuse;
    }

    /// Check whether released addresses are reused.
    pub fn reuse_registers(&self) -> bool {
        self.reuse
    }

    /// Allocate `count` addresses and return the first one.
    ///
    /// Single addresses are taken from the reusable free lists when reuse is
    /// enabled. Blocks of several addresses are always fresh and contiguous.
    /// An empty request returns the next fresh address without reserving
    /// it; there is nothing to release for it.
    pub fn allocate(&mut self, name: &str, count: u64) -> AllocationResult<Address> {
        if count == 0 {
            trace!("empty allocation '{name}' at {}", self.next_id);
            return Ok(self.next_id);
        }
        let in_use = self.in_use.checked_add(count).ok_or(AllocationError::CapacityExhausted {
            capacity: self.capacity,
            requested: count,
        })?;

        let start = if count == 1 && self.reuse {
            match self.take_free_id() {
                Some(id) => id,
                None => self.extend(count)?,
            }
        } else {
            self.extend(count)?
        };

        self.allocated.insert(
            start,
            AllocatedBlock {
                name: name.to_string(),
                count,
                start,
                end: start + count,
            },
        );
        self.in_use = in_use;
        self.max_used = self.max_used.max(self.in_use);
        trace!("allocated {count} address(es) at {start} for '{name}'");
        Ok(start)
    }

    /// Release the allocation starting at `address`.
    ///
    /// The freed addresses join the reusable list of the innermost open
    /// scope, regardless of where they were allocated.
    pub fn release(&mut self, address: Address) -> AllocationResult<()> {
        let block = self
            .allocated
            .remove(&address)
            .ok_or(AllocationError::NotAllocated(address))?;
        self.in_use -= block.count;
        if self.reuse {
            let top = self.top_mut();
            top.reuse_allowed.extend((block.start..block.end).rev());
        }
        trace!("released {} address(es) at {address}", block.count);
        Ok(())
    }

    /// Open a nested restricted reuse area.
    pub fn start_restricted_reuse_area(&mut self) {
        let prev_with_free = self.scopes.len() - 1;
        self.scopes.push(ReuseScope {
            prev_with_free,
            ..ReuseScope::default()
        });
    }

    /// Close the current segment of the innermost area and start a new one.
    pub fn next_restricted_reuse_segment(&mut self) -> AllocationResult<()> {
        if self.scopes.len() < 2 {
            return Err(AllocationError::NoOpenArea);
        }
        let top = self.top_mut();
        let released = std::mem::take(&mut top.reuse_allowed);
        top.reuse_prohibited.extend(released);
        Ok(())
    }

    /// Close the innermost area, handing its free addresses to the enclosing scope.
    pub fn end_restricted_reuse_area(&mut self) -> AllocationResult<()> {
        if self.scopes.len() < 2 {
            return Err(AllocationError::NoOpenArea);
        }
        let ended = self.scopes.pop().ok_or(AllocationError::NoOpenArea)?;
        let containing = self.top_mut();
        if ended.prev_with_free < containing.prev_with_free {
            containing.prev_with_free = ended.prev_with_free;
        }
        containing.reuse_allowed.extend(ended.reuse_prohibited);
        containing.reuse_allowed.extend(ended.reuse_allowed);
        Ok(())
    }

    /// Number of open restricted reuse areas.
    pub fn open_areas(&self) -> usize {
        self.scopes.len() - 1
    }

    /// Number of addresses currently allocated.
    pub fn allocations_in_use(&self) -> u64 {
        self.in_use
    }

    /// Highest number of addresses allocated at the same time.
    pub fn max_allocations_used(&self) -> u64 {
        self.max_used
    }

    /// One past the highest address ever handed out.
    pub fn address_extent(&self) -> u64 {
        self.next_id
    }

    /// Current capacity.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// First address of the live allocation with the given name.
    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.allocated
            .values()
            .filter(|block| block.name == name)
            .map(|block| block.start)
            .min()
    }

    /// Live allocations ordered by address.
    pub fn mappings(&self) -> Vec<AllocatedBlock> {
        let mut blocks: Vec<_> = self.allocated.values().cloned().collect();
        blocks.sort_by_key(|block| block.start);
        blocks
    }

    /// Forget all allocations, areas and statistics.
    pub fn reset(&mut self) {
        self.next_id = 0;
        self.capacity = self.initial_capacity;
        self.scopes = vec![ReuseScope::default()];
        self.allocated.clear();
        self.in_use = 0;
        self.max_used = 0;
    }

    fn top_mut(&mut self) -> &mut ReuseScope {
        let top = self.scopes.len() - 1;
        &mut self.scopes[top]
    }

    /// Take a reusable address from the innermost scope that has one.
    fn take_free_id(&mut self) -> Option<Address> {
        let top = self.scopes.len() - 1;
        if let Some(id) = self.scopes[top].reuse_allowed.pop() {
            return Some(id);
        }
        if top == 0 {
            return None;
        }

        let mut index = top;
        let found = loop {
            index = self.scopes[index].prev_with_free;
            let found = self.scopes[index].reuse_allowed.pop();
            if found.is_some() || index == 0 {
                break found;
            }
        };
        // Scopes skipped on the way stay empty until this area ends.
        self.scopes[top].prev_with_free = index;
        found
    }

    fn extend(&mut self, count: u64) -> AllocationResult<Address> {
        let exhausted = AllocationError::CapacityExhausted {
            capacity: self.capacity,
            requested: count,
        };
        let Some(end) = self.next_id.checked_add(count) else {
            return Err(exhausted);
        };
        if end > self.capacity {
            if !self.may_extend {
                return Err(exhausted);
            }
            self.capacity = end.max(self.capacity.saturating_mul(2));
        }
        let start = self.next_id;
        self.next_id = end;
        Ok(start)
    }
}

impl Default for AllocationManager {
    fn default() -> Self {
        Self::new()
    }
}
