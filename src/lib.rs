//! # alignbuf - Aligned Heap and Growable Buffers
//!
//! This crate provides a swappable heap that aligns every allocation to a
//! fixed 16-byte boundary, and a growable buffer built on top of it.
//!
//! ## Overview
//!
//! ```text
//!   Layering:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │  Buffer<T, A> / MemoryStream<A>        arrays, byte streams, text    │
//!   ├──────────────────────────────────────────────────────────────────────┤
//!   │  AlignedHeap<A>                        16-byte aligned addresses     │
//!   ├──────────────────────────────────────────────────────────────────────┤
//!   │  A: RawAllocator                       malloc / realloc / free       │
//!   │  (LibcAllocator, installed Capability, your own)                     │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The allocator is a value handed to the heap at construction time, so a
//! heap can never be used before an allocator exists, and two heaps can use
//! two different allocators side by side.
//!
//! ## Crate Structure
//!
//! ```text
//!   alignbuf
//!   ├── align       - ALIGNMENT and alignment helpers (align_up!)
//!   ├── capability  - RawAllocator, capability records, LibcAllocator
//!   ├── heap        - AlignedHeap implementation
//!   ├── buffer      - Buffer implementation
//!   ├── stream      - MemoryStream over a byte buffer
//!   └── error       - Error and Result
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use alignbuf::{AlignedHeap, Buffer, LibcAllocator};
//!
//! let mut numbers: Buffer<u32> = Buffer::new_in(AlignedHeap::new(LibcAllocator));
//!
//! for i in 0..10 {
//!     numbers.push(i).unwrap();
//! }
//! assert_eq!(numbers[3], 3);
//!
//! let mut bytes: Buffer<u8> = Buffer::new();
//! bytes.write(b"hello").unwrap();
//!
//! let mut cursor = 0;
//! let mut out = [0u8; 5];
//! bytes.read(&mut out, &mut cursor).unwrap();
//! assert_eq!(&out, b"hello");
//! assert_eq!(cursor, 5);
//! ```
//!
//! ## How It Works
//!
//! The heap over-allocates every request and hides a header right before
//! the address it returns:
//!
//! ```text
//!   Single Allocation:
//!
//!   base (from allocator)
//!   ▼
//!   ┌─────────┬─────────────────────────┬────────────────────────────┬─────┐
//!   │ padding │   AllocationHeader      │     requested bytes        │     │
//!   │ 0..15 B │ ┌─────────────────────┐ │  (rounded up to 16)        │     │
//!   │         │ │ requested_size      │ │                            │     │
//!   │         │ │ original_base       │ │                            │     │
//!   │         │ └─────────────────────┘ │                            │     │
//!   │         │        16 bytes         │                            │     │
//!   └─────────┴─────────────────────────┴────────────────────────────┴─────┘
//!                                       ▲
//!                                       └── address returned, addr % 16 == 0
//! ```
//!
//! A buffer's storage is one such allocation holding a second header with
//! its capacity and length, followed by the elements:
//!
//! ```text
//!   ┌──────────────────┬──────────────────┬─────┬─────┬─────┬─────────────┐
//!   │ AllocationHeader │ BufferHeader     │ e0  │ e1  │ ... │  headroom   │
//!   │                  │ capacity, size   │     │     │     │             │
//!   └──────────────────┴──────────────────┴─────┴─────┴─────┴─────────────┘
//! ```
//!
//! An empty buffer owns no storage at all. Growth keeps at least one free
//! element of headroom and at least doubles the capacity:
//!
//! ```text
//!   pushes:    1    2..4    5..10    11..22
//!   capacity:  2    5       11       23        (2 * old + additional)
//! ```
//!
//! ## Reallocation Failure
//!
//! Whether a block survives a failed reallocation depends on the allocator.
//! Each [`RawAllocator`] reports it through [`ReallocFailure`]; the heap
//! forwards it in [`Error::ReallocFailed`], and a [`Buffer`] whose storage
//! was released that way falls back to the empty state.
//!
//! ## Limitations
//!
//! - **No synchronization**: a heap and its buffers are meant for one thread
//!   at a time; sharing an allocator across threads is only sound if the
//!   allocator itself is.
//! - **Plain data only**: buffer elements are [`bytemuck::Pod`] types with an
//!   alignment of at most 16 bytes.

pub mod align;
mod buffer;
mod capability;
mod error;
mod heap;
mod stream;

#[cfg(test)]
mod testing;

pub use buffer::Buffer;
pub use capability::{
  AllocateFn, Capability, CapabilityRecord, DeallocateFn, LibcAllocator, RawAllocator,
  ReallocFailure, ReallocateFn,
};
pub use error::{Error, Result};
pub use heap::AlignedHeap;
pub use stream::MemoryStream;
