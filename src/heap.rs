use std::{mem, ptr, ptr::NonNull};

use crate::{
  align::{ALIGNMENT, checked_align_up},
  align_up,
  capability::{RawAllocator, ReallocFailure},
  error::{Error, Result},
};

/// Hidden record placed right before every address the heap hands out.
#[repr(C, align(16))]
struct AllocationHeader {
  /// Logical size of the allocation, rounded up to [`ALIGNMENT`].
  requested_size: usize,
  /// Address actually returned by the underlying allocator.
  original_base: *mut u8,
}

const HEADER_SIZE: usize = mem::size_of::<AllocationHeader>();

const _: () = assert!(HEADER_SIZE % ALIGNMENT == 0);
const _: () = assert!(mem::align_of::<AllocationHeader>() == ALIGNMENT);

/// Heap whose allocations are always aligned to [`ALIGNMENT`], whatever the
/// alignment of the underlying allocator.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlignedHeap<A: RawAllocator> {
  allocator: A,
}

impl<A: RawAllocator> AlignedHeap<A> {
  pub fn new(allocator: A) -> Self {
    Self { allocator }
  }

  pub fn allocator(&self) -> &A {
    &self.allocator
  }

  /// Allocates at least `size` bytes at an aligned address.
  pub fn allocate(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    let (rounded, total) = padded_size(size)?;

    let Some(base) = NonNull::new(self.allocator.allocate(total)) else {
      log::warn!("allocation of {} bytes failed", total);
      return Err(Error::OutOfMemory { size });
    };

    let address = unsafe { place_header(base, rounded) };

    log::trace!(
      "allocated {} bytes, base = {:?}, address = {:?}",
      rounded,
      base,
      address
    );

    Ok(address)
  }

  /// Resizes an allocation, moving it if needed. `None` allocates.
  ///
  /// On failure the outcome for the original allocation is whatever the
  /// underlying allocator does: [`Error::ReallocFailed`] carries `released`
  /// set when the allocator freed the original block, in which case
  /// `address` must not be used again.
  ///
  /// # Safety
  ///
  /// `address` must have been returned by this heap and not freed. On
  /// success it is invalidated in favour of the returned address.
  pub unsafe fn reallocate(
    &self,
    address: Option<NonNull<u8>>,
    size: usize,
  ) -> Result<NonNull<u8>> {
    let Some(address) = address else {
      return self.allocate(size);
    };

    let (rounded, total) = padded_size(size)?;

    let header = unsafe { header_of(address).read() };
    let old_offset = address.as_ptr() as usize - header.original_base as usize;

    let resized = unsafe { self.allocator.reallocate(header.original_base, total) };

    let Some(base) = NonNull::new(resized) else {
      let released = self.allocator.realloc_failure() == ReallocFailure::Releases;
      log::warn!(
        "reallocation of {:?} to {} bytes failed, original released = {}",
        address,
        total,
        released
      );
      return Err(Error::ReallocFailed { size, released });
    };

    // The underlying allocator preserved the bytes relative to its base, but
    // the padding in front of the aligned address may differ in the new block.
    let new_offset = aligned_offset(base);
    if new_offset != old_offset {
      let kept = header.requested_size.min(rounded);
      unsafe {
        ptr::copy(
          base.as_ptr().add(old_offset),
          base.as_ptr().add(new_offset),
          kept,
        );
      }
    }

    let resized = unsafe { place_header(base, rounded) };

    log::trace!(
      "reallocated {:?} ({} bytes) to {:?} ({} bytes)",
      address,
      header.requested_size,
      resized,
      rounded
    );

    Ok(resized)
  }

  /// Releases an allocation. `None` is a no-op.
  ///
  /// # Safety
  ///
  /// `address` must have been returned by this heap and not freed.
  pub unsafe fn free(
    &self,
    address: Option<NonNull<u8>>,
  ) {
    let Some(address) = address else {
      return;
    };

    let base = unsafe { (*header_of(address)).original_base };

    log::trace!("freeing {:?}, base = {:?}", address, base);

    unsafe { self.allocator.deallocate(base) }
  }

  /// Size recorded for a live allocation, rounded up to [`ALIGNMENT`].
  ///
  /// # Safety
  ///
  /// `address` must have been returned by this heap and not freed.
  pub unsafe fn allocation_size(
    &self,
    address: NonNull<u8>,
  ) -> usize {
    unsafe { (*header_of(address)).requested_size }
  }
}

/// Returns the rounded logical size and the size to request from the
/// underlying allocator.
fn padded_size(size: usize) -> Result<(usize, usize)> {
  let rounded = checked_align_up(size, ALIGNMENT).ok_or(Error::SizeOverflow { size })?;
  let total = rounded
    .checked_add(HEADER_SIZE + ALIGNMENT)
    .ok_or(Error::SizeOverflow { size })?;
  Ok((rounded, total))
}

/// Distance from `base` to the first aligned address that leaves room for a
/// header in front of it.
fn aligned_offset(base: NonNull<u8>) -> usize {
  let start = base.as_ptr() as usize;
  align_up!(start + HEADER_SIZE) - start
}

unsafe fn place_header(
  base: NonNull<u8>,
  requested_size: usize,
) -> NonNull<u8> {
  unsafe {
    let address = base.add(aligned_offset(base));
    header_of(address).write(AllocationHeader {
      requested_size,
      original_base: base.as_ptr(),
    });
    address
  }
}

unsafe fn header_of(address: NonNull<u8>) -> *mut AllocationHeader {
  unsafe { address.cast::<AllocationHeader>().as_ptr().sub(1) }
}
