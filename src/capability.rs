use std::ptr;

use libc::c_void;

use crate::error::{Error, Result};

pub type AllocateFn = unsafe fn(aux: *mut c_void, size: usize) -> *mut u8;
pub type ReallocateFn = unsafe fn(aux: *mut c_void, address: *mut u8, size: usize) -> *mut u8;
pub type DeallocateFn = unsafe fn(aux: *mut c_void, address: *mut u8);

/// What the underlying allocator does with the original block when a
/// reallocation fails.
///
/// `realloc(3)` keeps the original block alive, but nothing forces a custom
/// allocator to do the same. Callers of
/// [`AlignedHeap::reallocate`](crate::AlignedHeap::reallocate) must check
/// the reported policy before touching the old address again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReallocFailure {
  /// The original block is still live after a failed reallocation.
  #[default]
  Preserves,
  /// The original block is gone after a failed reallocation.
  Releases,
}

/// The allocate/reallocate/deallocate capability every heap is built on.
///
/// A null return from `allocate` or `reallocate` signals failure.
///
/// # Safety
///
/// Implementors must follow `malloc`/`realloc`/`free` semantics: a non-null
/// address returned for `size` bytes is valid for reads and writes of
/// `size` bytes until it is reallocated or deallocated, and
/// `realloc_failure` must describe what `reallocate` really does on failure.
pub unsafe trait RawAllocator {
  fn allocate(
    &self,
    size: usize,
  ) -> *mut u8;

  /// # Safety
  ///
  /// `address` must have been returned by this allocator and not freed.
  unsafe fn reallocate(
    &self,
    address: *mut u8,
    size: usize,
  ) -> *mut u8;

  /// # Safety
  ///
  /// `address` must have been returned by this allocator and not freed.
  unsafe fn deallocate(
    &self,
    address: *mut u8,
  );

  fn realloc_failure(&self) -> ReallocFailure {
    ReallocFailure::Preserves
  }
}

unsafe impl<A: RawAllocator + ?Sized> RawAllocator for &A {
  fn allocate(
    &self,
    size: usize,
  ) -> *mut u8 {
    (**self).allocate(size)
  }

  unsafe fn reallocate(
    &self,
    address: *mut u8,
    size: usize,
  ) -> *mut u8 {
    unsafe { (**self).reallocate(address, size) }
  }

  unsafe fn deallocate(
    &self,
    address: *mut u8,
  ) {
    unsafe { (**self).deallocate(address) }
  }

  fn realloc_failure(&self) -> ReallocFailure {
    (**self).realloc_failure()
  }
}

/// A capability as supplied by a caller, before it has been checked for
/// completeness.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityRecord {
  pub allocate: Option<AllocateFn>,
  pub reallocate: Option<ReallocateFn>,
  pub deallocate: Option<DeallocateFn>,
  /// Opaque value passed to all three operations.
  pub aux: *mut c_void,
  pub realloc_failure: ReallocFailure,
}

impl Default for CapabilityRecord {
  fn default() -> Self {
    Self {
      allocate: None,
      reallocate: None,
      deallocate: None,
      aux: ptr::null_mut(),
      realloc_failure: ReallocFailure::Preserves,
    }
  }
}

/// A complete, installed capability record.
#[derive(Debug, Clone, Copy)]
pub struct Capability {
  allocate: AllocateFn,
  reallocate: ReallocateFn,
  deallocate: DeallocateFn,
  aux: *mut c_void,
  realloc_failure: ReallocFailure,
}

impl Capability {
  /// Installs a capability record, rejecting it unless all three
  /// operations are present.
  ///
  /// # Safety
  ///
  /// The operations must behave like `malloc`, `realloc` and `free` for the
  /// given `aux`, `realloc_failure` must match what the reallocate operation
  /// does on failure, and `aux` must stay valid for as long as the returned
  /// capability (or any heap built on it) is in use.
  pub unsafe fn install(record: CapabilityRecord) -> Result<Self> {
    let allocate = record
      .allocate
      .ok_or(Error::IncompleteCapability("allocate"))?;
    let reallocate = record
      .reallocate
      .ok_or(Error::IncompleteCapability("reallocate"))?;
    let deallocate = record
      .deallocate
      .ok_or(Error::IncompleteCapability("deallocate"))?;

    log::debug!("installed allocator capability, aux = {:?}", record.aux);

    Ok(Self {
      allocate,
      reallocate,
      deallocate,
      aux: record.aux,
      realloc_failure: record.realloc_failure,
    })
  }

  pub fn aux(&self) -> *mut c_void {
    self.aux
  }
}

unsafe impl RawAllocator for Capability {
  fn allocate(
    &self,
    size: usize,
  ) -> *mut u8 {
    unsafe { (self.allocate)(self.aux, size) }
  }

  unsafe fn reallocate(
    &self,
    address: *mut u8,
    size: usize,
  ) -> *mut u8 {
    unsafe { (self.reallocate)(self.aux, address, size) }
  }

  unsafe fn deallocate(
    &self,
    address: *mut u8,
  ) {
    unsafe { (self.deallocate)(self.aux, address) }
  }

  fn realloc_failure(&self) -> ReallocFailure {
    self.realloc_failure
  }
}

/// The C library's `malloc`, `realloc` and `free`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibcAllocator;

impl LibcAllocator {
  /// The same operations as a capability record, ready for
  /// [`Capability::install`].
  pub fn record() -> CapabilityRecord {
    unsafe fn allocate(
      _aux: *mut c_void,
      size: usize,
    ) -> *mut u8 {
      unsafe { libc::malloc(size) as *mut u8 }
    }

    unsafe fn reallocate(
      _aux: *mut c_void,
      address: *mut u8,
      size: usize,
    ) -> *mut u8 {
      unsafe { libc::realloc(address as *mut c_void, size) as *mut u8 }
    }

    unsafe fn deallocate(
      _aux: *mut c_void,
      address: *mut u8,
    ) {
      unsafe { libc::free(address as *mut c_void) }
    }

    CapabilityRecord {
      allocate: Some(allocate),
      reallocate: Some(reallocate),
      deallocate: Some(deallocate),
      aux: ptr::null_mut(),
      realloc_failure: ReallocFailure::Preserves,
    }
  }
}

unsafe impl RawAllocator for LibcAllocator {
  fn allocate(
    &self,
    size: usize,
  ) -> *mut u8 {
    unsafe { libc::malloc(size) as *mut u8 }
  }

  unsafe fn reallocate(
    &self,
    address: *mut u8,
    size: usize,
  ) -> *mut u8 {
    unsafe { libc::realloc(address as *mut c_void, size) as *mut u8 }
  }

  unsafe fn deallocate(
    &self,
    address: *mut u8,
  ) {
    unsafe { libc::free(address as *mut c_void) }
  }
}

#[cfg(test)]
mod tests {
  use std::cell::Cell;

  use super::*;

  unsafe fn counting_allocate(
    aux: *mut c_void,
    size: usize,
  ) -> *mut u8 {
    let calls = unsafe { &*(aux as *const Cell<usize>) };
    calls.set(calls.get() + 1);
    unsafe { libc::malloc(size) as *mut u8 }
  }

  #[test]
  fn test_install_rejects_incomplete_record() {
    let mut record = LibcAllocator::record();
    record.reallocate = None;

    let result = unsafe { Capability::install(record) };

    assert_eq!(result.unwrap_err(), Error::IncompleteCapability("reallocate"));
  }

  #[test]
  fn test_install_rejects_empty_record() {
    let result = unsafe { Capability::install(CapabilityRecord::default()) };

    assert_eq!(result.unwrap_err(), Error::IncompleteCapability("allocate"));
  }

  #[test]
  fn test_install_passes_aux_to_operations() {
    let calls = Cell::new(0usize);
    let record = CapabilityRecord {
      allocate: Some(counting_allocate),
      aux: &calls as *const Cell<usize> as *mut c_void,
      ..LibcAllocator::record()
    };

    let capability = unsafe { Capability::install(record) }.unwrap();
    assert_eq!(capability.aux(), record.aux);

    let address = capability.allocate(32);
    assert!(!address.is_null());
    assert_eq!(calls.get(), 1);

    unsafe { capability.deallocate(address) };
  }

  #[test]
  fn test_libc_allocator_round_trip() {
    let allocator = LibcAllocator;

    unsafe {
      let address = allocator.allocate(8);
      assert!(!address.is_null());

      *address = 7;

      let address = allocator.reallocate(address, 64);
      assert!(!address.is_null());
      assert_eq!(*address, 7);

      allocator.deallocate(address);
    }

    assert_eq!(allocator.realloc_failure(), ReallocFailure::Preserves);
  }
}
