//! Allocators used by the unit tests.

use std::{cell::Cell, ptr};

use libc::c_void;

use crate::capability::{RawAllocator, ReallocFailure};

/// `malloc`-backed allocator that counts calls and can be told to start
/// failing after a number of successful requests.
#[derive(Debug, Default)]
pub struct TestAllocator {
  allocations: Cell<usize>,
  reallocations: Cell<usize>,
  deallocations: Cell<usize>,
  live: Cell<usize>,
  successes: Cell<usize>,
  fail_after: Option<usize>,
  realloc_failure: ReallocFailure,
}

impl TestAllocator {
  pub fn failing_after(successes: usize) -> Self {
    Self {
      fail_after: Some(successes),
      ..Self::default()
    }
  }

  pub fn releasing_on_failure(mut self) -> Self {
    self.realloc_failure = ReallocFailure::Releases;
    self
  }

  pub fn allocations(&self) -> usize {
    self.allocations.get()
  }

  pub fn reallocations(&self) -> usize {
    self.reallocations.get()
  }

  pub fn deallocations(&self) -> usize {
    self.deallocations.get()
  }

  pub fn live(&self) -> usize {
    self.live.get()
  }

  fn exhausted(&self) -> bool {
    self
      .fail_after
      .is_some_and(|limit| self.successes.get() >= limit)
  }

  fn succeed(&self) {
    self.successes.set(self.successes.get() + 1);
  }
}

unsafe impl RawAllocator for TestAllocator {
  fn allocate(
    &self,
    size: usize,
  ) -> *mut u8 {
    if self.exhausted() {
      return ptr::null_mut();
    }

    self.succeed();
    self.allocations.set(self.allocations.get() + 1);
    self.live.set(self.live.get() + 1);

    unsafe { libc::malloc(size) as *mut u8 }
  }

  unsafe fn reallocate(
    &self,
    address: *mut u8,
    size: usize,
  ) -> *mut u8 {
    if self.exhausted() {
      if self.realloc_failure == ReallocFailure::Releases {
        self.live.set(self.live.get() - 1);
        unsafe { libc::free(address as *mut c_void) };
      }
      return ptr::null_mut();
    }

    self.succeed();
    self.reallocations.set(self.reallocations.get() + 1);

    unsafe { libc::realloc(address as *mut c_void, size) as *mut u8 }
  }

  unsafe fn deallocate(
    &self,
    address: *mut u8,
  ) {
    self.deallocations.set(self.deallocations.get() + 1);
    self.live.set(self.live.get() - 1);

    unsafe { libc::free(address as *mut c_void) }
  }

  fn realloc_failure(&self) -> ReallocFailure {
    self.realloc_failure
  }
}

/// Allocator whose blocks start 1 to 15 bytes past a 16-byte boundary, with
/// a different shift on every request.
#[derive(Debug, Default)]
pub struct ShiftingAllocator {
  last_shift: Cell<usize>,
  live: Cell<usize>,
}

impl ShiftingAllocator {
  pub fn live(&self) -> usize {
    self.live.get()
  }

  fn next_shift(&self) -> usize {
    let shift = self.last_shift.get() % 15 + 1;
    self.last_shift.set(shift);
    shift
  }
}

unsafe impl RawAllocator for ShiftingAllocator {
  fn allocate(
    &self,
    size: usize,
  ) -> *mut u8 {
    unsafe {
      let raw = libc::malloc(size + 16) as *mut u8;
      if raw.is_null() {
        return raw;
      }

      let shift = self.next_shift();
      let base = raw.add(shift);
      base.sub(1).write(shift as u8);
      self.live.set(self.live.get() + 1);

      base
    }
  }

  unsafe fn reallocate(
    &self,
    address: *mut u8,
    size: usize,
  ) -> *mut u8 {
    unsafe {
      let old_shift = address.sub(1).read() as usize;
      let raw = libc::realloc(address.sub(old_shift) as *mut c_void, size + 16) as *mut u8;
      if raw.is_null() {
        return raw;
      }

      let shift = self.next_shift();
      ptr::copy(raw.add(old_shift), raw.add(shift), size);
      let base = raw.add(shift);
      base.sub(1).write(shift as u8);

      base
    }
  }

  unsafe fn deallocate(
    &self,
    address: *mut u8,
  ) {
    unsafe {
      let shift = address.sub(1).read() as usize;
      libc::free(address.sub(shift) as *mut c_void);
    }
    self.live.set(self.live.get() - 1);
  }
}
