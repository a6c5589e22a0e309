use std::{
  fmt, io,
  marker::PhantomData,
  mem,
  ops::{Deref, DerefMut},
  ptr::{self, NonNull},
  slice,
};

use bytemuck::Pod;

use crate::{
  align::ALIGNMENT,
  capability::{LibcAllocator, RawAllocator},
  error::{Error, Result},
  heap::AlignedHeap,
};

/// Metadata stored in front of the elements of every present buffer.
#[repr(C, align(16))]
struct BufferHeader {
  /// Elements the storage can hold without reallocating.
  capacity: usize,
  /// Elements in use.
  size: usize,
}

const HEADER_SIZE: usize = mem::size_of::<BufferHeader>();

const _: () = assert!(HEADER_SIZE == ALIGNMENT);

/// Contiguous growable sequence of plain-old-data elements.
///
/// The buffer owns a single [`AlignedHeap`] allocation laid out as a
/// `BufferHeader` followed by the elements, so element zero is always
/// aligned to [`ALIGNMENT`]. An empty buffer owns no allocation at all.
///
/// ```text
///   ┌──────────────────┬─────────────────┬────────────────────────────┐
///   │ AllocationHeader │  BufferHeader   │  elements[0..capacity]     │
///   │ (heap)           │ capacity, size  │                            │
///   └──────────────────┴─────────────────┴────────────────────────────┘
///                      ▲                 ▲
///                      └── handle        └── element zero
/// ```
pub struct Buffer<T: Pod, A: RawAllocator = LibcAllocator> {
  raw: Option<NonNull<BufferHeader>>,
  heap: AlignedHeap<A>,
  _marker: PhantomData<T>,
}

unsafe impl<T: Pod + Send, A: RawAllocator + Send> Send for Buffer<T, A> {}
unsafe impl<T: Pod + Sync, A: RawAllocator + Sync> Sync for Buffer<T, A> {}

impl<T: Pod> Buffer<T, LibcAllocator> {
  pub fn new() -> Self {
    Self::new_in(AlignedHeap::new(LibcAllocator))
  }
}

impl<T: Pod> Default for Buffer<T, LibcAllocator> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Pod, A: RawAllocator> Buffer<T, A> {
  const ELEMENT_FITS: () = assert!(
    mem::align_of::<T>() <= ALIGNMENT,
    "buffer elements cannot be aligned beyond the heap alignment"
  );

  /// Creates an absent buffer. Nothing is allocated until it first grows.
  pub fn new_in(heap: AlignedHeap<A>) -> Self {
    let () = Self::ELEMENT_FITS;

    Self {
      raw: None,
      heap,
      _marker: PhantomData,
    }
  }

  pub fn heap(&self) -> &AlignedHeap<A> {
    &self.heap
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.header().map_or(0, |header| header.size)
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  #[inline]
  pub fn capacity(&self) -> usize {
    self.header().map_or(0, |header| header.capacity)
  }

  /// True when the buffer owns no storage.
  #[inline]
  pub fn is_absent(&self) -> bool {
    self.raw.is_none()
  }

  #[inline]
  pub fn as_slice(&self) -> &[T] {
    match self.raw {
      Some(raw) => unsafe { slice::from_raw_parts(Self::elements(raw), raw.as_ref().size) },
      None => &[],
    }
  }

  #[inline]
  pub fn as_mut_slice(&mut self) -> &mut [T] {
    match self.raw {
      Some(raw) => unsafe { slice::from_raw_parts_mut(Self::elements(raw), raw.as_ref().size) },
      None => &mut [],
    }
  }

  /// Makes sure `additional` more elements fit, keeping one element of
  /// headroom. Never changes the length.
  #[inline]
  pub fn try_grow(
    &mut self,
    additional: usize,
  ) -> Result<()> {
    self.reserve(additional).map(|_| ())
  }

  /// Grows the buffer and appends `additional` zeroed elements.
  pub fn expand(
    &mut self,
    additional: usize,
  ) -> Result<()> {
    let raw = self.reserve(additional)?;
    unsafe {
      let header = raw.as_ptr();
      Self::elements(raw)
        .add((*header).size)
        .write_bytes(0, additional);
      (*header).size += additional;
    }

    Ok(())
  }

  /// Appends one element.
  #[inline]
  pub fn push(
    &mut self,
    value: T,
  ) -> Result<()> {
    let raw = self.reserve(1)?;
    unsafe {
      let header = raw.as_ptr();
      Self::elements(raw).add((*header).size).write(value);
      (*header).size += 1;
    }

    Ok(())
  }

  /// Appends a copy of every element of `values`.
  pub fn extend_from_slice(
    &mut self,
    values: &[T],
  ) -> Result<()> {
    let raw = self.reserve(values.len())?;
    unsafe {
      let header = raw.as_ptr();
      ptr::copy_nonoverlapping(
        values.as_ptr(),
        Self::elements(raw).add((*header).size),
        values.len(),
      );
      (*header).size += values.len();
    }

    Ok(())
  }

  /// Sets the length to `new_size`.
  ///
  /// Shrinking only lowers the length and keeps the storage. Growing a
  /// present buffer goes through [`expand`](Self::expand); growing an absent
  /// buffer allocates exactly `new_size` elements with no headroom, except
  /// that a size of zero leaves it absent. New elements are zeroed.
  pub fn resize(
    &mut self,
    new_size: usize,
  ) -> Result<()> {
    let Some(raw) = self.raw else {
      if new_size == 0 {
        return Ok(());
      }
      let raw = self.allocate_storage(new_size)?;
      unsafe {
        Self::elements(raw).write_bytes(0, new_size);
        (*raw.as_ptr()).size = new_size;
      }
      self.raw = Some(raw);
      return Ok(());
    };

    let size = unsafe { raw.as_ref().size };
    if size >= new_size {
      unsafe { (*raw.as_ptr()).size = new_size };
      Ok(())
    } else {
      self.expand(new_size - size)
    }
  }

  /// Drops every element but keeps the storage for reuse.
  pub fn clear(&mut self) {
    if let Some(raw) = self.raw {
      unsafe { (*raw.as_ptr()).size = 0 };
    }
  }

  /// Releases the storage and returns the buffer to the absent state.
  pub fn free(&mut self) {
    if let Some(raw) = self.raw.take() {
      log::trace!("freeing buffer storage at {:?}", raw);
      unsafe { self.heap.free(Some(raw.cast())) };
    }
  }

  fn header(&self) -> Option<&BufferHeader> {
    self.raw.map(|raw| unsafe { &*raw.as_ptr() })
  }

  /// Growth check behind every appending operation; returns the storage
  /// that is guaranteed to fit `additional` more elements.
  #[inline]
  fn reserve(
    &mut self,
    additional: usize,
  ) -> Result<NonNull<BufferHeader>> {
    if let Some(raw) = self.raw {
      let header = unsafe { raw.as_ref() };
      let fits = header
        .size
        .checked_add(additional)
        .is_some_and(|needed| needed < header.capacity);
      if fits {
        return Ok(raw);
      }
    }

    self.grow(additional)
  }

  #[inline]
  fn elements(raw: NonNull<BufferHeader>) -> *mut T {
    unsafe { raw.as_ptr().add(1).cast::<T>() }
  }

  fn storage_size(count: usize) -> Result<usize> {
    count
      .checked_mul(mem::size_of::<T>())
      .and_then(|bytes| bytes.checked_add(HEADER_SIZE))
      .ok_or(Error::SizeOverflow { size: count })
  }

  fn allocate_storage(
    &self,
    capacity: usize,
  ) -> Result<NonNull<BufferHeader>> {
    let address = self.heap.allocate(Self::storage_size(capacity)?)?;
    let raw = address.cast::<BufferHeader>();
    unsafe { raw.write(BufferHeader { capacity, size: 0 }) };

    log::debug!("allocated buffer storage for {} elements", capacity);

    Ok(raw)
  }

  /// Reallocates to `2 * capacity + additional` elements, or allocates
  /// `additional + 1` elements for an absent buffer.
  #[cold]
  fn grow(
    &mut self,
    additional: usize,
  ) -> Result<NonNull<BufferHeader>> {
    let Some(raw) = self.raw else {
      let capacity = additional
        .checked_add(1)
        .ok_or(Error::SizeOverflow { size: additional })?;
      let raw = self.allocate_storage(capacity)?;
      self.raw = Some(raw);
      return Ok(raw);
    };

    let old_capacity = unsafe { raw.as_ref().capacity };
    let capacity = old_capacity
      .checked_mul(2)
      .and_then(|doubled| doubled.checked_add(additional))
      .ok_or(Error::SizeOverflow { size: additional })?;
    let bytes = Self::storage_size(capacity)?;

    match unsafe { self.heap.reallocate(Some(raw.cast()), bytes) } {
      Ok(address) => {
        let raw = address.cast::<BufferHeader>();
        unsafe { (*raw.as_ptr()).capacity = capacity };
        self.raw = Some(raw);

        log::debug!(
          "grew buffer from {} to {} elements",
          old_capacity,
          capacity
        );

        Ok(raw)
      }
      Err(error @ Error::ReallocFailed { released: true, .. }) => {
        log::warn!("buffer storage released by failed reallocation, buffer is now empty");
        self.raw = None;
        Err(error)
      }
      Err(error) => Err(error),
    }
  }
}

impl<A: RawAllocator> Buffer<u8, A> {
  /// Appends raw bytes at the end of the buffer.
  pub fn write(
    &mut self,
    data: &[u8],
  ) -> Result<()> {
    self.extend_from_slice(data)
  }

  /// Copies `output.len()` bytes starting at `*cursor` into `output` and
  /// advances the cursor. Fails without touching the cursor when the read
  /// would run past the end of the buffer.
  pub fn read(
    &self,
    output: &mut [u8],
    cursor: &mut usize,
  ) -> Result<()> {
    let length = output.len();
    let size = self.len();

    let end = cursor
      .checked_add(length)
      .filter(|end| *end <= size)
      .ok_or(Error::OutOfBounds {
        cursor: *cursor,
        length,
        size,
      })?;

    if length == 0 {
      return Ok(());
    }

    output.copy_from_slice(&self.as_slice()[*cursor..end]);
    *cursor = end;

    Ok(())
  }
}

impl<A: RawAllocator> io::Write for Buffer<u8, A> {
  fn write(
    &mut self,
    buf: &[u8],
  ) -> io::Result<usize> {
    Buffer::write(self, buf)?;
    Ok(buf.len())
  }

  fn write_all(
    &mut self,
    buf: &[u8],
  ) -> io::Result<()> {
    Buffer::write(self, buf)?;
    Ok(())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

impl<T: Pod, A: RawAllocator> Drop for Buffer<T, A> {
  fn drop(&mut self) {
    self.free();
  }
}

impl<T: Pod, A: RawAllocator> Deref for Buffer<T, A> {
  type Target = [T];

  fn deref(&self) -> &[T] {
    self.as_slice()
  }
}

impl<T: Pod, A: RawAllocator> DerefMut for Buffer<T, A> {
  fn deref_mut(&mut self) -> &mut [T] {
    self.as_mut_slice()
  }
}

impl<T: Pod + fmt::Debug, A: RawAllocator> fmt::Debug for Buffer<T, A> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Buffer")
      .field("capacity", &self.capacity())
      .field("elements", &self.as_slice())
      .finish()
  }
}
