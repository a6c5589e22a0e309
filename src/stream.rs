use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::{
  buffer::Buffer,
  capability::RawAllocator,
  error::{Error, Result},
};

/// Fixed-extent stream over a byte buffer.
///
/// Reads and writes stay within the current length of the buffer; writing
/// overwrites bytes in place and never grows it. Short reads and writes are
/// reported through the returned byte count.
#[derive(Debug)]
pub struct MemoryStream<A: RawAllocator> {
  buffer: Buffer<u8, A>,
  position: usize,
}

impl<A: RawAllocator> MemoryStream<A> {
  pub fn new(buffer: Buffer<u8, A>) -> Self {
    Self {
      buffer,
      position: 0,
    }
  }

  pub fn get_ref(&self) -> &Buffer<u8, A> {
    &self.buffer
  }

  pub fn into_inner(self) -> Buffer<u8, A> {
    self.buffer
  }

  /// Current offset from the start of the buffer.
  pub fn tell(&self) -> u64 {
    self.position as u64
  }

  /// Moves to `offset` bytes from the start. Offsets past the end are
  /// rejected and leave the position unchanged.
  pub fn seek_to(
    &mut self,
    offset: u64,
  ) -> Result<()> {
    let size = self.buffer.len();
    match usize::try_from(offset) {
      Ok(offset) if offset <= size => {
        self.position = offset;
        Ok(())
      }
      _ => Err(Error::OutOfBounds {
        cursor: usize::try_from(offset).unwrap_or(usize::MAX),
        length: 0,
        size,
      }),
    }
  }

  fn remaining(&self) -> usize {
    self.buffer.len() - self.position
  }
}

impl<A: RawAllocator> Read for MemoryStream<A> {
  fn read(
    &mut self,
    buf: &mut [u8],
  ) -> io::Result<usize> {
    let count = buf.len().min(self.remaining());
    self.buffer.read(&mut buf[..count], &mut self.position)?;
    Ok(count)
  }
}

impl<A: RawAllocator> Write for MemoryStream<A> {
  fn write(
    &mut self,
    buf: &[u8],
  ) -> io::Result<usize> {
    let count = buf.len().min(self.remaining());
    let start = self.position;
    self.buffer[start..start + count].copy_from_slice(&buf[..count]);
    self.position += count;
    Ok(count)
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

impl<A: RawAllocator> Seek for MemoryStream<A> {
  fn seek(
    &mut self,
    pos: SeekFrom,
  ) -> io::Result<u64> {
    let target = match pos {
      SeekFrom::Start(offset) => Some(offset),
      SeekFrom::End(delta) => (self.buffer.len() as u64).checked_add_signed(delta),
      SeekFrom::Current(delta) => self.tell().checked_add_signed(delta),
    };

    let Some(target) = target else {
      return Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        "seek to a negative or overflowing position",
      ));
    };

    self
      .seek_to(target)
      .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;

    Ok(target)
  }
}
