use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
  /// A capability record was installed without one of its operations.
  #[error("allocator capability is missing the `{0}` operation")]
  IncompleteCapability(&'static str),

  #[error("allocation of {size} bytes failed")]
  OutOfMemory { size: usize },

  /// The underlying reallocation failed. `released` tells whether the
  /// original block was freed by the allocator as part of the failure.
  #[error("reallocation to {size} bytes failed (original block released: {released})")]
  ReallocFailed { size: usize, released: bool },

  #[error("request for {size} elements overflows the address space")]
  SizeOverflow { size: usize },

  #[error("read of {length} bytes at offset {cursor} exceeds buffer size {size}")]
  OutOfBounds {
    cursor: usize,
    length: usize,
    size: usize,
  },
}

impl From<Error> for io::Error {
  fn from(error: Error) -> Self {
    let kind = match error {
      Error::OutOfMemory { .. } | Error::ReallocFailed { .. } | Error::SizeOverflow { .. } => {
        io::ErrorKind::OutOfMemory
      }
      Error::OutOfBounds { .. } => io::ErrorKind::UnexpectedEof,
      Error::IncompleteCapability(_) => io::ErrorKind::InvalidInput,
    };
    io::Error::new(kind, error)
  }
}
