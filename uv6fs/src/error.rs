//! Error taxonomy for the v6 filesystem engine.

use std::io;

/// An error produced by any layer of the filesystem engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// Low-level I/O failure (short read, seek past end, write failure, ...).
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),
	/// The boot sector's magic number does not match.
	#[error("bad boot sector")]
	BadBootSector,
	/// A parameter passed to a core routine is out of its valid domain.
	#[error("bad parameter")]
	BadParameter,
	/// The inode referred to is not allocated.
	#[error("unallocated inode")]
	UnallocatedInode,
	/// The inode number is outside of the inode region.
	#[error("inode out of range")]
	InodeOutOfRange,
	/// The inode is not a directory where one was expected.
	#[error("invalid directory inode")]
	InvalidDirectoryInode,
	/// The requested byte or sector offset is beyond the end of the file.
	#[error("offset out of range")]
	OffsetOutOfRange,
	/// The file is larger than the addressing scheme supports.
	#[error("file too large")]
	FileTooLarge,
	/// No free inode or data sector is available.
	#[error("no memory")]
	NoMemory,
	/// A filename exceeds the maximum length.
	#[error("filename too long")]
	FilenameTooLong,
	/// A filename already exists where a new entry was to be created.
	#[error("filename already exists")]
	FilenameAlreadyExists,
	/// A freshly requested image does not have enough sectors for its own metadata.
	#[error("not enough blocks")]
	NotEnoughBlocks,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
