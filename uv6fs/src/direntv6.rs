//! The directory layer: iterates a directory's entries and resolves paths.

use log::trace;

use crate::error::{Error, Result};
use crate::filev6::FileV6;
use crate::layout::{DirEntry, ROOT_INUMBER};
use crate::mount::Mount;
use crate::sector::SECTOR_SIZE;

/// One step of a directory scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirEntryResult {
	/// An allocated entry.
	Entry { name: String, inumber: u16 },
	/// A slot that exists but holds no entry (inumber 0).
	EmptySlot,
	/// The directory has no more entries.
	EndOfDir,
}

/// Sequentially reads the entries of a directory file.
pub struct DirReader<'a> {
	file: FileV6<'a>,
	buf: [u8; SECTOR_SIZE],
	loaded: usize,
	cur: usize,
}

impl<'a> DirReader<'a> {
	/// Opens inode `inr` for directory iteration. Fails with
	/// [`Error::InvalidDirectoryInode`] if the inode is not a directory.
	pub fn open(mount: &'a mut Mount, inr: u16) -> Result<Self> {
		let file = FileV6::open(mount, inr)?;
		if !file.inode().is_dir() {
			return Err(Error::InvalidDirectoryInode);
		}
		Ok(Self {
			file,
			buf: [0u8; SECTOR_SIZE],
			loaded: 0,
			cur: 0,
		})
	}

	/// Reads the next directory entry, advancing the cursor.
	pub fn read(&mut self) -> Result<DirEntryResult> {
		if self.cur >= self.loaded {
			let n = self.file.readblock(&mut self.buf)?;
			if n == 0 {
				return Ok(DirEntryResult::EndOfDir);
			}
			self.loaded = n / std::mem::size_of::<DirEntry>();
			self.cur = 0;
		}

		let entry = DirEntry::from_sector_slot(&self.buf, self.cur);
		self.cur += 1;

		if entry.d_inumber == 0 {
			Ok(DirEntryResult::EmptySlot)
		} else {
			Ok(DirEntryResult::Entry {
				name: entry.name(),
				inumber: entry.d_inumber,
			})
		}
	}
}

impl Mount {
	/// Resolves a slash-separated path, starting the scan at `start_inr`.
	///
	/// An empty path resolves to `start_inr` itself. Each component is
	/// compared against directory entry names with a plain equality check
	/// (entry names are already NUL-truncated by [`DirEntry::name`]); this
	/// differs from a fixed-width `strncmp` only in that it never reads past
	/// the stored name. An unmatched path segment yields
	/// [`Error::InodeOutOfRange`], reused here as "path not found" to match
	/// the source's error taxonomy.
	pub fn dirlookup(&mut self, start_inr: u16, path: &str) -> Result<u16> {
		let path = path.trim_start_matches('/');
		if path.is_empty() {
			return Ok(start_inr);
		}

		let (component, rest) = match path.split_once('/') {
			Some((head, tail)) => (head, tail),
			None => (path, ""),
		};

		let mut reader = DirReader::open(self, start_inr)?;
		loop {
			match reader.read()? {
				DirEntryResult::EndOfDir => return Err(Error::InodeOutOfRange),
				DirEntryResult::EmptySlot => continue,
				DirEntryResult::Entry { name, inumber } => {
					if name == component {
						trace!("[OK] dirlookup found {}", name);
						drop(reader);
						return self.dirlookup(inumber, rest);
					}
				}
			}
		}
	}

	/// Recursively prints a directory tree rooted at `inr`, matching the
	/// `lsall` shell command's glyphs. `prefix` is the path accumulated so
	/// far (the empty string at the root, which prints as `DIR /`).
	pub fn print_tree(&mut self, inr: u16, prefix: &str) -> Result<String> {
		let inode = self.inode_read(inr)?;
		let mut out = String::new();
		if !inode.is_dir() {
			out.push_str(&format!("FIL {}\n", prefix));
			return Ok(out);
		}
		out.push_str(&format!("DIR {}/\n", prefix));

		let mut children = Vec::new();
		let mut reader = DirReader::open(self, inr)?;
		loop {
			match reader.read()? {
				DirEntryResult::EndOfDir => break,
				DirEntryResult::EmptySlot => continue,
				DirEntryResult::Entry { name, inumber } => {
					if name != "." && name != ".." {
						children.push((name, inumber));
					}
				}
			}
		}
		drop(reader);

		for (name, inumber) in children {
			let child_path = format!("{}/{}", prefix, name);
			out.push_str(&self.print_tree(inumber, &child_path)?);
		}
		Ok(out)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::layout::IALLOC;
	use tempfile::NamedTempFile;

	fn fresh_mount(num_inodes: u16, num_blocks: u16) -> Mount {
		let tmp = NamedTempFile::new().unwrap();
		let path = tmp.path().to_path_buf();
		Mount::mkfs(&path, num_blocks, num_inodes).unwrap();
		Mount::mount(&path).unwrap()
	}

	#[test]
	fn empty_path_resolves_to_self() {
		let mut mount = fresh_mount(32, 200);
		assert_eq!(mount.dirlookup(ROOT_INUMBER, "").unwrap(), ROOT_INUMBER);
	}

	#[test]
	fn open_non_directory_fails() {
		let mut mount = fresh_mount(32, 200);
		let inr = mount.inode_alloc().unwrap();
		let mut inode = crate::layout::Inode::default();
		inode.i_mode = IALLOC;
		mount.inode_write(inr, &inode).unwrap();
		assert!(matches!(DirReader::open(&mut mount, inr), Err(Error::InvalidDirectoryInode)));
	}

	#[test]
	fn lookup_missing_name_reaches_end_of_dir() {
		let mut mount = fresh_mount(32, 200);
		assert!(matches!(mount.dirlookup(ROOT_INUMBER, "missing"), Err(Error::InodeOutOfRange)));
	}
}
