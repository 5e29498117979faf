//! The file layer: wraps an inode with a byte offset for sequential reads.

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::layout::Inode;
use crate::mount::Mount;
use crate::sector::SECTOR_SIZE;

/// A file (or directory) open for sequential reading, borrowing its [`Mount`].
pub struct FileV6<'a> {
	mount: &'a mut Mount,
	inumber: u16,
	inode: Inode,
	offset: u32,
}

impl<'a> FileV6<'a> {
	/// Opens inode `inr` for reading, starting at offset 0.
	pub fn open(mount: &'a mut Mount, inr: u16) -> Result<Self> {
		let inode = mount.inode_read(inr)?;
		trace!("[OK] filev6_open");
		Ok(Self {
			mount,
			inumber: inr,
			inode,
			offset: 0,
		})
	}

	/// The inumber this handle was opened against.
	pub fn inumber(&self) -> u16 {
		self.inumber
	}

	/// The underlying inode, as it was when opened (or last recreated).
	pub fn inode(&self) -> &Inode {
		&self.inode
	}

	/// Current byte offset.
	pub fn offset(&self) -> u32 {
		self.offset
	}

	/// Reads the next sector's worth of data into `buf`.
	///
	/// Returns the number of meaningful bytes written into `buf` (512 for a
	/// full block, the remainder for the final short block, or 0 at
	/// end-of-file, which also resets the offset to 0). Unlike the C source,
	/// which always reported 512 even for a short last block, this returns
	/// the true byte count so callers never need to consult the inode size
	/// separately (see SPEC_FULL.md, "short last block").
	pub fn readblock(&mut self, buf: &mut [u8; SECTOR_SIZE]) -> Result<usize> {
		let size = self.inode.size();
		if self.offset >= size {
			self.offset = 0;
			trace!("[OK] filev6_readblock end of file");
			return Ok(0);
		}

		let sect = self.mount.inode_findsector(&self.inode, (self.offset / SECTOR_SIZE as u32) as i32)?;
		self.mount.read_raw_sector(sect as u32, buf)?;

		let remaining = size - self.offset;
		let n = (SECTOR_SIZE as u32).min(remaining) as usize;
		self.offset += SECTOR_SIZE as u32;
		Ok(n)
	}

	/// Repositions the offset. `off` must be within `[0, size]`.
	pub fn lseek(&mut self, off: u32) -> Result<()> {
		if off > self.inode.size() {
			return Err(Error::OffsetOutOfRange);
		}
		self.offset = off;
		Ok(())
	}

	/// Writes a zero-initialized inode with `mode` to this handle's inumber.
	///
	/// Does not allocate or populate any data blocks; matches the source's
	/// unfinished write path.
	pub fn create(&mut self, mode: u16) -> Result<()> {
		let mut inode = Inode::default();
		inode.i_mode = mode;
		self.mount.inode_write(self.inumber, &inode)?;
		self.inode = inode;
		debug!("[OK] filev6_create");
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::mount::Mount;
	use tempfile::NamedTempFile;

	#[test]
	fn readblock_on_empty_root_is_eof() {
		let tmp = NamedTempFile::new().unwrap();
		Mount::mkfs(tmp.path(), 200, 32).unwrap();
		let mut mount = Mount::mount(tmp.path()).unwrap();
		let mut file = FileV6::open(&mut mount, crate::layout::ROOT_INUMBER).unwrap();
		let mut buf = [0u8; SECTOR_SIZE];
		assert_eq!(file.readblock(&mut buf).unwrap(), 0);
		assert_eq!(file.offset(), 0);
	}

	#[test]
	fn lseek_bounds() {
		let tmp = NamedTempFile::new().unwrap();
		Mount::mkfs(tmp.path(), 200, 32).unwrap();
		let mut mount = Mount::mount(tmp.path()).unwrap();
		let mut file = FileV6::open(&mut mount, crate::layout::ROOT_INUMBER).unwrap();
		assert!(file.lseek(0).is_ok());
		assert!(matches!(file.lseek(1), Err(Error::OffsetOutOfRange)));
	}
}
