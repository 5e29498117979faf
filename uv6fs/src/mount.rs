//! Superblock parsing, mounting, and the inode layer.
//!
//! A [`Mount`] owns the open image file, the parsed superblock, and the two
//! allocation bitmaps. It replaces the source's process-wide global
//! `unix_filesystem` with an ordinary owned value: dropping it closes the
//! file and frees the bitmaps.

use std::fs::{File, OpenOptions};
use std::path::Path;

use log::{debug, trace, warn};

use crate::bitmap::Bitmap;
use crate::error::{Error, Result};
use crate::layout::{
	self, Inode, Superblock, ADDRESSES_PER_SECTOR, ADDR_SMALL_LENGTH, BOOTBLOCK_MAGIC_NUM,
	BOOTBLOCK_MAGIC_NUM_OFFSET, BOOTBLOCK_SECTOR, IALLOC, INODES_PER_SECTOR, MAX_FILE_SIZE, ROOT_INUMBER,
	SMALL_FILE_LIMIT, SUPERBLOCK_SECTOR,
};
use crate::sector::{self, SECTOR_SIZE};

/// An open v6 filesystem: the image file plus its parsed metadata.
pub struct Mount {
	file: File,
	superblock: Superblock,
	ibm: Bitmap,
	fbm: Bitmap,
}

impl Mount {
	/// Opens `path`, validates the boot sector, reads the superblock, and
	/// rebuilds the inode and free-block bitmaps by scanning the inode region.
	pub fn mount(path: impl AsRef<Path>) -> Result<Self> {
		let mut file = OpenOptions::new().read(true).write(true).open(path)?;

		let mut boot = [0u8; SECTOR_SIZE];
		sector::read(&mut file, BOOTBLOCK_SECTOR, &mut boot)?;
		if boot[BOOTBLOCK_MAGIC_NUM_OFFSET] != BOOTBLOCK_MAGIC_NUM {
			warn!("[--] mountv6 bad boot sector");
			return Err(Error::BadBootSector);
		}

		let mut sb_buf = [0u8; SECTOR_SIZE];
		sector::read(&mut file, SUPERBLOCK_SECTOR, &mut sb_buf)?;
		let superblock = Superblock::from_sector(&sb_buf);

		let ibm = Bitmap::alloc(
			superblock.s_inode_start as u64,
			superblock.s_isize as u64 * INODES_PER_SECTOR as u64 - 1,
		)?;
		let fbm = Bitmap::alloc(superblock.s_block_start as u64 + 1, superblock.s_fsize as u64 - 1)?;

		let mut mount = Self {
			file,
			superblock,
			ibm,
			fbm,
		};
		mount.fill_bitmaps()?;
		debug!("[OK] mount is done");
		Ok(mount)
	}

	fn fill_bitmaps(&mut self) -> Result<()> {
		for i in 0..self.superblock.s_isize {
			let mut buf = [0u8; SECTOR_SIZE];
			sector::read(&mut self.file, self.superblock.s_inode_start as u32 + i as u32, &mut buf)?;
			for slot in 0..INODES_PER_SECTOR {
				let inode = Inode::from_sector_slot(&buf, slot);
				if !inode.is_allocated() {
					continue;
				}
				let inumber = i as u64 * INODES_PER_SECTOR as u64 + slot as u64;
				self.ibm.set(inumber);

				let mut k = 0i32;
				loop {
					match self.inode_findsector(&inode, k) {
						Ok(sect) => {
							self.fbm.set(sect as u64);
							k += 1;
						}
						Err(_) => break,
					}
				}
			}
		}
		Ok(())
	}

	/// Creates a brand-new image at `path` with `num_inodes` inodes and
	/// `num_blocks` total sectors, with an allocated, empty root directory.
	///
	/// Writes exactly `s_isize` inode sectors (the safe interpretation of the
	/// source's under-specified sizing arithmetic; see DESIGN.md).
	pub fn mkfs(path: impl AsRef<Path>, num_blocks: u16, num_inodes: u16) -> Result<()> {
		let mut superblock = Superblock {
			s_isize: num_inodes / INODES_PER_SECTOR as u16,
			s_fsize: num_blocks,
			..Default::default()
		};
		if (superblock.s_fsize as u32) < (superblock.s_isize as u32 + num_inodes as u32) {
			return Err(Error::NotEnoughBlocks);
		}
		superblock.s_inode_start = SUPERBLOCK_SECTOR as u16 + 1;
		superblock.s_block_start = superblock.s_inode_start + superblock.s_isize;

		let mut file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;

		let mut boot = [0u8; SECTOR_SIZE];
		boot[BOOTBLOCK_MAGIC_NUM_OFFSET] = BOOTBLOCK_MAGIC_NUM;
		sector::write(&mut file, BOOTBLOCK_SECTOR, &boot)?;

		let mut sb_buf = [0u8; SECTOR_SIZE];
		superblock.write_to_sector(&mut sb_buf);
		sector::write(&mut file, SUPERBLOCK_SECTOR, &sb_buf)?;

		let mut root_sector = [0u8; SECTOR_SIZE];
		let mut root = Inode::default();
		root.i_mode = IALLOC | layout::IFDIR;
		root.write_to_sector_slot(&mut root_sector, ROOT_INUMBER as usize);
		sector::write(&mut file, superblock.s_inode_start as u32, &root_sector)?;

		let empty_sector = [0u8; SECTOR_SIZE];
		for i in 1..superblock.s_isize {
			sector::write(&mut file, superblock.s_inode_start as u32 + i as u32, &empty_sector)?;
		}

		Ok(())
	}

	/// Returns a reference to the parsed superblock.
	pub fn superblock(&self) -> &Superblock {
		&self.superblock
	}

	/// Human-readable superblock dump, used by the `psb` shell command.
	pub fn print_superblock(&self) -> String {
		let sb = &self.superblock;
		format!(
			"\n**********FS SUPERBLOCK START**********\n\
			 s_isize\t\t\t: {}\n\
			 s_fsize\t\t\t: {}\n\
			 s_fbmsize\t\t: {}\n\
			 s_ibmsize\t\t: {}\n\
			 s_inode_start\t\t: {}\n\
			 s_block_start\t\t: {}\n\
			 s_fbm_start\t\t: {}\n\
			 s_ibm_start\t\t: {}\n\
			 s_flock\t\t\t: {}\n\
			 s_ilock\t\t\t: {}\n\
			 s_fmod\t\t\t: {}\n\
			 s_ronly\t\t\t: {}\n\
			 s_time\t\t\t: [{}] {}\n\
			 **********FS SUPERBLOCK END***********",
			{ sb.s_isize },
			{ sb.s_fsize },
			{ sb.s_fbmsize },
			{ sb.s_ibmsize },
			{ sb.s_inode_start },
			{ sb.s_block_start },
			{ sb.s_fbm_start },
			{ sb.s_ibm_start },
			sb.s_flock,
			sb.s_ilock,
			sb.s_fmod,
			sb.s_ronly,
			{ sb.s_time[0] },
			{ sb.s_time[1] },
		)
	}

	fn inode_sector_slot(&self, inr: u16) -> Result<(u32, usize)> {
		let n_sector = inr / INODES_PER_SECTOR as u16;
		let slot = inr % INODES_PER_SECTOR as u16;
		if n_sector > self.superblock.s_isize {
			return Err(Error::InodeOutOfRange);
		}
		Ok((self.superblock.s_inode_start as u32 + n_sector as u32, slot as usize))
	}

	/// Reads inode `inr`. Fails if it is out of range or not allocated.
	pub fn inode_read(&mut self, inr: u16) -> Result<Inode> {
		let (sector, slot) = self.inode_sector_slot(inr)?;
		let mut buf = [0u8; SECTOR_SIZE];
		sector::read(&mut self.file, sector, &mut buf)?;
		let inode = Inode::from_sector_slot(&buf, slot);
		if !inode.is_allocated() {
			return Err(Error::UnallocatedInode);
		}
		Ok(inode)
	}

	/// Read-modify-writes inode `inr`'s containing sector with `inode`.
	pub fn inode_write(&mut self, inr: u16, inode: &Inode) -> Result<()> {
		let (sector, slot) = self.inode_sector_slot(inr)?;
		let mut buf = [0u8; SECTOR_SIZE];
		sector::read(&mut self.file, sector, &mut buf)?;
		inode.write_to_sector_slot(&mut buf, slot);
		sector::write(&mut self.file, sector, &buf)
	}

	/// Allocates a free inode number and marks it used.
	pub fn inode_alloc(&mut self) -> Result<u16> {
		let next = self.ibm.find_next().ok_or(Error::NoMemory)?;
		self.ibm.set(next);
		Ok(next as u16)
	}

	/// Resolves the `k`-th logical sector of `inode` to a physical sector number.
	pub fn inode_findsector(&mut self, inode: &Inode, k: i32) -> Result<u16> {
		if k < 0 {
			return Err(Error::BadParameter);
		}
		if !inode.is_allocated() {
			return Err(Error::UnallocatedInode);
		}

		let size = inode.size();
		if size > MAX_FILE_SIZE {
			return Err(Error::FileTooLarge);
		}

		if size < SMALL_FILE_LIMIT {
			let n_sector_used = size / SECTOR_SIZE as u32;
			if k as u32 > n_sector_used {
				return Err(Error::OffsetOutOfRange);
			}
			trace!("[OK] findsector smaller than 8");
			Ok(inode.i_addr[k as usize])
		} else {
			let addr_sect = k as usize / ADDRESSES_PER_SECTOR;
			if addr_sect >= ADDR_SMALL_LENGTH {
				return Err(Error::OffsetOutOfRange);
			}
			let addr_sect_off = k as usize % ADDRESSES_PER_SECTOR;

			let mut buf = [0u8; SECTOR_SIZE];
			sector::read(&mut self.file, inode.i_addr[addr_sect] as u32, &mut buf)?;
			trace!("[OK] findsector bigger than 8");
			Ok(u16::from_le_bytes([buf[addr_sect_off * 2], buf[addr_sect_off * 2 + 1]]))
		}
	}

	/// Reads the `sector`-th sector of the image directly (used by the file layer).
	pub(crate) fn read_raw_sector(&mut self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) -> Result<()> {
		sector::read(&mut self.file, sector, buf)
	}

	/// Prints every allocated inode's number, kind, and size.
	pub fn inode_scan_print(&mut self) -> Result<String> {
		let mut out = String::new();
		for i in 0..self.superblock.s_isize {
			let mut buf = [0u8; SECTOR_SIZE];
			sector::read(&mut self.file, self.superblock.s_inode_start as u32 + i as u32, &mut buf)?;
			for slot in 0..INODES_PER_SECTOR {
				let inode = Inode::from_sector_slot(&buf, slot);
				if !inode.is_allocated() {
					continue;
				}
				let number = i as usize * INODES_PER_SECTOR + slot;
				let kind = if inode.is_dir() { "DIR" } else { "FIL" };
				out.push_str(&format!("inode\t{} ({}) len   {}\n", number, kind, inode.size()));
			}
		}
		Ok(out)
	}

	/// Formats a single inode for the `istat` shell command.
	pub fn print_inode(inode: &Inode) -> String {
		format!(
			"**********FS INODE START**********\n\
			 i_mode: {}\n\
			 i_nlink: {}\n\
			 i_uid: {}\n\
			 i_gid: {}\n\
			 i_size0: {}\n\
			 i_size1: {}\n\
			 size: {}\n\
			 **********FS INODE END**********",
			{ inode.i_mode },
			inode.i_nlink,
			inode.i_uid,
			inode.i_gid,
			inode.i_size0,
			{ inode.i_size1 },
			inode.size(),
		)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use tempfile::NamedTempFile;

	fn mkfs_and_mount(num_inodes: u16, num_blocks: u16) -> Mount {
		let tmp = NamedTempFile::new().unwrap();
		let path = tmp.path().to_path_buf();
		Mount::mkfs(&path, num_blocks, num_inodes).unwrap();
		Mount::mount(&path).unwrap()
	}

	#[test]
	fn mkfs_rejects_too_small_image() {
		let tmp = NamedTempFile::new().unwrap();
		let err = Mount::mkfs(tmp.path(), 1, 32).unwrap_err();
		assert!(matches!(err, Error::NotEnoughBlocks));
	}

	#[test]
	fn fresh_image_has_only_root_allocated() {
		let mut mount = mkfs_and_mount(32, 200);
		let root = mount.inode_read(ROOT_INUMBER).unwrap();
		assert!(root.is_allocated());
		assert!(root.is_dir());
		assert_eq!(root.size(), 0);

		// No other inode in range should be allocated.
		let isize = mount.superblock.s_isize;
		for inr in 0..(isize * INODES_PER_SECTOR as u16) {
			if inr == ROOT_INUMBER {
				continue;
			}
			assert!(matches!(mount.inode_read(inr), Err(Error::UnallocatedInode)));
		}
	}

	#[test]
	fn bad_boot_sector_is_rejected() {
		let tmp = NamedTempFile::new().unwrap();
		std::fs::write(tmp.path(), vec![0u8; 4096]).unwrap();
		assert!(matches!(Mount::mount(tmp.path()), Err(Error::BadBootSector)));
	}

	#[test]
	fn inode_findsector_small_file_direct_addressing() {
		let mut mount = mkfs_and_mount(32, 200);
		let mut inode = Inode::default();
		inode.i_mode = IALLOC;
		inode.set_size(SECTOR_SIZE as u32);
		inode.i_addr[0] = 42;
		assert_eq!(mount.inode_findsector(&inode, 0).unwrap(), 42);
		assert!(matches!(mount.inode_findsector(&inode, -1), Err(Error::BadParameter)));
		assert!(matches!(mount.inode_findsector(&inode, 5), Err(Error::OffsetOutOfRange)));
	}
}
