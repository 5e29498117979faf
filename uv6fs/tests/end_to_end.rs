//! Builds a synthetic image by hand (mkfs plus direct sector pokes, since
//! this implementation only supports partial writes) and exercises lookup
//! and sequential reads through the public API.

use std::fs::OpenOptions;

use tempfile::NamedTempFile;

use uv6fs::layout::{DirEntry, Inode, IALLOC, ROOT_INUMBER};
use uv6fs::sector::{self, SECTOR_SIZE};
use uv6fs::{DirEntryResult, DirReader, FileV6, Mount};

const CONTENT: &[u8] = b"hello v6fs\n";

fn build_image_with_child() -> std::path::PathBuf {
	let tmp = NamedTempFile::new().unwrap();
	let (_file, path) = tmp.keep().unwrap();

	Mount::mkfs(&path, 200, 32).unwrap();

	let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();

	// Inode sector 2 already holds the root at slot 1 (see mkfs); add a
	// regular-file child at slot 2 and repoint root's first data block at a
	// freshly written directory sector.
	let inode_sector = 2u32;
	let mut inode_buf = [0u8; SECTOR_SIZE];
	sector::read(&mut file, inode_sector, &mut inode_buf).unwrap();

	let mut root = Inode::from_sector_slot(&inode_buf, ROOT_INUMBER as usize);
	root.i_addr[0] = 5;
	root.set_size(std::mem::size_of::<DirEntry>() as u32);
	root.write_to_sector_slot(&mut inode_buf, ROOT_INUMBER as usize);

	let child_inumber = 2usize;
	let mut child = Inode::default();
	child.i_mode = IALLOC;
	child.i_addr[0] = 6;
	child.set_size(CONTENT.len() as u32);
	child.write_to_sector_slot(&mut inode_buf, child_inumber);

	sector::write(&mut file, inode_sector, &inode_buf).unwrap();

	let mut dirent_buf = [0u8; SECTOR_SIZE];
	let mut entry = DirEntry::default();
	entry.d_name[..5].copy_from_slice(b"child");
	entry.d_inumber = child_inumber as u16;
	entry.write_to_sector_slot(&mut dirent_buf, 0);
	sector::write(&mut file, 5, &dirent_buf).unwrap();

	let mut data_buf = [0u8; SECTOR_SIZE];
	data_buf[..CONTENT.len()].copy_from_slice(CONTENT);
	sector::write(&mut file, 6, &data_buf).unwrap();

	path
}

#[test]
fn dirlookup_finds_child_and_reads_its_content() {
	let path = build_image_with_child();
	let mut mount = Mount::mount(&path).unwrap();

	let child_inr = mount.dirlookup(ROOT_INUMBER, "child").unwrap();
	assert_eq!(child_inr, 2);

	let mut file = FileV6::open(&mut mount, child_inr).unwrap();
	let mut buf = [0u8; SECTOR_SIZE];
	let n = file.readblock(&mut buf).unwrap();
	assert_eq!(n, CONTENT.len());
	assert_eq!(&buf[..n], CONTENT);

	assert_eq!(file.readblock(&mut buf).unwrap(), 0);
}

#[test]
fn dirreader_enumerates_root_entries() {
	let path = build_image_with_child();
	let mut mount = Mount::mount(&path).unwrap();

	let mut reader = DirReader::open(&mut mount, ROOT_INUMBER).unwrap();
	match reader.read().unwrap() {
		DirEntryResult::Entry { name, inumber } => {
			assert_eq!(name, "child");
			assert_eq!(inumber, 2);
		}
		other => panic!("expected an entry, got {:?}", other),
	}
	assert_eq!(reader.read().unwrap(), DirEntryResult::EndOfDir);
}

#[test]
fn print_tree_includes_child() {
	let path = build_image_with_child();
	let mut mount = Mount::mount(&path).unwrap();

	let tree = mount.print_tree(ROOT_INUMBER, "").unwrap();
	assert!(tree.contains("DIR /\n"));
	assert!(tree.contains("FIL /child\n"));
}
