//! Kernel filesystem bridge: mounts a UNIX v6 disk image through FUSE.
//!
//! Read-only. Every FUSE callback delegates to the core engine
//! (`uv6fs::Mount`/`FileV6`/`DirReader`); this binary only translates
//! inumbers to FUSE inodes and maps `uv6fs::Error` to `libc` errno values.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use clap::Parser;
use fuser::{FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry, ReplyOpen, Request};
use log::{debug, warn};
use uv6fs::sector::SECTOR_SIZE;
use uv6fs::{DirEntryResult, DirReader, Error, FileV6, Inode, Mount};

/// Entries are cacheable by the kernel for this long; the backing image is
/// never mutated by this process while mounted.
const TTL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(about = "Mount a UNIX v6 disk image as a read-only FUSE filesystem")]
struct Cli {
	/// Path to the v6 disk image.
	image: PathBuf,
	/// Mountpoint directory.
	mountpoint: PathBuf,
	/// Run FUSE in the foreground with debug logging.
	#[arg(short, long)]
	debug: bool,
}

struct Uv6Fuse {
	mount: Mount,
}

impl Uv6Fuse {
	fn attr(&mut self, inr: u16) -> Result<FileAttr, Error> {
		let inode = self.mount.inode_read(inr)?;
		Ok(inode_attr(inr, &inode))
	}
}

fn inode_attr(inr: u16, inode: &Inode) -> FileAttr {
	let epoch = SystemTime::UNIX_EPOCH;
	let size = inode.size() as u64;
	FileAttr {
		ino: inr as u64,
		size,
		blocks: (size + SECTOR_SIZE as u64 - 1) / SECTOR_SIZE as u64,
		atime: epoch,
		mtime: epoch,
		ctime: epoch,
		crtime: epoch,
		kind: if inode.is_dir() { FileType::Directory } else { FileType::RegularFile },
		perm: 0o755,
		nlink: inode.i_nlink.max(1) as u32,
		uid: inode.i_uid as u32,
		gid: inode.i_gid as u32,
		rdev: 0,
		blksize: SECTOR_SIZE as u32,
		flags: 0,
	}
}

fn errno_of(err: &Error) -> i32 {
	match err {
		Error::Io(_) => libc::EIO,
		Error::InvalidDirectoryInode => libc::ENOTDIR,
		Error::UnallocatedInode | Error::InodeOutOfRange => libc::ENOENT,
		Error::OffsetOutOfRange => libc::ESPIPE,
		Error::FileTooLarge => libc::EFBIG,
		Error::NoMemory | Error::NotEnoughBlocks => libc::ENOSPC,
		Error::BadBootSector | Error::BadParameter => libc::EINVAL,
		Error::FilenameTooLong => libc::ENAMETOOLONG,
		Error::FilenameAlreadyExists => libc::EEXIST,
	}
}

impl Filesystem for Uv6Fuse {
	fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
		let Some(name) = name.to_str() else {
			reply.error(libc::EINVAL);
			return;
		};
		match self.mount.dirlookup(parent as u16, name) {
			Ok(inr) => match self.attr(inr) {
				Ok(attr) => reply.entry(&TTL, &attr, 0),
				Err(err) => reply.error(errno_of(&err)),
			},
			Err(err) => reply.error(errno_of(&err)),
		}
	}

	fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
		match self.attr(ino as u16) {
			Ok(attr) => reply.attr(&TTL, &attr),
			Err(err) => reply.error(errno_of(&err)),
		}
	}

	fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
		match self.mount.inode_read(ino as u16) {
			Ok(_) => reply.opened(0, 0),
			Err(err) => reply.error(errno_of(&err)),
		}
	}

	fn read(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_fh: u64,
		offset: i64,
		size: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: ReplyData,
	) {
		let offset = offset.max(0) as u32;
		let mut file = match FileV6::open(&mut self.mount, ino as u16) {
			Ok(f) => f,
			Err(err) => {
				reply.error(errno_of(&err));
				return;
			}
		};

		let aligned = offset - offset % SECTOR_SIZE as u32;
		if let Err(err) = file.lseek(aligned.min(file.inode().size())) {
			reply.error(errno_of(&err));
			return;
		}

		let mut collected = Vec::new();
		let mut buf = [0u8; SECTOR_SIZE];
		let needed = (offset - aligned) as usize + size as usize;
		loop {
			let n = match file.readblock(&mut buf) {
				Ok(n) => n,
				Err(err) => {
					reply.error(errno_of(&err));
					return;
				}
			};
			if n == 0 {
				break;
			}
			collected.extend_from_slice(&buf[..n]);
			if collected.len() >= needed {
				break;
			}
		}

		let start = (offset - aligned) as usize;
		let end = collected.len().min(start + size as usize);
		if start >= collected.len() {
			reply.data(&[]);
		} else {
			reply.data(&collected[start..end]);
		}
	}

	fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
		let mut entries = Vec::new();
		{
			let mut reader = match DirReader::open(&mut self.mount, ino as u16) {
				Ok(r) => r,
				Err(err) => {
					reply.error(errno_of(&err));
					return;
				}
			};
			loop {
				match reader.read() {
					Ok(DirEntryResult::EndOfDir) => break,
					Ok(DirEntryResult::EmptySlot) => continue,
					Ok(DirEntryResult::Entry { name, inumber }) => entries.push((name, inumber)),
					Err(err) => {
						reply.error(errno_of(&err));
						return;
					}
				}
			}
		}

		for (index, (name, inumber)) in entries.into_iter().enumerate() {
			let index = index as i64 + 1;
			if index <= offset {
				continue;
			}
			let kind = match self.mount.inode_read(inumber) {
				Ok(inode) if inode.is_dir() => FileType::Directory,
				Ok(_) => FileType::RegularFile,
				Err(_) => FileType::RegularFile,
			};
			if reply.add(inumber as u64, index, kind, name) {
				break;
			}
		}
		reply.ok();
	}
}

fn main() {
	env_logger::init();
	let cli = Cli::parse();

	let mount = match Mount::mount(&cli.image) {
		Ok(m) => m,
		Err(err) => {
			eprintln!("uv6fuse: cannot mount {}: {}", cli.image.display(), err);
			std::process::exit(1);
		}
	};
	debug!("[OK] uv6fuse mounted {} at {}", cli.image.display(), cli.mountpoint.display());

	let mut options = vec![MountOption::RO, MountOption::FSName("uv6fs".to_owned())];
	if cli.debug {
		options.push(MountOption::AutoUnmount);
	}

	if let Err(err) = fuser::mount2(Uv6Fuse { mount }, &cli.mountpoint, &options) {
		warn!("[--] uv6fuse session ended: {}", err);
		std::process::exit(1);
	}
}
