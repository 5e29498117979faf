//! Interactive REPL for mounting, inspecting, and reading UNIX v6 disk images.

use std::io::{self, BufRead, Write};

use log::debug;
use sha2::{Digest, Sha256};
use uv6fs::layout::ROOT_INUMBER;
use uv6fs::sector::SECTOR_SIZE;
use uv6fs::{FileV6, Mount};

/// Either a shell-level mistake (bad arguments, no mount) or a propagated
/// filesystem error, printed with a distinct prefix matching the source's
/// two-tier error namespace.
enum CommandError {
	Shell(String),
	Fs(uv6fs::Error),
}

impl From<uv6fs::Error> for CommandError {
	fn from(err: uv6fs::Error) -> Self {
		CommandError::Fs(err)
	}
}

impl CommandError {
	fn print(&self) {
		match self {
			CommandError::Shell(msg) => println!("ERROR SHELL: {}", msg),
			CommandError::Fs(err) => println!("ERROR FS: {}", err),
		}
	}
}

fn shell_err(msg: impl Into<String>) -> CommandError {
	CommandError::Shell(msg.into())
}

fn require_mount(mount: &mut Option<Mount>) -> Result<&mut Mount, CommandError> {
	mount.as_mut().ok_or_else(|| shell_err("no filesystem mounted, use `mount <disk>` first"))
}

fn print_help() {
	println!("commands:");
	println!("  help                         list commands");
	println!("  exit | quit                  unmount and exit");
	println!("  mkfs <disk> <#inodes> <#blocks>   create a new image");
	println!("  mount <disk>                 unmount current, mount new");
	println!("  mkdir <dirname>              stub, always succeeds");
	println!("  lsall                        recursive tree print");
	println!("  add <src> <dst>              stub");
	println!("  cat <path>                   dump file contents");
	println!("  istat <inode_nr>             print one inode");
	println!("  inode <path>                 print resolved inode number");
	println!("  sha <path>                   print SHA-256 of file content");
	println!("  psb                          print superblock");
}

fn cmd_mkfs(args: &[&str]) -> Result<Option<String>, CommandError> {
	let [disk, inodes, blocks] = args else {
		return Err(shell_err("usage: mkfs <disk> <#inodes> <#blocks>"));
	};
	let num_inodes: u16 = inodes.parse().map_err(|_| shell_err("bad inode count"))?;
	let num_blocks: u16 = blocks.parse().map_err(|_| shell_err("bad block count"))?;
	Mount::mkfs(disk, num_blocks, num_inodes)?;
	Ok(Some(format!("created {} ({} inodes, {} blocks)", disk, num_inodes, num_blocks)))
}

fn cmd_mount(state: &mut Option<Mount>, args: &[&str]) -> Result<Option<String>, CommandError> {
	let [disk] = args else {
		return Err(shell_err("usage: mount <disk>"));
	};
	// Drop the previous mount (if any) before taking the new one, matching
	// the source's explicit unmount-then-mount ordering.
	*state = None;
	let mount = Mount::mount(disk)?;
	*state = Some(mount);
	Ok(Some(format!("mounted {}", disk)))
}

fn cmd_lsall(state: &mut Option<Mount>) -> Result<Option<String>, CommandError> {
	let mount = require_mount(state)?;
	Ok(Some(mount.print_tree(ROOT_INUMBER, "")?))
}

fn cmd_cat(state: &mut Option<Mount>, args: &[&str]) -> Result<Option<String>, CommandError> {
	let mount = require_mount(state)?;
	let [path] = args else {
		return Err(shell_err("usage: cat <path>"));
	};
	let inr = mount.dirlookup(ROOT_INUMBER, path)?;
	let inode = mount.inode_read(inr)?;
	if inode.is_dir() {
		return Err(shell_err(format!("{} is a directory", path)));
	}

	let mut file = FileV6::open(mount, inr)?;
	let mut buf = [0u8; SECTOR_SIZE];
	let mut out = String::new();
	loop {
		let n = file.readblock(&mut buf)?;
		if n == 0 {
			break;
		}
		out.push_str(&String::from_utf8_lossy(&buf[..n]));
	}
	Ok(Some(out))
}

fn cmd_istat(state: &mut Option<Mount>, args: &[&str]) -> Result<Option<String>, CommandError> {
	let mount = require_mount(state)?;
	let [inr] = args else {
		return Err(shell_err("usage: istat <inode_nr>"));
	};
	let inr: u16 = inr.parse().map_err(|_| shell_err("bad inode number"))?;
	if inr < 1 {
		return Err(shell_err("inode numbers start at 1"));
	}
	let inode = mount.inode_read(inr)?;
	Ok(Some(Mount::print_inode(&inode)))
}

fn cmd_inode(state: &mut Option<Mount>, args: &[&str]) -> Result<Option<String>, CommandError> {
	let mount = require_mount(state)?;
	let [path] = args else {
		return Err(shell_err("usage: inode <path>"));
	};
	let inr = mount.dirlookup(ROOT_INUMBER, path)?;
	Ok(Some(format!("inode: {}", inr)))
}

fn cmd_sha(state: &mut Option<Mount>, args: &[&str]) -> Result<Option<String>, CommandError> {
	let mount = require_mount(state)?;
	let [path] = args else {
		return Err(shell_err("usage: sha <path>"));
	};
	let inr = mount.dirlookup(ROOT_INUMBER, path)?;
	let inode = mount.inode_read(inr)?;
	if inode.is_dir() {
		return Err(shell_err("no SHA for directories."));
	}

	let mut file = FileV6::open(mount, inr)?;
	let mut buf = [0u8; SECTOR_SIZE];
	let mut hasher = Sha256::new();
	loop {
		let n = file.readblock(&mut buf)?;
		if n == 0 {
			break;
		}
		hasher.update(&buf[..n]);
	}
	let digest = hasher.finalize();
	let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
	Ok(Some(hex))
}

fn cmd_psb(state: &mut Option<Mount>) -> Result<Option<String>, CommandError> {
	let mount = require_mount(state)?;
	Ok(Some(mount.print_superblock()))
}

/// Dispatches one already-tokenized command line.
///
/// Returns `Ok(true)` to keep looping, `Ok(false)` to exit cleanly.
fn dispatch(state: &mut Option<Mount>, tokens: &[&str]) -> Result<bool, CommandError> {
	let Some((&cmd, args)) = tokens.split_first() else {
		return Ok(true);
	};

	let output = match cmd {
		"help" => {
			print_help();
			None
		}
		"exit" | "quit" => {
			*state = None;
			return Ok(false);
		}
		"mkfs" => cmd_mkfs(args)?,
		"mount" => cmd_mount(state, args)?,
		"mkdir" => {
			if args.len() != 1 {
				return Err(shell_err("usage: mkdir <dirname>"));
			}
			debug!("[OK] mkdir stub for {}", args[0]);
			Some("ok".to_owned())
		}
		"lsall" => cmd_lsall(state)?,
		"add" => {
			if args.len() != 2 {
				return Err(shell_err("usage: add <src> <dst>"));
			}
			debug!("[OK] add stub for {} -> {}", args[0], args[1]);
			Some("not implemented".to_owned())
		}
		"cat" => cmd_cat(state, args)?,
		"istat" => cmd_istat(state, args)?,
		"inode" => cmd_inode(state, args)?,
		"sha" => cmd_sha(state, args)?,
		"psb" => cmd_psb(state)?,
		other => return Err(shell_err(format!("unknown command: {}", other))),
	};

	if let Some(text) = output {
		println!("{}", text);
	}
	Ok(true)
}

fn main() {
	env_logger::init();

	let mut state: Option<Mount> = None;
	let stdin = io::stdin();

	print!("uv6sh> ");
	io::stdout().flush().ok();
	for line in stdin.lock().lines() {
		let Ok(line) = line else {
			break;
		};
		let tokens: Vec<&str> = line.split_whitespace().collect();

		match dispatch(&mut state, &tokens) {
			Ok(true) => {}
			Ok(false) => break,
			Err(err) => err.print(),
		}

		print!("uv6sh> ");
		io::stdout().flush().ok();
	}
}
