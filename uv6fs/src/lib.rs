//! Reader (with partial write support) for the historical UNIX v6 on-disk
//! filesystem format.

pub mod bitmap;
pub mod direntv6;
pub mod error;
pub mod filev6;
pub mod layout;
pub mod mount;
pub mod sector;

pub use crate::direntv6::{DirEntryResult, DirReader};
pub use crate::error::{Error, Result};
pub use crate::filev6::FileV6;
pub use crate::layout::{Inode, Superblock};
pub use crate::mount::Mount;
