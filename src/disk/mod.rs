pub mod block_device;
pub mod config;
pub mod emu;
pub mod file_disk;
pub mod ide;
pub mod init;
pub mod port_io;
pub mod types;

pub use block_device::BlockDevice;
pub use ide::{error::IdeError, IdeController};
pub use types::{Sector, SECTOR_SIZE};
