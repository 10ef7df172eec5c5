use std::fmt;

use crate::disk::IdeError;

/// 文件系统错误类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSystemError {
    // 底层驱动错误
    Io(IdeError),
    // 驱动器容量不足以格式化
    DriveTooSmall {
        sectors: u32,
        minimum: u32,
    },
    // 魔数不符，不是 Elixir 卷
    InvalidFilesystem {
        found: u16,
    },
    // 回读的超级块与写入的不一致
    VerificationFailed {
        field: &'static str,
        expected: u64,
        found: u64,
    },
    // 没有空闲数据块
    DiskFull,
    // 没有空闲 inode
    InodeFull,
    // inode 越界或未分配
    InvalidInode(u32),
    // 记录编解码失败
    Codec(String),
    // 文件系统损坏
    Corrupted(String),
}

impl From<IdeError> for FileSystemError {
    fn from(e: IdeError) -> Self {
        FileSystemError::Io(e)
    }
}

impl From<bincode::Error> for FileSystemError {
    fn from(e: bincode::Error) -> Self {
        FileSystemError::Codec(e.to_string())
    }
}

// 实现 Display trait，用于打印错误信息
impl fmt::Display for FileSystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Disk I/O error: {}", e),
            Self::DriveTooSmall { sectors, minimum } => write!(
                f,
                "Drive too small: {} sectors (need at least {})",
                sectors, minimum
            ),
            Self::InvalidFilesystem { found } => {
                write!(f, "Not an Elixir filesystem (magic {:#06x})", found)
            }
            Self::VerificationFailed {
                field,
                expected,
                found,
            } => write!(
                f,
                "Superblock verification failed: {} is {} on disk, expected {}",
                field, found, expected
            ),
            Self::DiskFull => write!(f, "Disk space is full"),
            Self::InodeFull => write!(f, "No free inode available"),
            Self::InvalidInode(inode) => write!(f, "Invalid inode: {}", inode),
            Self::Codec(desc) => write!(f, "Record encoding error: {}", desc),
            Self::Corrupted(desc) => write!(f, "File system corrupted: {}", desc),
        }
    }
}

// 支持链式错误，方便追踪底层原因
impl std::error::Error for FileSystemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// 文件系统统一结果类型
pub type Result<T> = std::result::Result<T, FileSystemError>;
