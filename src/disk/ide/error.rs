use std::fmt;

/// IDE 驱动错误类型
///
/// 每个错误都对应一个非零状态码（见 [`IdeError::code`]），0 表示成功。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdeError {
    // 参数错误
    InvalidDrive(u8),          // 驱动器编号超出 0..4
    NotPresent(u8),            // 槽位上没有可用的 ATA 设备
    EmptyTransfer,             // 请求长度为 0
    TooManySectors(usize),     // 单条命令超过 256 个扇区
    MisalignedLength(usize),   // 字节数不是 512 的整数倍
    // 缓冲区小于请求的扇区数
    BufferTooSmall {
        needed: usize,
        actual: usize,
    },
    // 寻址限制
    Lba28Limit(u32),           // LBA 超出 28 位寻址范围
    // 硬件瞬态错误（由轮询按扇区报告）
    DeviceFault,               // 状态寄存器 DF 置位
    // 状态寄存器 ERR 置位，附带错误寄存器
    DeviceError {
        error: u8,
    },
    NoDataRequest,             // 期望数据传输时 DRQ 未置位
    Timeout,                   // BSY 轮询超出预算
}

impl IdeError {
    /// 离散状态码，前 4 个与轮询返回值一致
    pub fn code(&self) -> u8 {
        match self {
            Self::DeviceFault => 1,
            Self::DeviceError { .. } => 2,
            Self::NoDataRequest => 3,
            Self::Timeout => 4,
            Self::InvalidDrive(_) => 0x10,
            Self::NotPresent(_) => 0x11,
            Self::EmptyTransfer => 0x12,
            Self::TooManySectors(_) => 0x13,
            Self::MisalignedLength(_) => 0x14,
            Self::BufferTooSmall { .. } => 0x15,
            Self::Lba28Limit(_) => 0x20,
        }
    }

    /// 是否是控制器报告的瞬态错误（调用者可自行决定是否重试）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::DeviceFault | Self::DeviceError { .. } | Self::NoDataRequest | Self::Timeout
        )
    }
}

impl fmt::Display for IdeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDrive(d) => write!(f, "Invalid drive index: {}", d),
            Self::NotPresent(d) => write!(f, "No ATA device at drive {}", d),
            Self::EmptyTransfer => write!(f, "Zero-length transfer"),
            Self::TooManySectors(n) => write!(f, "Too many sectors for one command: {}", n),
            Self::MisalignedLength(n) => {
                write!(f, "Misaligned length: {} bytes is not a multiple of 512", n)
            }
            Self::BufferTooSmall { needed, actual } => write!(
                f,
                "Buffer too small: need {} bytes, got {}",
                needed, actual
            ),
            Self::Lba28Limit(lba) => write!(f, "LBA {:#x} exceeds the 28-bit limit", lba),
            Self::DeviceFault => write!(f, "Device fault"),
            Self::DeviceError { error } => write!(f, "Device error (error register {:#04x})", error),
            Self::NoDataRequest => write!(f, "Device did not request data"),
            Self::Timeout => write!(f, "Timed out waiting for the device"),
        }
    }
}

impl std::error::Error for IdeError {}

/// 驱动统一结果类型
pub type Result<T> = std::result::Result<T, IdeError>;
