use bitflags::bitflags;

// 通道
pub const ATA_PRIMARY: usize = 0;
pub const ATA_SECONDARY: usize = 1;

// 传统端口基址
pub const PRIMARY_BASE: u16 = 0x1F0;
pub const PRIMARY_CTRL: u16 = 0x3F6;
pub const SECONDARY_BASE: u16 = 0x170;
pub const SECONDARY_CTRL: u16 = 0x376;

// 命令
pub const ATA_CMD_READ_PIO: u8 = 0x20;
pub const ATA_CMD_WRITE_PIO: u8 = 0x30;
pub const ATA_CMD_CACHE_FLUSH: u8 = 0xE7;
pub const ATA_CMD_IDENTIFY: u8 = 0xEC;

// 设备选择寄存器
pub const DEVSEL_CHS: u8 = 0xA0; // IDENTIFY 时使用
pub const DEVSEL_LBA: u8 = 0xE0; // LBA 模式，低 4 位为 LBA 27..24

/// 控制寄存器 nIEN 位：关闭设备中断，驱动完全靠轮询
pub const CONTROL_NIEN: u8 = 0x02;

// 错误寄存器
pub const ATA_ER_UNC: u8 = 0x40;
pub const ATA_ER_IDNF: u8 = 0x10;
pub const ATA_ER_ABRT: u8 = 0x04;

bitflags! {
    /// 状态寄存器
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        const BSY  = 0x80; // 忙
        const DRDY = 0x40; // 驱动器就绪
        const DF   = 0x20; // 设备故障
        const DSC  = 0x10; // 寻道完成
        const DRQ  = 0x08; // 请求数据传输
        const CORR = 0x04; // 已纠正数据
        const IDX  = 0x02; // 索引
        const ERR  = 0x01; // 错误
    }
}

/// 通道上的寄存器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Data,
    Error,
    SectorCount,
    LbaLow,
    LbaMid,
    LbaHigh,
    DeviceSelect,
    /// 读为状态，写为命令
    Command,
    /// 读为备用状态（不影响设备），写为设备控制
    Control,
}

impl Register {
    /// 寄存器在命令块（base + n）还是控制块（ctrl + n）中的端口号
    pub fn port(self, channel: &Channel) -> u16 {
        match self {
            Register::Data => channel.base,
            Register::Error => channel.base + 1,
            Register::SectorCount => channel.base + 2,
            Register::LbaLow => channel.base + 3,
            Register::LbaMid => channel.base + 4,
            Register::LbaHigh => channel.base + 5,
            Register::DeviceSelect => channel.base + 6,
            Register::Command => channel.base + 7,
            Register::Control => channel.ctrl,
        }
    }
}

/// 一条 IDE 通道的端口描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub base: u16, // 命令块基址
    pub ctrl: u16, // 控制块基址
    pub nien: u8,  // 写入控制寄存器的 nIEN 位
}

impl Channel {
    pub const fn primary() -> Self {
        Self {
            base: PRIMARY_BASE,
            ctrl: PRIMARY_CTRL,
            nien: CONTROL_NIEN,
        }
    }

    pub const fn secondary() -> Self {
        Self {
            base: SECONDARY_BASE,
            ctrl: SECONDARY_CTRL,
            nien: CONTROL_NIEN,
        }
    }
}
