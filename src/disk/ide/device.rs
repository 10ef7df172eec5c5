use crate::disk::types::Sector;

// IDENTIFY 数据中的字节偏移
const ID_SIGNATURE: usize = 0;
const ID_MODEL: usize = 54;
const ID_CAPABILITIES: usize = 98;
const ID_MAX_LBA: usize = 120;
const ID_COMMAND_SETS: usize = 164;

pub const MODEL_LEN: usize = 40;

/// 设备类别，由 IDENTIFY 之后柱面寄存器中的签名区分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceType {
    #[default]
    None,
    Ata,
    Atapi,
    Sata,
}

impl DeviceType {
    /// 根据 LBA mid/high（柱面低/高）寄存器的签名分类
    pub fn from_signature(cl: u8, ch: u8) -> Self {
        match (cl, ch) {
            (0x00, 0x00) => DeviceType::Ata,
            (0x14, 0xEB) | (0x69, 0x96) => DeviceType::Atapi,
            (0x3C, 0xC3) => DeviceType::Sata,
            _ => DeviceType::None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DeviceType::None => "none",
            DeviceType::Ata => "ATA",
            DeviceType::Atapi => "ATAPI",
            DeviceType::Sata => "SATA",
        }
    }
}

/// 驱动器描述，初始化时填充一次，之后只读
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdeDevice {
    pub reserved: bool,     // 该槽位确实有可用的 ATA 设备
    pub channel: u8,        // 0 主通道 / 1 从通道
    pub drive: u8,          // 0 主盘 / 1 从盘
    pub kind: DeviceType,   // 设备类别
    pub signature: u16,     // IDENTIFY 第 0 字
    pub capabilities: u16,  // IDENTIFY 第 49 字
    pub command_sets: u32,  // IDENTIFY 第 82-83 字
    pub size: u32,          // 28 位寻址下的总扇区数
    pub model: String,      // 型号
}

impl IdeDevice {
    /// 记录了签名但驱动不支持的设备（ATAPI / SATA）
    pub fn unsupported(channel: u8, drive: u8, kind: DeviceType) -> Self {
        Self {
            channel,
            drive,
            kind,
            ..Self::default()
        }
    }

    /// 从 256 字的 IDENTIFY 数据中解析
    pub fn from_identify(channel: u8, drive: u8, id: &Sector) -> Self {
        let word = |offset: usize| u16::from_le_bytes([id[offset], id[offset + 1]]);
        let dword = |offset: usize| {
            u32::from_le_bytes([id[offset], id[offset + 1], id[offset + 2], id[offset + 3]])
        };

        Self {
            reserved: true,
            channel,
            drive,
            kind: DeviceType::Ata,
            signature: word(ID_SIGNATURE),
            capabilities: word(ID_CAPABILITIES),
            command_sets: dword(ID_COMMAND_SETS),
            size: dword(ID_MAX_LBA),
            model: parse_model(&id[ID_MODEL..ID_MODEL + MODEL_LEN]),
        }
    }

    pub fn supports_lba(&self) -> bool {
        self.capabilities & (1 << 9) != 0
    }

    pub fn supports_lba48(&self) -> bool {
        self.command_sets & (1 << 26) != 0
    }

    /// 容量（MiB）
    pub fn size_mib(&self) -> u32 {
        self.size / 2048
    }
}

/// 型号字符串按大端字节对存放，需要两两交换
fn parse_model(raw: &[u8]) -> String {
    let mut model = [0u8; MODEL_LEN];
    for (dst, src) in model.chunks_exact_mut(2).zip(raw.chunks_exact(2)) {
        dst[0] = src[1];
        dst[1] = src[0];
    }
    String::from_utf8_lossy(&model)
        .trim_end_matches(|c: char| c == ' ' || c == '\0')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_classification() {
        assert_eq!(DeviceType::from_signature(0, 0), DeviceType::Ata);
        assert_eq!(DeviceType::from_signature(0x14, 0xEB), DeviceType::Atapi);
        assert_eq!(DeviceType::from_signature(0x69, 0x96), DeviceType::Atapi);
        assert_eq!(DeviceType::from_signature(0x3C, 0xC3), DeviceType::Sata);
        assert_eq!(DeviceType::from_signature(0x12, 0x34), DeviceType::None);
    }

    #[test]
    fn identify_fields_and_swapped_model() {
        let mut id = [0u8; 512];
        id[0..2].copy_from_slice(&0x0040u16.to_le_bytes());
        id[98..100].copy_from_slice(&0x0200u16.to_le_bytes());
        id[120..124].copy_from_slice(&65_536u32.to_le_bytes());
        id[164..168].copy_from_slice(&(1u32 << 26).to_le_bytes());
        // "QEMU" 存成大端字对："EQ" "UM"
        let text = b"QEMU HARDDISK";
        let mut padded = [b' '; MODEL_LEN];
        padded[..text.len()].copy_from_slice(text);
        for k in (0..MODEL_LEN).step_by(2) {
            id[54 + k] = padded[k + 1];
            id[54 + k + 1] = padded[k];
        }

        let dev = IdeDevice::from_identify(1, 0, &id);
        assert!(dev.reserved);
        assert_eq!(dev.kind, DeviceType::Ata);
        assert_eq!(dev.signature, 0x0040);
        assert_eq!(dev.size, 65_536);
        assert_eq!(dev.size_mib(), 32);
        assert!(dev.supports_lba());
        assert!(dev.supports_lba48());
        assert_eq!(dev.model, "QEMU HARDDISK");
    }
}
