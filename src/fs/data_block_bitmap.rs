use crate::disk::types::SECTOR_SIZE;

/// 块位图：第 i 位对应第 i 块，1 表示已使用
///
/// 计数总是从位模式重新算出来，磁盘上的位图是唯一可信来源。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBitmap {
    pub bits: Vec<u8>,   // 位图数据
    pub total: u32,      // 块总数
    pub free_count: u32, // 当前空闲块数
    pub used_count: u32, // 当前已用块数
}

impl BlockBitmap {
    /// 全部空闲的位图，字节长度为 ceil(total / 8)
    pub fn new(total: u32) -> Self {
        Self {
            bits: vec![0; total.div_ceil(8) as usize],
            total,
            free_count: total,
            used_count: 0,
        }
    }

    /// 从磁盘读回的字节构造，多余的字节截掉，计数按位重算
    pub fn from_bytes(mut bytes: Vec<u8>, total: u32) -> Self {
        bytes.resize(total.div_ceil(8) as usize, 0);
        let mut bitmap = Self {
            bits: bytes,
            total,
            free_count: 0,
            used_count: 0,
        };
        bitmap.recount();
        bitmap
    }

    /// 补零到整扇区，用于写盘
    pub fn to_sectors(&self) -> Vec<u8> {
        let mut bytes = self.bits.clone();
        bytes.resize(self.sector_len() * SECTOR_SIZE, 0);
        bytes
    }

    /// 位图在磁盘上占用的扇区数
    pub fn sector_len(&self) -> usize {
        self.bits.len().div_ceil(SECTOR_SIZE)
    }

    /// 越界的块视为已用
    pub fn is_used(&self, block: u32) -> bool {
        if block >= self.total {
            return true;
        }
        let (byte_index, mask) = Self::locate(block);
        self.bits[byte_index] & mask != 0
    }

    /// 标记为已用，返回是否发生了变化
    pub fn set_used(&mut self, block: u32) -> bool {
        if self.is_used(block) {
            return false;
        }
        let (byte_index, mask) = Self::locate(block);
        self.bits[byte_index] |= mask;
        self.free_count -= 1;
        self.used_count += 1;
        true
    }

    /// 标记为空闲，返回是否发生了变化
    pub fn set_free(&mut self, block: u32) -> bool {
        if block >= self.total || !self.is_used(block) {
            return false;
        }
        let (byte_index, mask) = Self::locate(block);
        self.bits[byte_index] &= !mask;
        self.free_count += 1;
        self.used_count -= 1;
        true
    }

    /// 从 `start` 开始找第一个空闲块（首次适配）
    pub fn first_free(&self, start: u32) -> Option<u32> {
        if start >= self.total {
            return None;
        }
        let first_byte = (start / 8) as usize;
        for (offset, byte) in self.bits[first_byte..].iter().enumerate() {
            if *byte == 0xFF {
                continue;
            }
            let base = ((first_byte + offset) * 8) as u32;
            for bit in 0..8 {
                let block = base + bit;
                if block >= self.total {
                    return None;
                }
                if block >= start && *byte & (1 << bit) == 0 {
                    return Some(block);
                }
            }
        }
        None
    }

    /// 按位重新统计；最后一个字节中超出 total 的位不计入
    pub fn recount(&mut self) {
        let full_bytes = (self.total / 8) as usize;
        let mut used: u32 = self.bits[..full_bytes]
            .iter()
            .map(|b| b.count_ones())
            .sum();

        let tail_bits = self.total % 8;
        if tail_bits != 0 {
            let mask = (1u8 << tail_bits) - 1;
            used += (self.bits[full_bytes] & mask).count_ones();
        }

        self.used_count = used;
        self.free_count = self.total - used;
    }

    fn locate(block: u32) -> (usize, u8) {
        ((block / 8) as usize, 1 << (block % 8))
    }
}
