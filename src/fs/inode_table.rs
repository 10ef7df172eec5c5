use serde::{Deserialize, Serialize};

use crate::{
    disk::types::{Sector, SECTOR_SIZE},
    fs::error::{FileSystemError, Result},
};

/// 索引记录的类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InodeType {
    Free = 0,    // 空槽
    Regular = 1, // 普通文件
}

impl InodeType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(InodeType::Free),
            1 => Some(InodeType::Regular),
            _ => None,
        }
    }
}

/// 一条索引（inode）记录，独占一个扇区，编码后 10 字节
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Index {
    pub time_stamp: u8,   // 时间戳（目前总是 0）
    pub kind: u8,         // 类型标签，见 InodeType
    pub size: u32,        // 文件大小（字节）
    pub first_block: u32, // 第一个数据块的起始 LBA
}

impl Index {
    /// 新的空普通文件
    pub fn regular() -> Self {
        Self {
            kind: InodeType::Regular as u8,
            ..Self::default()
        }
    }

    pub fn inode_type(&self) -> Result<InodeType> {
        InodeType::from_tag(self.kind).ok_or_else(|| {
            FileSystemError::Corrupted(format!("unknown index type tag {}", self.kind))
        })
    }

    pub fn is_free(&self) -> bool {
        self.kind == InodeType::Free as u8
    }

    pub fn encode(&self) -> Result<Sector> {
        let bytes = bincode::serialize(self)?;
        let mut sector = [0u8; SECTOR_SIZE];
        sector[..bytes.len()].copy_from_slice(&bytes);
        Ok(sector)
    }

    pub fn decode(sector: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(sector)?)
    }
}

/// 内存中的 inode 表快照，由连续的 128 个扇区解码而来
#[derive(Debug, Clone)]
pub struct InodeTable {
    pub records: Vec<Index>,
}

impl InodeTable {
    pub fn from_sectors(bytes: &[u8]) -> Result<Self> {
        let records = bytes
            .chunks_exact(SECTOR_SIZE)
            .map(Index::decode)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { records })
    }

    /// 第 `inode` 条记录所在的扇区
    pub fn slot_lba(start_lba: u32, inode: u32) -> Result<u32> {
        start_lba.checked_add(inode).ok_or_else(|| {
            FileSystemError::Corrupted(format!(
                "inode {} is past the end of the disk (table at LBA {})",
                inode, start_lba
            ))
        })
    }

    /// 线性扫描第一个空槽
    pub fn find_free(&self) -> Option<u32> {
        self.records
            .iter()
            .position(Index::is_free)
            .map(|slot| slot as u32)
    }

    pub fn free_count(&self) -> u32 {
        self.records.iter().filter(|r| r.is_free()).count() as u32
    }

    /// 已分配的 (inode, 记录)
    pub fn used(&self) -> impl Iterator<Item = (u32, &Index)> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_free())
            .map(|(slot, r)| (slot as u32, r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout() {
        let index = Index {
            time_stamp: 0,
            kind: InodeType::Regular as u8,
            size: 0x0102_0304,
            first_block: 0x0A0B_0C0D,
        };
        assert_eq!(bincode::serialized_size(&index).unwrap(), 10);

        let sector = index.encode().unwrap();
        assert_eq!(
            &sector[..10],
            &[0x00, 0x01, 0x04, 0x03, 0x02, 0x01, 0x0D, 0x0C, 0x0B, 0x0A]
        );
        assert!(sector[10..].iter().all(|&b| b == 0));
        assert_eq!(Index::decode(&sector).unwrap(), index);
    }

    #[test]
    fn new_regular_file_is_empty() {
        let index = Index::regular();
        assert_eq!(index.inode_type().unwrap(), InodeType::Regular);
        assert_eq!((index.size, index.first_block, index.time_stamp), (0, 0, 0));
        assert!(!index.is_free());
        assert!(Index::default().is_free());
    }

    #[test]
    fn unknown_tag_is_corruption() {
        let index = Index {
            kind: 9,
            ..Index::default()
        };
        assert!(matches!(index.inode_type(), Err(FileSystemError::Corrupted(_))));
    }

    #[test]
    fn table_scan_finds_first_free_slot() {
        let mut bytes = vec![0u8; 4 * SECTOR_SIZE];
        for slot in [0usize, 1, 3] {
            bytes[slot * SECTOR_SIZE + 1] = InodeType::Regular as u8;
        }
        let table = InodeTable::from_sectors(&bytes).unwrap();

        assert_eq!(table.find_free(), Some(2));
        assert_eq!(table.free_count(), 1);
        assert_eq!(table.used().map(|(i, _)| i).collect::<Vec<_>>(), vec![0, 1, 3]);
        assert_eq!(InodeTable::slot_lba(200, 3), Ok(203));
    }

    #[test]
    fn slot_address_overflow_is_corruption() {
        assert!(matches!(
            InodeTable::slot_lba(u32::MAX - 2, 5),
            Err(FileSystemError::Corrupted(_))
        ));
    }
}
