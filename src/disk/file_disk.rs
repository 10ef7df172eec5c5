use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{self, Read, Result, Seek, SeekFrom, Write},
    path::Path,
};

use crate::disk::types::{Sector, SECTOR_SIZE};

/// 模拟驱动器背后的存储介质，以扇区为单位读写
pub trait SectorMedia: Send {
    /// 介质容量（扇区数）
    fn sector_count(&self) -> u32;
    fn read_sector(&mut self, lba: u32, buf: &mut Sector) -> Result<()>;
    fn write_sector(&mut self, lba: u32, buf: &Sector) -> Result<()>;
    /// 把写缓存落盘（对应 ATA CACHE FLUSH）
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

fn out_of_range(lba: u32, sectors: u32) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("sector {} beyond end of media ({} sectors)", lba, sectors),
    )
}

/// 以磁盘镜像文件为介质
#[derive(Debug)]
pub struct FileDisk {
    file: File,
    sectors: u32,
}

impl FileDisk {
    /// 打开（或创建）镜像文件，不足 `sectors` 个扇区时扩展到该大小
    pub fn open<P: AsRef<Path>>(path: P, sectors: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let disk_size = sectors as u64 * SECTOR_SIZE as u64;
        if file.metadata()?.len() < disk_size {
            file.set_len(disk_size)?;
        }

        Ok(Self { file, sectors })
    }
}

impl SectorMedia for FileDisk {
    fn sector_count(&self) -> u32 {
        self.sectors
    }

    fn read_sector(&mut self, lba: u32, buf: &mut Sector) -> Result<()> {
        if lba >= self.sectors {
            return Err(out_of_range(lba, self.sectors));
        }
        self.file
            .seek(SeekFrom::Start(lba as u64 * SECTOR_SIZE as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_sector(&mut self, lba: u32, buf: &Sector) -> Result<()> {
        if lba >= self.sectors {
            return Err(out_of_range(lba, self.sectors));
        }
        self.file
            .seek(SeekFrom::Start(lba as u64 * SECTOR_SIZE as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.sync_data()
    }
}

/// 内存中的连续介质，适合小容量驱动器
#[derive(Debug, Clone)]
pub struct MemDisk {
    data: Vec<u8>,
}

impl MemDisk {
    pub fn new(sectors: u32) -> Self {
        Self {
            data: vec![0; sectors as usize * SECTOR_SIZE],
        }
    }
}

impl SectorMedia for MemDisk {
    fn sector_count(&self) -> u32 {
        (self.data.len() / SECTOR_SIZE) as u32
    }

    fn read_sector(&mut self, lba: u32, buf: &mut Sector) -> Result<()> {
        let start = lba as usize * SECTOR_SIZE;
        let src = self
            .data
            .get(start..start + SECTOR_SIZE)
            .ok_or_else(|| out_of_range(lba, self.sector_count()))?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write_sector(&mut self, lba: u32, buf: &Sector) -> Result<()> {
        let sectors = self.sector_count();
        let start = lba as usize * SECTOR_SIZE;
        let dst = self
            .data
            .get_mut(start..start + SECTOR_SIZE)
            .ok_or_else(|| out_of_range(lba, sectors))?;
        dst.copy_from_slice(buf);
        Ok(())
    }
}

/// 稀疏介质：只保存写过的扇区，其余读出全 0
///
/// 用来模拟上百 GB 的驱动器而不真正分配空间。
#[derive(Debug, Clone, Default)]
pub struct SparseDisk {
    sectors: u32,
    written: HashMap<u32, Sector>,
}

impl SparseDisk {
    pub fn new(sectors: u32) -> Self {
        Self {
            sectors,
            written: HashMap::new(),
        }
    }

    /// 实际写入过的扇区数
    pub fn written_sectors(&self) -> usize {
        self.written.len()
    }
}

impl SectorMedia for SparseDisk {
    fn sector_count(&self) -> u32 {
        self.sectors
    }

    fn read_sector(&mut self, lba: u32, buf: &mut Sector) -> Result<()> {
        if lba >= self.sectors {
            return Err(out_of_range(lba, self.sectors));
        }
        match self.written.get(&lba) {
            Some(sector) => buf.copy_from_slice(sector),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_sector(&mut self, lba: u32, buf: &Sector) -> Result<()> {
        if lba >= self.sectors {
            return Err(out_of_range(lba, self.sectors));
        }
        self.written.insert(lba, *buf);
        Ok(())
    }
}
