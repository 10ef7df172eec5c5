//! 测试夹具：在模拟总线上搭建控制器和卷

use crate::{
    disk::{
        emu::{DriveKind, EmulatedBus, EmulatedDrive},
        file_disk::{MemDisk, SectorMedia},
        ide::IdeController,
        port_io::NoDelay,
    },
    fs::Elixir,
};

pub const MODEL: &str = "ELIXIR EMULATED DISK";

/// 测试里的轮询预算，保证卡死的设备很快超时
pub const POLL_BUDGET: u32 = 1_000;

pub type TestController = IdeController<EmulatedBus, NoDelay>;

pub fn mem_drive(sectors: u32) -> EmulatedDrive {
    drive_with_media(Box::new(MemDisk::new(sectors)))
}

pub fn drive_with_media(media: Box<dyn SectorMedia>) -> EmulatedDrive {
    EmulatedDrive::ata(MODEL, media)
}

pub fn drive_of_kind(kind: DriveKind) -> EmulatedDrive {
    match kind {
        DriveKind::Ata => mem_drive(2048),
        _ => EmulatedDrive::packet(kind, "EMULATED PACKET DEVICE"),
    }
}

/// 挂上给定 (槽位, 设备) 后初始化控制器
pub fn controller(drives: Vec<(usize, EmulatedDrive)>) -> TestController {
    let mut bus = EmulatedBus::new();
    for (slot, drive) in drives {
        bus.attach(slot, drive);
    }
    IdeController::initialize(bus, NoDelay, POLL_BUDGET)
}

/// 槽位 0 上一块内存盘的卷
pub fn volume(sectors: u32) -> Elixir<TestController> {
    Elixir::new(controller(vec![(0, mem_drive(sectors))]))
}
