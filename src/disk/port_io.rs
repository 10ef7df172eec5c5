//! IDE 驱动与机器之间的端口 I/O 和定时器接口。
//!
//! 驱动从不直接访问硬件：所有寄存器读写都经过 [`PortIo`]，所有稳定延时都经过
//! [`Timer`]。裸机上端口就是真实的 `in`/`out` 指令，在 shell 和测试中则由
//! [`crate::disk::emu::EmulatedBus`] 提供。

use std::{thread, time::Duration};

/// x86 I/O 端口空间的字节/字访问
pub trait PortIo {
    fn inb(&mut self, port: u16) -> u8;
    fn outb(&mut self, port: u16, value: u8);
    fn inw(&mut self, port: u16) -> u16;
    fn outw(&mut self, port: u16, value: u16);
}

impl<P: PortIo + ?Sized> PortIo for Box<P> {
    fn inb(&mut self, port: u16) -> u8 {
        (**self).inb(port)
    }

    fn outb(&mut self, port: u16, value: u8) {
        (**self).outb(port, value)
    }

    fn inw(&mut self, port: u16) -> u16 {
        (**self).inw(port)
    }

    fn outw(&mut self, port: u16, value: u16) {
        (**self).outw(port, value)
    }
}

/// 阻塞式毫秒等待（由 PIT 定时器提供）
pub trait Timer {
    fn wait_ms(&mut self, ms: u32);
}

/// 让当前线程休眠
#[derive(Debug, Default, Clone, Copy)]
pub struct SleepTimer;

impl Timer for SleepTimer {
    fn wait_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}

/// 立即返回，模拟控制器不需要稳定时间
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay;

impl Timer for NoDelay {
    fn wait_ms(&mut self, _ms: u32) {}
}

#[cfg(all(feature = "hardware", target_arch = "x86_64"))]
pub use hardware::HardwarePorts;

#[cfg(all(feature = "hardware", target_arch = "x86_64"))]
mod hardware {
    use super::PortIo;
    use x86_64::structures::port::{PortRead as _, PortWrite as _};

    /// 当前 CPU 的传统 I/O 端口空间
    #[derive(Debug)]
    pub struct HardwarePorts {
        _private: (),
    }

    impl HardwarePorts {
        /// # Safety
        ///
        /// 调用者必须拥有 IDE 端口范围的 I/O 特权，并且是唯一驱动这些控制器的代码。
        pub unsafe fn new() -> Self {
            HardwarePorts { _private: () }
        }
    }

    impl PortIo for HardwarePorts {
        fn inb(&mut self, port: u16) -> u8 {
            unsafe { u8::read_from_port(port) }
        }

        fn outb(&mut self, port: u16, value: u8) {
            unsafe { u8::write_to_port(port, value) }
        }

        fn inw(&mut self, port: u16) -> u16 {
            unsafe { u16::read_from_port(port) }
        }

        fn outw(&mut self, port: u16, value: u16) {
            unsafe { u16::write_to_port(port, value) }
        }
    }
}
