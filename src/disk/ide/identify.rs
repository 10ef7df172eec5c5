use log::{debug, trace, warn};

use super::{
    device::{DeviceType, IdeDevice},
    regs::{Register, ATA_CMD_IDENTIFY, DEVSEL_CHS},
    IdeController,
};
use crate::disk::port_io::{PortIo, Timer};

impl<P: PortIo, T: Timer> IdeController<P, T> {
    /// 探测一个 (通道, 驱动器) 槽位
    ///
    /// 状态为 0x00 或 0xFF 表示没有设备。发出 IDENTIFY 后由柱面寄存器签名
    /// 区分设备类别，只有 ATA 设备会继续读取 256 字的 IDENTIFY 数据。
    pub(super) fn probe(&mut self, channel: usize, drive: u8) -> IdeDevice {
        self.select(channel, DEVSEL_CHS | (drive << 4));

        let status = self.read_reg(channel, Register::Command);
        if status == 0x00 || status == 0xFF {
            return IdeDevice::default();
        }

        for reg in [
            Register::SectorCount,
            Register::LbaLow,
            Register::LbaMid,
            Register::LbaHigh,
        ] {
            self.write_reg(channel, reg, 0);
        }
        self.write_reg(channel, Register::Command, ATA_CMD_IDENTIFY);
        self.timer.wait_ms(1);

        if self.read_reg(channel, Register::Command) == 0 {
            return IdeDevice::default();
        }

        if let Err(e) = self.wait_not_busy(channel) {
            warn!("IDE {}:{} stuck busy after IDENTIFY: {}", channel, drive, e);
            return IdeDevice::default();
        }

        let cl = self.read_reg(channel, Register::LbaMid);
        let ch = self.read_reg(channel, Register::LbaHigh);
        let kind = DeviceType::from_signature(cl, ch);
        trace!("IDE {}:{} signature {:#04x} {:#04x}", channel, drive, cl, ch);

        match kind {
            DeviceType::Ata => {}
            DeviceType::Atapi | DeviceType::Sata => {
                return IdeDevice::unsupported(channel as u8, drive, kind)
            }
            DeviceType::None => return IdeDevice::default(),
        }

        if let Err(e) = self.poll_status(channel, true) {
            debug!("IDE {}:{} IDENTIFY failed: {}", channel, drive, e);
            return IdeDevice::default();
        }

        let port = Register::Data.port(&self.channels[channel]);
        for pair in self.scratch.chunks_exact_mut(2) {
            pair.copy_from_slice(&self.ports.inw(port).to_le_bytes());
        }

        IdeDevice::from_identify(channel as u8, drive, &self.scratch)
    }
}
