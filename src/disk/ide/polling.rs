use super::{
    error::{IdeError, Result},
    regs::{Register, Status},
    IdeController,
};
use crate::disk::port_io::{PortIo, Timer};

impl<P: PortIo, T: Timer> IdeController<P, T> {
    /// 轮询通道状态
    ///
    /// 总是先做 4 次备用状态读取作为稳定延时，然后在预算内等待 BSY 清除。
    /// `check_error` 为真时依次检查 ERR、DF 和 DRQ。
    pub fn poll_status(&mut self, channel: usize, check_error: bool) -> Result<()> {
        self.delay(channel);
        let status = self.wait_not_busy(channel)?;

        if check_error {
            if status.contains(Status::ERR) {
                let error = self.read_reg(channel, Register::Error);
                return Err(IdeError::DeviceError { error });
            }
            if status.contains(Status::DF) {
                return Err(IdeError::DeviceFault);
            }
            if !status.contains(Status::DRQ) {
                return Err(IdeError::NoDataRequest);
            }
        }

        Ok(())
    }

    /// 等待 BSY 清除，返回最后读到的状态
    pub(super) fn wait_not_busy(&mut self, channel: usize) -> Result<Status> {
        for _ in 0..=self.poll_budget {
            let status = Status::from_bits_retain(self.read_reg(channel, Register::Command));
            if !status.contains(Status::BSY) {
                return Ok(status);
            }
            std::hint::spin_loop();
        }
        Err(IdeError::Timeout)
    }
}
