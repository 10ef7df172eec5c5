use std::{error::Error, sync::mpsc::Sender};

use log::{info, warn};

use crate::{
    disk::{
        config::MachineConfig,
        emu::{EmulatedBus, EmulatedDrive},
        file_disk::FileDisk,
        ide::IdeController,
        port_io::{PortIo, SleepTimer},
    },
    fs::Elixir,
    shell::BootProgress,
};

/// 启动后 shell 持有的控制器：端口在运行时决定是模拟总线还是真实硬件
pub type SystemController = IdeController<Box<dyn PortIo + Send>, SleepTimer>;

/// shell 使用的卷管理器
pub type Machine = Elixir<SystemController>;

pub fn perform_disk_initialization(tx: Sender<BootProgress>) {
    let result = boot(&tx);
    let _ = tx.send(BootProgress::Finished(result));
}

fn boot(tx: &Sender<BootProgress>) -> Result<Machine, Box<dyn Error + Send>> {
    let step = |msg: String| {
        let _ = tx.send(BootProgress::Step(msg));
    };
    let progress = |pos: u64| {
        let _ = tx.send(BootProgress::Progress(pos));
    };

    step("🧠 Reading machine configuration...".to_string());
    let config = MachineConfig::from_env().map_err(|e| Box::new(e) as Box<dyn Error + Send>)?;
    progress(10);

    let ports = build_ports(&config, &step, &progress)?;

    step("⚙️  Probing IDE channels...".to_string());
    let ide = IdeController::initialize(ports, SleepTimer, config.poll_budget);
    progress(90);

    let found = ide.devices().iter().filter(|d| d.reserved).count();
    info!("{} ATA drive(s) ready", found);
    step(format!("📁 {} ATA drive(s) ready", found));
    progress(100);

    Ok(Elixir::new(ide))
}

fn build_ports(
    config: &MachineConfig,
    step: &dyn Fn(String),
    progress: &dyn Fn(u64),
) -> Result<Box<dyn PortIo + Send>, Box<dyn Error + Send>> {
    if config.hardware {
        #[cfg(all(feature = "hardware", target_arch = "x86_64"))]
        {
            step("🔌 Using legacy IDE ports".to_string());
            // SAFETY: ELIXIR_HARDWARE 只应在拥有端口 I/O 特权的环境中设置
            let ports = unsafe { crate::disk::port_io::HardwarePorts::new() };
            return Ok(Box::new(ports));
        }
        #[cfg(not(all(feature = "hardware", target_arch = "x86_64")))]
        warn!("ELIXIR_HARDWARE set but built without the `hardware` feature, using emulator");
    }

    let mut bus = EmulatedBus::new();
    let attached: Vec<_> = config.attached().collect();
    for (n, (slot, spec)) in attached.iter().enumerate() {
        step(format!(
            "💾 Attaching {} ({} sectors) to slot {}...",
            spec.path.display(),
            spec.sectors,
            slot
        ));
        let media = FileDisk::open(&spec.path, spec.sectors)
            .map_err(|e| Box::new(e) as Box<dyn Error + Send>)?;
        bus.attach(*slot, EmulatedDrive::ata(model_name(*slot), Box::new(media)));
        progress(10 + 60 * (n as u64 + 1) / attached.len() as u64);
    }

    Ok(Box::new(bus))
}

fn model_name(slot: usize) -> String {
    format!("ELIXIR VIRTUAL DISK {}", slot)
}
