//! Local hardware sensor source backed by sysinfo.

use async_trait::async_trait;
use parking_lot::Mutex;
use sysinfo::{Components, System};

use crate::snapshot::{SensorKind, SensorReading, Snapshot, SnapshotError, SnapshotSource};

/// Samples CPU, memory, and thermal sensors on the local machine.
///
/// The sysinfo handles need `&mut` to refresh, so they sit behind mutexes
/// and `sample` stays shareable across the scheduler and concurrent scrapes.
pub struct SysinfoSource {
    system: Mutex<System>,
    components: Mutex<Components>,
}

impl SysinfoSource {
    /// Create a source with a fully refreshed device list.
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new_all()),
            components: Mutex::new(Components::new_with_refreshed_list()),
        }
    }

    fn collect_cpu(system: &System, readings: &mut Vec<SensorReading>) {
        let cpu_name = system
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "CPU".to_string());

        readings.push(SensorReading::new(
            "/cpu/0/load/0",
            cpu_name.clone(),
            "CPU Total",
            SensorKind::Load,
            system.global_cpu_usage() as f64,
        ));

        for (i, cpu) in system.cpus().iter().enumerate() {
            readings.push(SensorReading::new(
                format!("/cpu/0/load/{}", i + 1),
                cpu_name.clone(),
                format!("Core #{}", i + 1),
                SensorKind::Load,
                cpu.cpu_usage() as f64,
            ));

            let frequency = cpu.frequency();
            if frequency > 0 {
                readings.push(SensorReading::new(
                    format!("/cpu/0/clock/{}", i + 1),
                    cpu_name.clone(),
                    format!("Core #{}", i + 1),
                    SensorKind::Clock,
                    frequency as f64,
                ));
            }
        }
    }

    fn collect_memory(system: &System, readings: &mut Vec<SensorReading>) {
        let total = system.total_memory();
        let used = system.used_memory();
        let available = system.available_memory();

        readings.push(SensorReading::new(
            "/memory/0/data/0",
            "Memory",
            "Used Memory",
            SensorKind::Data,
            used as f64,
        ));
        readings.push(SensorReading::new(
            "/memory/0/data/1",
            "Memory",
            "Available Memory",
            SensorKind::Data,
            available as f64,
        ));

        if total > 0 {
            readings.push(SensorReading::new(
                "/memory/0/load/0",
                "Memory",
                "Memory",
                SensorKind::Load,
                (used as f64 / total as f64) * 100.0,
            ));
        }
    }

    fn collect_temperatures(components: &Components, readings: &mut Vec<SensorReading>) {
        for (i, component) in components.list().iter().enumerate() {
            let Some(temperature) = component.temperature() else {
                continue;
            };
            if !temperature.is_finite() {
                continue;
            }

            readings.push(SensorReading::new(
                format!("/thermal/{}/temperature/0", i),
                component.label().to_string(),
                "Temperature",
                SensorKind::Temperature,
                temperature as f64,
            ));
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotSource for SysinfoSource {
    async fn sample(&self) -> Result<Snapshot, SnapshotError> {
        let mut readings = Vec::new();

        {
            let mut system = self.system.lock();
            system.refresh_cpu_usage();
            system.refresh_memory();
            Self::collect_cpu(&system, &mut readings);
            Self::collect_memory(&system, &mut readings);
        }

        {
            let mut components = self.components.lock();
            components.refresh(true);
            Self::collect_temperatures(&components, &mut readings);
        }

        Ok(Snapshot::new(readings))
    }
}
