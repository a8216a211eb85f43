//! System metrics for health and monitoring endpoints
//!
//! [`SystemMetrics`] is the cheap per-process view embedded in health checks;
//! [`SystemSnapshot`] is the host-wide view served by `/api/system`.

use serde::Serialize;
use sysinfo::{Networks, Pid, System};

const MB: u64 = 1024 * 1024;

/// Process resource metrics
#[derive(Debug, Clone, Serialize)]
pub struct SystemMetrics {
    pub cpu_count: usize,
    /// Can exceed 100% on multi-core hosts
    pub process_cpu_percent: f32,
    pub process_memory_mb: u64,
    pub memory_total_mb: u64,
}

impl SystemMetrics {
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_usage();

        let pid = Pid::from_u32(std::process::id());
        sys.refresh_processes_specifics(
            sysinfo::ProcessesToUpdate::Some(&[pid]),
            true,
            sysinfo::ProcessRefreshKind::new().with_cpu().with_memory(),
        );

        let (process_cpu, process_mem) = sys
            .process(pid)
            .map(|p| (p.cpu_usage(), p.memory() / MB))
            .unwrap_or((0.0, 0));

        Self {
            cpu_count: sys.cpus().len(),
            process_cpu_percent: process_cpu,
            process_memory_mb: process_mem,
            memory_total_mb: sys.total_memory() / MB,
        }
    }
}

/// Host-wide resource snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSnapshot {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Host uptime in seconds
    pub uptime: u64,
    pub hostname: String,
    pub platform: &'static str,
    pub arch: &'static str,
    pub cpu: CpuSnapshot,
    pub memory: MemorySnapshot,
    pub network: Vec<NetworkSnapshot>,
    pub process: SystemMetrics,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuSnapshot {
    pub brand: String,
    pub cores: usize,
    /// MHz of the first core
    pub speed: u64,
    pub current_load: f32,
    /// 1, 5 and 15 minute load averages
    pub avg_load: [f64; 3],
    pub cpus: Vec<f32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    pub total: u64,
    pub free: u64,
    pub used: u64,
    pub available: u64,
    /// Formatted with two decimals
    pub usage_percent: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSnapshot {
    pub iface: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl SystemSnapshot {
    /// Sample the host; waits one CPU refresh interval so load figures are meaningful
    pub async fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        sys.refresh_cpu_all();
        sys.refresh_memory();

        let cpus: Vec<f32> = sys.cpus().iter().map(|c| c.cpu_usage()).collect();
        let (brand, speed) = sys
            .cpus()
            .first()
            .map(|c| (c.brand().to_string(), c.frequency()))
            .unwrap_or_default();
        let load = System::load_average();

        let total = sys.total_memory();
        let used = sys.used_memory();
        let usage_percent = if total == 0 {
            "0.00".to_string()
        } else {
            format!("{:.2}", used as f64 / total as f64 * 100.0)
        };

        let networks = Networks::new_with_refreshed_list();
        let mut network: Vec<NetworkSnapshot> = networks
            .list()
            .iter()
            .map(|(name, data)| NetworkSnapshot {
                iface: name.clone(),
                rx_bytes: data.total_received(),
                tx_bytes: data.total_transmitted(),
            })
            .collect();
        network.sort_by(|a, b| a.iface.cmp(&b.iface));

        Self {
            timestamp: chrono::Utc::now(),
            uptime: System::uptime(),
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            platform: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            cpu: CpuSnapshot {
                brand,
                cores: cpus.len(),
                speed,
                current_load: sys.global_cpu_usage(),
                avg_load: [load.one, load.five, load.fifteen],
                cpus,
            },
            memory: MemorySnapshot {
                total,
                free: sys.free_memory(),
                used,
                available: sys.available_memory(),
                usage_percent,
            },
            network,
            process: SystemMetrics::collect(),
        }
    }
}
