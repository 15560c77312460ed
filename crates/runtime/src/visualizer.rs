//! Live resource visualizer
//!
//! Periodically copies the registry contents together with process metrics
//! from `/proc` (CPU usage since the previous sample, resident memory, open
//! file descriptors) and derives a dependency graph over the resources.
//!
//! Metric collection never fails: unreadable `/proc` entries produce zeroed
//! fields.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hal_platform::HalError;
use parking_lot::Mutex;
use serde::Serialize;

use crate::{CancellationToken, ResourceId, ResourceRegistry};

/// One registry entry plus process metrics at sample time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceUsage {
    /// Registry identifier
    pub id: ResourceId,
    /// Resource name
    pub name: String,
    /// Reference count
    pub ref_count: u32,
    /// In-use flag
    pub in_use: bool,
    /// Aggregate CPU busy percentage since the previous sample
    pub cpu_percent: f64,
    /// Resident set size in bytes
    pub memory_bytes: u64,
    /// Open file descriptors of this process
    pub open_fds: usize,
}

/// Node of the resource dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceNode {
    /// Registry identifier
    pub id: ResourceId,
    /// Resource name
    pub name: String,
    /// Resources this one depends on. The registry does not track
    /// inter-resource dependencies, so this is currently always empty.
    pub dependencies: Vec<ResourceId>,
}

#[derive(Debug, Clone, Copy, Default)]
struct CpuTimes {
    total: u64,
    idle: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ProcessMetrics {
    cpu_percent: f64,
    memory_bytes: u64,
    open_fds: usize,
}

/// `/proc` reader that remembers the previous CPU counters.
struct ProcSampler {
    root: PathBuf,
    previous: Mutex<CpuTimes>,
}

impl ProcSampler {
    fn new(root: PathBuf) -> Self {
        Self { root, previous: Mutex::new(CpuTimes::default()) }
    }

    fn sample(&self) -> ProcessMetrics {
        ProcessMetrics {
            cpu_percent: self.cpu_percent(),
            memory_bytes: read_resident_bytes(&self.root.join("self/status")),
            open_fds: count_entries(&self.root.join("self/fd")),
        }
    }

    fn cpu_percent(&self) -> f64 {
        let Some(now) = read_cpu_times(&self.root.join("stat")) else {
            return 0.0;
        };
        let mut previous = self.previous.lock();
        let delta_total = now.total.saturating_sub(previous.total);
        let delta_idle = now.idle.saturating_sub(previous.idle);
        *previous = now;
        if delta_total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let busy = delta_total.saturating_sub(delta_idle) as f64 / delta_total as f64;
        busy * 100.0
    }
}

/// Sum of the first eight counters of the aggregate `cpu` line.
fn read_cpu_times(path: &Path) -> Option<CpuTimes> {
    let text = fs::read_to_string(path).ok()?;
    let line = text.lines().next()?;
    let mut fields = line.split_whitespace();
    if fields.next()? != "cpu" {
        return None;
    }
    let counters: Vec<u64> = fields.take(8).filter_map(|f| f.parse().ok()).collect();
    let idle = *counters.get(3)?;
    Some(CpuTimes { total: counters.iter().sum(), idle })
}

/// `VmRSS` from `/proc/self/status`. The kernel reports it in kB whatever
/// the page size.
fn read_resident_bytes(path: &Path) -> u64 {
    let Ok(text) = fs::read_to_string(path) else {
        return 0;
    };
    text.lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .map_or(0, |kb| kb.saturating_mul(1024))
}

fn count_entries(dir: &Path) -> usize {
    fs::read_dir(dir).map_or(0, |entries| entries.filter_map(Result::ok).count())
}

#[derive(Default, Serialize)]
struct View {
    usage: Vec<ResourceUsage>,
    graph: Vec<ResourceNode>,
}

struct Shared {
    registry: Arc<ResourceRegistry>,
    sampler: ProcSampler,
    view: Mutex<View>,
}

impl Shared {
    fn gather(&self) {
        let metrics = self.sampler.sample();
        let usage = self
            .registry
            .snapshot()
            .into_iter()
            .map(|info| ResourceUsage {
                id: info.id,
                name: info.name,
                ref_count: info.ref_count,
                in_use: info.in_use,
                cpu_percent: metrics.cpu_percent,
                memory_bytes: metrics.memory_bytes,
                open_fds: metrics.open_fds,
            })
            .collect();
        self.view.lock().usage = usage;
    }

    fn build_graph(&self) {
        let mut view = self.view.lock();
        view.graph = view
            .usage
            .iter()
            .map(|u| ResourceNode { id: u.id, name: u.name.clone(), dependencies: Vec::new() })
            .collect();
    }
}

struct Worker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Observability view over a [`ResourceRegistry`].
pub struct ResourceVisualizer {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl ResourceVisualizer {
    /// Visualizer reading metrics from `/proc`.
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self::with_proc_root(registry, "/proc")
    }

    /// Visualizer reading metrics from an alternative procfs root.
    pub fn with_proc_root(registry: Arc<ResourceRegistry>, proc_root: impl Into<PathBuf>) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry,
                sampler: ProcSampler::new(proc_root.into()),
                view: Mutex::new(View::default()),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Start sampling every `interval` on a background thread.
    ///
    /// Returns `Ok(false)` if already running.
    pub fn start_live_update(&self, interval: Duration) -> Result<bool, HalError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(false);
        }
        let token = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let thread_token = token.clone();
        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        let handle = thread::Builder::new()
            .name("hal-visualizer".into())
            .spawn(move || {
                tracing::debug!(interval_ms, "visualizer started");
                while !thread_token.is_cancelled() {
                    shared.gather();
                    shared.build_graph();
                    if !thread_token.sleep(interval) {
                        break;
                    }
                }
                tracing::debug!("visualizer stopped");
            })
            .map_err(|e| HalError::spawn("hal-visualizer", e))?;
        *worker = Some(Worker { token, handle });
        Ok(true)
    }

    /// Stop and join the sampling thread. No-op when not running.
    pub fn stop_live_update(&self) {
        let worker = self.worker.lock().take();
        if let Some(Worker { token, handle }) = worker {
            token.cancel();
            if handle.join().is_err() {
                tracing::warn!("visualizer thread panicked");
            }
        }
    }

    /// Whether the sampling thread is active.
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Take one usage sample now.
    pub fn gather_resource_data(&self) {
        self.shared.gather();
    }

    /// Rebuild the dependency graph from the latest usage sample.
    pub fn build_resource_graph(&self) {
        self.shared.build_graph();
    }

    /// Copy of the latest usage sample.
    pub fn usage(&self) -> Vec<ResourceUsage> {
        self.shared.view.lock().usage.clone()
    }

    /// Copy of the latest dependency graph.
    pub fn graph(&self) -> Vec<ResourceNode> {
        self.shared.view.lock().graph.clone()
    }

    /// Text table of the latest usage sample.
    pub fn render_usage(&self) -> String {
        let view = self.shared.view.lock();
        let mut out = String::from("=== HAL Resource Usage ===\n");
        out.push_str("ID\tName\tRefCount\tInUse\tCPU%\tMemory KB\tFDs\tCPU Bar\n");
        for u in &view.usage {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let bar_len = (u.cpu_percent / 5.0).clamp(0.0, 20.0) as usize;
            let _ = writeln!(
                out,
                "{}\t{}\t{}\t\t{}\t{:.1}\t{}\t{}\t{}",
                u.id,
                u.name,
                u.ref_count,
                if u.in_use { "Yes" } else { "No" },
                u.cpu_percent,
                u.memory_bytes / 1024,
                u.open_fds,
                "#".repeat(bar_len),
            );
        }
        out
    }

    /// Text listing of the latest dependency graph.
    pub fn render_graph(&self) -> String {
        let view = self.shared.view.lock();
        let mut out = String::from("=== Resource Graph ===\n");
        for node in &view.graph {
            let deps: Vec<String> = node.dependencies.iter().map(ToString::to_string).collect();
            let _ = writeln!(out, "{} [ID: {}] -> {}", node.name, node.id, deps.join(" "));
        }
        out
    }

    /// Latest usage sample and graph as a JSON object.
    pub fn snapshot_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&*self.shared.view.lock())
    }
}

impl Drop for ResourceVisualizer {
    fn drop(&mut self) {
        self.stop_live_update();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::ResourceKind;

    fn fake_proc(stat: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stat"), stat).unwrap();
        fs::create_dir_all(dir.path().join("self/fd")).unwrap();
        fs::write(
            dir.path().join("self/status"),
            "Name:\thal\nVmSize:\t    4000 kB\nVmRSS:\t    1000 kB\nThreads:\t3\n",
        )
        .unwrap();
        for fd in ["0", "1", "2"] {
            fs::write(dir.path().join("self/fd").join(fd), "").unwrap();
        }
        dir
    }

    #[test]
    fn cpu_percent_is_delta_between_samples() {
        let proc_dir = fake_proc("cpu  100 0 100 800 0 0 0 0 0 0\n");
        let sampler = ProcSampler::new(proc_dir.path().to_path_buf());
        // First sample measures against zero
        assert!((sampler.sample().cpu_percent - 20.0).abs() < 1e-9);

        fs::write(proc_dir.path().join("stat"), "cpu  150 0 150 900 0 0 0 0 0 0\n").unwrap();
        let m = sampler.sample();
        assert!((m.cpu_percent - 50.0).abs() < 1e-9);
        assert_eq!(m.memory_bytes, 1000 * 1024);
        assert_eq!(m.open_fds, 3);
    }

    #[test]
    fn resident_size_comes_from_vmrss_in_kilobytes() {
        let dir = tempfile::tempdir().unwrap();
        let status = dir.path().join("status");
        fs::write(&status, "VmPeak:\t  90000 kB\nVmRSS:\t   12345 kB\nRssAnon:\t 8000 kB\n")
            .unwrap();
        assert_eq!(read_resident_bytes(&status), 12_345 * 1024);

        // Kernel threads have no VmRSS line
        fs::write(&status, "Name:\tkthreadd\nState:\tS (sleeping)\n").unwrap();
        assert_eq!(read_resident_bytes(&status), 0);
    }

    #[test]
    fn unreadable_proc_yields_zeroes() {
        let sampler = ProcSampler::new(PathBuf::from("/nonexistent/proc"));
        assert_eq!(sampler.sample(), ProcessMetrics::default());
    }

    #[test]
    fn graph_mirrors_usage_with_no_edges() {
        let registry = Arc::new(ResourceRegistry::new());
        let a = registry.register_resource(ResourceKind::GpioPin, "GPIO17", 17);
        registry.register_resource(ResourceKind::I2cBus, "I2C1", 1);
        registry.set_in_use(a, true);

        let proc_dir = fake_proc("cpu  1 0 1 8 0 0 0 0\n");
        let vis = ResourceVisualizer::with_proc_root(Arc::clone(&registry), proc_dir.path());
        vis.gather_resource_data();
        vis.build_resource_graph();

        let usage = vis.usage();
        assert_eq!(usage.len(), 2);
        assert!(usage.iter().any(|u| u.name == "GPIO17" && u.in_use));
        assert!(vis.graph().iter().all(|n| n.dependencies.is_empty()));

        assert!(vis.render_usage().contains("GPIO17"));
        assert!(vis.render_graph().contains("I2C1 [ID: 2] -> "));
        let json: serde_json::Value = serde_json::from_str(&vis.snapshot_json().unwrap()).unwrap();
        assert_eq!(json["usage"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn live_update_starts_once_and_stops() {
        let registry = Arc::new(ResourceRegistry::new());
        registry.register_resource(ResourceKind::Timer, "TIMER1", 1);
        let proc_dir = fake_proc("cpu  1 0 1 8 0 0 0 0\n");
        let vis = ResourceVisualizer::with_proc_root(registry, proc_dir.path());

        assert!(vis.start_live_update(Duration::from_millis(5)).unwrap());
        assert!(!vis.start_live_update(Duration::from_millis(5)).unwrap());
        thread::sleep(Duration::from_millis(50));
        vis.stop_live_update();
        assert!(!vis.is_running());
        assert_eq!(vis.usage().len(), 1);
        assert_eq!(vis.graph().len(), 1);
    }
}
