use semsync_protocol::MemoryConfig;

/// Process-memory sampler for the adaptive batch runtime.
///
/// Reads RSS from `/proc/self/statm`; on platforms without procfs the
/// sampler reports `None` and memory-based throttling is simply inactive.
#[derive(Debug, Clone)]
pub struct MemoryMonitor {
    limit_bytes: u64,
    emergency_percent: f64,
    critical_percent: f64,
}

/// One memory sample relative to the configured limit.
#[derive(Debug, Clone, Copy)]
pub struct MemorySample {
    pub rss_bytes: u64,
    pub used_percent: f64,
}

impl MemoryMonitor {
    #[must_use]
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            limit_bytes: config.memory_limit_mb * 1024 * 1024,
            emergency_percent: config.emergency_percent,
            critical_percent: config.critical_percent,
        }
    }

    /// Current sample, if the platform exposes one.
    #[must_use]
    pub fn sample(&self) -> Option<MemorySample> {
        let rss_bytes = rss_bytes()?;
        #[allow(clippy::cast_precision_loss)]
        let used_percent = if self.limit_bytes == 0 {
            0.0
        } else {
            rss_bytes as f64 / self.limit_bytes as f64 * 100.0
        };
        Some(MemorySample {
            rss_bytes,
            used_percent,
        })
    }

    #[must_use]
    pub fn over_emergency(&self, sample: &MemorySample) -> bool {
        sample.used_percent >= self.emergency_percent
    }

    #[must_use]
    pub fn over_critical(&self, sample: &MemorySample) -> bool {
        sample.used_percent >= self.critical_percent
    }

    #[must_use]
    pub const fn emergency_percent(&self) -> f64 {
        self.emergency_percent
    }

    #[must_use]
    pub const fn limit_bytes(&self) -> u64 {
        self.limit_bytes
    }
}

/// Resident set size of this process in bytes, when observable.
#[must_use]
pub fn rss_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        Some(resident_pages * 4096)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semsync_protocol::MemoryConfig;

    #[test]
    fn thresholds_compare_against_limit() {
        let monitor = MemoryMonitor::new(&MemoryConfig {
            memory_limit_mb: 100,
            emergency_percent: 80.0,
            critical_percent: 90.0,
        });

        let calm = MemorySample {
            rss_bytes: 10 * 1024 * 1024,
            used_percent: 10.0,
        };
        assert!(!monitor.over_emergency(&calm));

        let hot = MemorySample {
            rss_bytes: 85 * 1024 * 1024,
            used_percent: 85.0,
        };
        assert!(monitor.over_emergency(&hot));
        assert!(!monitor.over_critical(&hot));

        let burning = MemorySample {
            rss_bytes: 95 * 1024 * 1024,
            used_percent: 95.0,
        };
        assert!(monitor.over_critical(&burning));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn rss_is_observable_on_linux() {
        let rss = rss_bytes().expect("procfs should be readable");
        assert!(rss > 0);
    }
}
