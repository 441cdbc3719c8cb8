//! Best-effort OS lookups by pid.
//!
//! Linux reads `/proc`; every other platform answers `Unsupported`, which
//! callers turn into a degraded field.

use std::io;

use serde_json::json;

use super::PartialStats;

/// One reading of `/proc/<pid>/stat`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProcSample {
    pub state: char,
    pub user_secs: f64,
    pub system_secs: f64,
    pub threads: u64,
    pub vms_bytes: u64,
    pub rss_bytes: u64,
}

impl ProcSample {
    pub fn into_stats(self) -> PartialStats {
        let mut s = PartialStats::new();
        s.insert(
            "cpu",
            json!({ "user_secs": self.user_secs, "system_secs": self.system_secs }),
        );
        s.insert(
            "memory",
            json!({ "rss_bytes": self.rss_bytes, "vms_bytes": self.vms_bytes }),
        );
        s.insert("threads", self.threads);
        s.insert("state", self.state.to_string());
        s
    }
}

/// Short executable name of `pid` (what `ps -o comm` shows).
#[cfg(target_os = "linux")]
pub(crate) fn process_name(pid: u32) -> io::Result<String> {
    let comm = std::fs::read_to_string(format!("/proc/{pid}/comm"))?;
    Ok(comm.trim_end().to_string())
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn process_name(_pid: u32) -> io::Result<String> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

#[cfg(target_os = "linux")]
pub(crate) fn sample(pid: u32) -> io::Result<ProcSample> {
    let raw = std::fs::read_to_string(format!("/proc/{pid}/stat"))?;
    // SAFETY: sysconf only reads static configuration values.
    let (ticks, page) = unsafe {
        (
            libc::sysconf(libc::_SC_CLK_TCK),
            libc::sysconf(libc::_SC_PAGESIZE),
        )
    };
    parse_stat(&raw, ticks.max(1) as f64, page.max(1) as u64)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn sample(_pid: u32) -> io::Result<ProcSample> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

/// Parses the single-line `stat` format. The command name sits in parens and
/// may itself contain spaces or parens, so fields are counted from the last `)`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_stat(raw: &str, ticks_per_sec: f64, page_size: u64) -> io::Result<ProcSample> {
    let invalid = || io::Error::new(io::ErrorKind::InvalidData, "malformed /proc stat line");

    let rest = raw.rfind(')').map(|i| &raw[i + 1..]).ok_or_else(invalid)?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // fields[0] is stat field 3 (state).
    let num = |idx: usize| -> io::Result<u64> {
        fields
            .get(idx)
            .and_then(|f| f.parse::<u64>().ok())
            .ok_or_else(invalid)
    };

    let state = fields
        .first()
        .and_then(|s| s.chars().next())
        .ok_or_else(invalid)?;

    Ok(ProcSample {
        state,
        user_secs: num(11)? as f64 / ticks_per_sec,
        system_secs: num(12)? as f64 / ticks_per_sec,
        threads: num(17)?,
        vms_bytes: num(20)?,
        rss_bytes: num(21)?.saturating_mul(page_size),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "4242 (my (odd) proc) S 1 4242 4242 0 -1 4194560 150 0 0 0 \
                        250 50 0 0 20 0 3 0 123456 10485760 256 18446744073709551615";

    #[test]
    fn parses_fields_after_last_paren() {
        let s = parse_stat(LINE, 100.0, 4096).unwrap();
        assert_eq!(s.state, 'S');
        assert_eq!(s.user_secs, 2.5);
        assert_eq!(s.system_secs, 0.5);
        assert_eq!(s.threads, 3);
        assert_eq!(s.vms_bytes, 10_485_760);
        assert_eq!(s.rss_bytes, 256 * 4096);
    }

    #[test]
    fn rejects_truncated_line() {
        let err = parse_stat("1 (x) S 1 2", 100.0, 4096).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn sample_renders_nested_stats() {
        let stats = parse_stat(LINE, 100.0, 4096).unwrap().into_stats();
        assert_eq!(stats.get_path("memory.rss_bytes"), Some(&json!(256 * 4096)));
        assert_eq!(stats.get_path("threads"), Some(&json!(3)));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn reads_own_process() {
        let pid = std::process::id();
        assert!(!process_name(pid).unwrap().is_empty());
        assert!(sample(pid).unwrap().threads >= 1);
    }
}
