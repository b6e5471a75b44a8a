//! Per-lock counters and the report over every live lock.

use std::{
    io::{self, Write},
    sync::atomic::{AtomicU64, Ordering},
};

use serde::Serialize;

use crate::{mutex_registry, spin_registry, LockKind, Registry};

/// Counters and identity of one tracked lock.
///
/// Shared between the lock and its registry entry so the report can read it
/// while the lock is in use. Only the thread that just acquired the lock
/// increments the counters, so relaxed ordering suffices.
#[derive(Debug)]
pub struct LockStats {
    kind: LockKind,
    name: Box<str>,
    uncontended: AtomicU64,
    contended: AtomicU64,
}

impl LockStats {
    pub(crate) fn new(kind: LockKind, name: Box<str>) -> Self {
        Self {
            kind,
            name,
            uncontended: AtomicU64::new(0),
            contended: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> LockKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub(crate) fn record_uncontended(&self) {
        self.uncontended.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_contended(&self) {
        self.contended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counts(&self) -> Counts {
        Counts {
            uncontended: self.uncontended.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
        }
    }

    pub fn report(&self) -> LockReport {
        let counts = self.counts();
        LockReport {
            kind: self.kind,
            name: self.name.to_string(),
            uncontended: counts.uncontended,
            contended: counts.contended,
            contention_pct: counts.contention_pct(),
        }
    }

    pub(crate) fn write_row<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let counts = self.counts();
        writeln!(
            out,
            "{} {:<15} {:>10} {:>10} {:>5.0}%",
            self.kind.tag(),
            self.name,
            counts.uncontended,
            counts.contended,
            counts.contention_pct()
        )
    }
}

/// A point-in-time read of a lock's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub uncontended: u64,
    pub contended: u64,
}

impl Counts {
    pub fn total(&self) -> u64 {
        self.uncontended + self.contended
    }

    /// Share of acquisitions that had to wait, in percent. Zero for a lock
    /// that was never acquired.
    pub fn contention_pct(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => 100.0 * self.contended as f64 / total as f64,
        }
    }
}

/// One row of the report in machine-readable form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockReport {
    pub kind: LockKind,
    pub name: String,
    pub uncontended: u64,
    pub contended: u64,
    pub contention_pct: f64,
}

/// Print the report for every live tracked lock to stdout.
pub fn print() {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = write_report(&mut out) {
        tracing::warn!(error = %e, "failed to print lock stats");
    }
}

/// Write the report for every live tracked lock, mutexes first.
///
/// Each registry's guard is held while its rows are written, so a slow sink
/// stalls concurrent creation and destruction of locks of that kind.
pub fn write_report<W: Write + ?Sized>(out: &mut W) -> io::Result<()> {
    write_header(out)?;
    mutex_registry().write_rows(out)?;
    spin_registry().write_rows(out)?;
    Ok(())
}

pub(crate) fn write_header<W: Write + ?Sized>(out: &mut W) -> io::Result<()> {
    writeln!(out, "=== Tracking stats ===")?;
    writeln!(
        out,
        "T {:<15} {:>10} {:>10} {:>6}",
        "name", "un-", "contended", "c-pct"
    )
}

/// Rows for every live tracked lock, mutexes first, each registry in
/// most-recently-created-first order.
pub fn snapshot() -> Vec<LockReport> {
    let mut rows = Vec::new();
    for registry in [mutex_registry(), spin_registry()] {
        collect(registry, &mut rows);
    }
    rows
}

fn collect(registry: &Registry, rows: &mut Vec<LockReport>) {
    registry.for_each(|stats| rows.push(stats.report()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_lock_reports_zero_percent() {
        let stats = LockStats::new(LockKind::Mutex, "idle".into());
        let mut out = Vec::new();
        stats.write_row(&mut out).unwrap();

        let line = String::from_utf8(out).unwrap();
        assert_eq!(
            line,
            format!("M {:<15} {:>10} {:>10} {:>5}%\n", "idle", 0, 0, 0)
        );
        assert_eq!(stats.report().contention_pct, 0.0);
    }

    #[test]
    fn percentage_of_contended() {
        let stats = LockStats::new(LockKind::Spin, "busy".into());
        stats.record_uncontended();
        stats.record_uncontended();
        stats.record_uncontended();
        stats.record_contended();

        let report = stats.report();
        assert_eq!(report.uncontended, 3);
        assert_eq!(report.contended, 1);
        assert_eq!(report.contention_pct, 25.0);

        let mut out = Vec::new();
        stats.write_row(&mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().ends_with("   25%\n"));
    }

    #[test]
    fn header_columns_line_up_with_rows() {
        let mut out = Vec::new();
        write_header(&mut out).unwrap();
        LockStats::new(LockKind::Mutex, "x".into())
            .write_row(&mut out)
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "=== Tracking stats ===");
        assert_eq!(lines[1].len(), lines[2].len());
    }
}
