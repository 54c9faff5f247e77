use chrono::Utc;
use colored::*;
use std::collections::VecDeque;
use std::io::Write;
use std::time::{Duration, Instant};

use turbomul_engine::{SessionSnapshot, SessionState};

// ═══════════════════════════════════════════════════════════════════════
// ROLLING ATTEMPT-RATE WINDOW: 10s / 60s / 15m averages
// ═══════════════════════════════════════════════════════════════════════

struct RateWindow {
    samples: VecDeque<(Instant, u64)>,
    window_secs: u64,
}

impl RateWindow {
    fn new(window_secs: u64) -> Self {
        Self {
            samples: VecDeque::with_capacity(256),
            window_secs,
        }
    }

    fn push(&mut self, now: Instant, attempts: u64) {
        self.samples.push_back((now, attempts));
        let cutoff = now.checked_sub(Duration::from_secs(self.window_secs + 2));
        if let Some(cutoff) = cutoff {
            while self.samples.front().map_or(false, |(t, _)| *t < cutoff) {
                self.samples.pop_front();
            }
        }
    }

    fn rate(&self) -> f64 {
        let (first, last) = match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) if self.samples.len() >= 2 => (first, last),
            _ => return 0.0,
        };
        let dt = last.0.duration_since(first.0).as_secs_f64();
        if dt < 0.5 {
            return 0.0;
        }
        // The first sample opens the window; its count predates it.
        let total: u64 = self.samples.iter().skip(1).map(|(_, n)| n).sum();
        total as f64 / dt
    }
}

// ═══════════════════════════════════════════════════════════════════════
// MINER STATS: fed from session snapshots
// ═══════════════════════════════════════════════════════════════════════

pub struct MinerStats {
    start_time: Instant,
    last: Option<SessionSnapshot>,
    last_attempts: u64,

    // Config metadata
    strategy: String,
    api: String,
    threads: usize,

    window_10s: RateWindow,
    window_60s: RateWindow,
    window_15m: RateWindow,

    print_count: u64,
    last_event: Option<String>,
}

impl MinerStats {
    /// How many terminal lines the panel occupies
    const PANEL_LINES: usize = 8;

    pub fn new(strategy: &str, api: &str, threads: usize) -> Self {
        Self {
            start_time: Instant::now(),
            last: None,
            last_attempts: 0,
            strategy: strategy.to_string(),
            api: api.to_string(),
            threads,
            window_10s: RateWindow::new(10),
            window_60s: RateWindow::new(60),
            window_15m: RateWindow::new(900),
            print_count: 0,
            last_event: None,
        }
    }

    /// Record a snapshot; attempt deltas feed the rate windows and counter
    /// changes become the panel's event line.
    pub fn update(&mut self, snapshot: &SessionSnapshot) {
        self.update_at(Instant::now(), snapshot);
    }

    fn update_at(&mut self, now: Instant, snapshot: &SessionSnapshot) {
        let delta = snapshot.attempts.saturating_sub(self.last_attempts);
        self.last_attempts = snapshot.attempts;
        self.window_10s.push(now, delta);
        self.window_60s.push(now, delta);
        self.window_15m.push(now, delta);

        if let Some(event) = self.event_for(snapshot) {
            self.last_event = Some(event);
        }
        self.last = Some(snapshot.clone());
    }

    fn event_for(&self, snap: &SessionSnapshot) -> Option<String> {
        let prev = self.last.as_ref();
        let before = |pick: &dyn Fn(&SessionSnapshot) -> u64| prev.map_or(0, |p| pick(p));

        if snap.accepted > before(&|s| s.accepted) {
            return Some(format!(
                "accepted {} (epoch {}, diff {} bits)",
                snap.accepted,
                fmt_epoch(snap.epoch),
                snap.difficulty,
            ));
        }
        if snap.rejected > before(&|s| s.rejected) {
            return Some(format!("rejected {}: checksum mismatch", snap.rejected));
        }
        if snap.stale > before(&|s| s.stale) {
            return Some(format!("stale {}: epoch moved or difficulty missed", snap.stale));
        }
        if snap.found > before(&|s| s.found) {
            return Some(format!("found solution at {} bits", snap.best_score));
        }
        if snap.epoch.is_some() && prev.map_or(true, |p| p.epoch != snap.epoch) {
            return Some(format!("new epoch {}", fmt_epoch(snap.epoch)));
        }
        if snap.errors > before(&|s| s.errors) {
            return Some(format!("ledger error, backing off ({} total)", snap.errors));
        }
        None
    }

    pub fn rate_10s(&self) -> f64 {
        self.window_10s.rate()
    }

    pub fn rate_60s(&self) -> f64 {
        self.window_60s.rate()
    }

    pub fn rate_15m(&self) -> f64 {
        self.window_15m.rate()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Render the panel, overwriting the previous one in place
    /// (`\x1B[{N}A` moves the cursor up N lines, `\x1B[2K` erases a line).
    pub fn print(&mut self) {
        self.print_count += 1;

        let snap = self.last.clone().unwrap_or_else(|| SessionSnapshot {
            state: SessionState::Fetching,
            search_phase: None,
            epoch: None,
            difficulty: 0,
            attempts: 0,
            best_score: 0,
            hits: 0,
            found: 0,
            accepted: 0,
            rejected: 0,
            stale: 0,
            errors: 0,
        });

        let now = Utc::now().format("%H:%M:%S");
        let (_, unit, divisor) = fmt_rate(self.rate_10s());
        let v10 = self.rate_10s() / divisor;
        let v60 = self.rate_60s() / divisor;
        let v15 = self.rate_15m() / divisor;
        let phase = snap
            .search_phase
            .map_or_else(|| "—".to_string(), |p| p.to_string());
        let event = self.last_event.as_deref().unwrap_or("—");

        let mut out = std::io::stdout().lock();
        if self.print_count > 1 {
            let _ = write!(out, "\x1B[{}A", Self::PANEL_LINES);
        }

        let bar = "─".repeat(64);
        let _ = writeln!(out, "\x1B[2K\r{}", format!("┌{}┐", bar).bright_black());
        let _ = writeln!(out, "\x1B[2K\r{}  {}   10s {} {}  60s {}  15m {}",
            "│".bright_black(),
            "SPEED".bright_white().bold(),
            format!("{:.2}", v10).bright_cyan().bold(),
            unit.white(),
            format!("{:.2}", v60).bright_cyan(),
            format!("{:.2}", v15).bright_cyan(),
        );
        let _ = writeln!(out, "\x1B[2K\r{}  {}  F: {}  A: {}  R: {}  S: {}  rate: {}",
            "│".bright_black(),
            "SOLVED".bright_white().bold(),
            snap.found.to_string().bright_cyan(),
            snap.accepted.to_string().bright_green().bold(),
            snap.rejected.to_string().bright_red(),
            snap.stale.to_string().bright_yellow(),
            acceptance_pct(snap.accepted, snap.rejected + snap.stale).bright_white(),
        );
        let _ = writeln!(out, "\x1B[2K\r{}  {}    target: {} bits  best: {} bits  epoch: {}",
            "│".bright_black(),
            "DIFF".bright_white().bold(),
            snap.difficulty.to_string().bright_yellow(),
            snap.best_score.to_string().bright_white(),
            fmt_epoch(snap.epoch).bright_white(),
        );
        let _ = writeln!(out, "\x1B[2K\r{}  {}  {}  attempts: {}  state: {} / {}",
            "│".bright_black(),
            "UPTIME".bright_white().bold(),
            fmt_uptime(self.uptime_seconds()).bright_white(),
            fmt_count(snap.attempts).bright_cyan(),
            snap.state.to_string().bright_magenta(),
            phase.bright_black(),
        );
        let _ = writeln!(out, "\x1B[2K\r{}  {}     threads: {}  strategy: {}  api: {}",
            "│".bright_black(),
            "HW".bright_white().bold(),
            self.threads.to_string().bright_magenta(),
            self.strategy.bright_cyan(),
            self.api.bright_white(),
        );
        let _ = writeln!(out, "\x1B[2K\r{}  {}  [{}] {}",
            "│".bright_black(),
            "EVENT".bright_white().bold(),
            now.to_string().bright_black(),
            event.bright_green(),
        );
        let _ = writeln!(out, "\x1B[2K\r{}", format!("└{}┘", bar).bright_black());

        let _ = out.flush();
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "rate_10s": self.rate_10s(),
            "rate_60s": self.rate_60s(),
            "rate_15m": self.rate_15m(),
            "uptime_sec": self.uptime_seconds(),
            "strategy": &self.strategy,
            "threads": self.threads,
            "api": &self.api,
            "session": &self.last,
        })
    }
}

/// Rate with a unit and the divisor that produced it, so the 60s and 15m
/// columns can share the 10s unit.
pub fn fmt_rate(r: f64) -> (String, &'static str, f64) {
    let (unit, divisor) = if r >= 1e9 {
        ("G/s", 1e9)
    } else if r >= 1e6 {
        ("M/s", 1e6)
    } else if r >= 1e3 {
        ("k/s", 1e3)
    } else {
        ("/s", 1.0)
    };
    let digits = if divisor > 1.0 { 2 } else { 1 };
    (format!("{:.*}", digits, r / divisor), unit, divisor)
}

pub fn fmt_uptime(secs: u64) -> String {
    let d = secs / 86400;
    let h = (secs % 86400) / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if d > 0 {
        format!("{}d {:02}:{:02}:{:02}", d, h, m, s)
    } else {
        format!("{:02}:{:02}:{:02}", h, m, s)
    }
}

pub fn fmt_count(n: u64) -> String {
    if n >= 1_000_000_000 {
        format!("{:.1}G", n as f64 / 1e9)
    } else if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1e6)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1e3)
    } else {
        n.to_string()
    }
}

fn fmt_epoch(epoch: Option<u32>) -> String {
    epoch.map_or_else(|| "—".to_string(), |e| e.to_string())
}

fn acceptance_pct(accepted: u64, refused: u64) -> String {
    let total = accepted + refused;
    if total == 0 {
        return "—".to_string();
    }
    format!("{:.1}%", accepted as f64 / total as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(attempts: u64) -> SessionSnapshot {
        SessionSnapshot {
            state: SessionState::Mining,
            search_phase: None,
            epoch: Some(7),
            difficulty: 20,
            attempts,
            best_score: 0,
            hits: 0,
            found: 0,
            accepted: 0,
            rejected: 0,
            stale: 0,
            errors: 0,
        }
    }

    #[test]
    fn test_rate_window() {
        let mut window = RateWindow::new(10);
        let t0 = Instant::now();
        window.push(t0, 0);
        assert_eq!(window.rate(), 0.0);

        window.push(t0 + Duration::from_secs(1), 100);
        window.push(t0 + Duration::from_secs(2), 100);
        assert!((window.rate() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_rate_window_drops_old_samples() {
        let mut window = RateWindow::new(10);
        let t0 = Instant::now();
        window.push(t0, 0);
        window.push(t0 + Duration::from_secs(1), 1_000_000);
        window.push(t0 + Duration::from_secs(30), 10);
        window.push(t0 + Duration::from_secs(31), 10);
        assert!((window.rate() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_update_feeds_attempt_deltas() {
        let mut stats = MinerStats::new("recompute", "https://testnet.ama.one", 4);
        let t0 = Instant::now();
        stats.update_at(t0, &snapshot(0));
        stats.update_at(t0 + Duration::from_secs(1), &snapshot(500));
        stats.update_at(t0 + Duration::from_secs(2), &snapshot(1_000));
        assert!((stats.rate_10s() - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_events_follow_counters() {
        let mut stats = MinerStats::new("reuse", "api", 1);
        stats.update(&snapshot(0));
        assert_eq!(stats.last_event.as_deref(), Some("new epoch 7"));

        let mut snap = snapshot(10);
        snap.found = 1;
        snap.accepted = 1;
        stats.update(&snap);
        assert!(stats.last_event.as_deref().unwrap_or("").starts_with("accepted 1"));

        snap.rejected = 1;
        stats.update(&snap);
        assert!(stats.last_event.as_deref().unwrap_or("").starts_with("rejected 1"));
    }

    #[test]
    fn test_formatters() {
        assert_eq!(fmt_uptime(59), "00:00:59");
        assert_eq!(fmt_uptime(90_061), "1d 01:01:01");
        assert_eq!(fmt_count(999), "999");
        assert_eq!(fmt_count(12_500), "12.5K");
        assert_eq!(fmt_count(3_000_000), "3.0M");

        let (value, unit, _) = fmt_rate(2_500.0);
        assert_eq!((value.as_str(), unit), ("2.50", "k/s"));
        let (value, unit, _) = fmt_rate(12.0);
        assert_eq!((value.as_str(), unit), ("12.0", "/s"));

        assert_eq!(acceptance_pct(0, 0), "—");
        assert_eq!(acceptance_pct(3, 1), "75.0%");
    }
}
