// Copyright (C) 2024 Bellande Artificial Intelligence Computer Vision Research Innovation Center, Ronaldson Bellande

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::io::{stderr, Write};
use std::time::{Duration, Instant};

const BAR_WIDTH: usize = 40;

fn mib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// Terminal progress bar for byte transfers. An unknown total (0) renders
/// only the running count.
pub struct ProgressBar {
    total: u64,
    current: u64,
    start_time: Instant,
    last_update: Instant,
    update_frequency: Duration,
}

impl ProgressBar {
    pub fn new(total: u64) -> Self {
        ProgressBar {
            total,
            current: 0,
            start_time: Instant::now(),
            last_update: Instant::now(),
            update_frequency: Duration::from_millis(100),
        }
    }

    pub fn position(&self) -> u64 {
        self.current
    }

    pub fn update(&mut self, amount: u64) {
        self.current += amount;
        let now = Instant::now();
        if now.duration_since(self.last_update) >= self.update_frequency {
            self.render();
            self.last_update = now;
        }
    }

    pub fn finish(&mut self) {
        if self.total > 0 {
            self.current = self.total;
        }
        self.render();
        eprintln!();
    }

    fn render(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 { mib(self.current) / elapsed } else { 0.0 };

        let line = match self.total {
            0 => format!("\r{:.1} MiB ({:.1} MiB/s)", mib(self.current), rate),
            total => {
                let fraction = (self.current as f64 / total as f64).min(1.0);
                let filled = (fraction * BAR_WIDTH as f64) as usize;
                format!(
                    "\r[{:<width$}] {:.1}/{:.1} MiB {:>5.1}% ({:.1} MiB/s)",
                    "#".repeat(filled),
                    mib(self.current),
                    mib(total),
                    fraction * 100.0,
                    rate,
                    width = BAR_WIDTH
                )
            }
        };

        let mut err = stderr();
        // best-effort output
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_position_and_completes_known_totals() {
        let mut bar = ProgressBar::new(1024);
        bar.update(100);
        bar.update(24);
        assert_eq!(bar.position(), 124);

        bar.finish();
        assert_eq!(bar.position(), 1024);
    }

    #[test]
    fn unknown_total_keeps_count() {
        let mut bar = ProgressBar::new(0);
        bar.update(7);
        bar.finish();
        assert_eq!(bar.position(), 7);
    }
}
