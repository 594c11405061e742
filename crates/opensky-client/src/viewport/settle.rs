// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::{Duration, Instant};

use super::ViewportState;

/// Default quiet period before a moving view counts as settled.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Turns a stream of per-frame view observations into "viewport settled"
/// signals, one per burst of changes.
#[derive(Debug, Clone)]
pub struct SettleDetector {
    delay: Duration,
    last_view: Option<ViewportState>,
    changed_at: Option<Instant>,
    pending: bool,
}

impl Default for SettleDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE_DELAY)
    }
}

impl SettleDetector {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_view: None,
            changed_at: None,
            pending: false,
        }
    }

    /// Record the view as of this frame.
    pub fn observe(&mut self, view: ViewportState, now: Instant) {
        if self.last_view != Some(view) {
            self.last_view = Some(view);
            self.changed_at = Some(now);
            self.pending = true;
        }
    }

    /// Restart the quiet period without a view change, e.g. on resize.
    pub fn touch(&mut self, now: Instant) {
        if self.last_view.is_some() {
            self.changed_at = Some(now);
            self.pending = true;
        }
    }

    /// Fire on the next poll regardless of the quiet period (map-ready).
    pub fn force(&mut self) {
        self.pending = true;
        self.changed_at = None;
    }

    /// Return the settled view once the quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<ViewportState> {
        if !self.pending {
            return None;
        }
        if let Some(changed_at) = self.changed_at {
            if now.saturating_duration_since(changed_at) < self.delay {
                return None;
            }
        }
        self.pending = false;
        self.last_view
    }

    /// Time left until a pending change settles, for repaint scheduling.
    #[must_use]
    pub fn time_until_settle(&self, now: Instant) -> Option<Duration> {
        if !self.pending {
            return None;
        }
        Some(match self.changed_at {
            Some(changed_at) => self.delay.saturating_sub(now.saturating_duration_since(changed_at)),
            None => Duration::ZERO,
        })
    }
}
