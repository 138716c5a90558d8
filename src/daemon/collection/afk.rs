/// Title of away records caused by idling past the threshold.
pub const AFK_TITLE: &str = "USER_AFK";

/// Title of away records taken while the screen is locked.
pub const AFK_LOCKED_TITLE: &str = "USER_AFK_LOCKED";

pub struct AfkEvaluator {
    threshold_ms: u32,
}

impl AfkEvaluator {
    pub fn from_seconds(threshold_s: u32) -> Self {
        Self {
            threshold_ms: threshold_s.saturating_mul(1000),
        }
    }

    pub fn is_afk(&self, idle_time: u32) -> bool {
        self.threshold_ms < idle_time
    }
}
