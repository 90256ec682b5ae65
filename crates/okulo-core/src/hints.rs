//! Rate-limited guidance hints.
//!
//! Spoken/visual hints are fire-and-forget toward the presentation layer; the
//! limiter keeps the engine from spamming them during continuous minor drift.
//! Each hint kind has its own cooldown clock.

use std::collections::HashMap;

use crate::domain::{dt_us, EngineEvent, HintKind};

#[derive(Debug, Clone)]
pub struct HintLimiter {
    cooldown_us: u64,
    last_emit_us: HashMap<HintKind, i64>,
}

impl HintLimiter {
    pub fn new(cooldown_us: u64) -> Self {
        Self {
            cooldown_us,
            last_emit_us: HashMap::new(),
        }
    }

    /// Build a hint event if this kind's cooldown has elapsed.
    pub fn request(&mut self, now_us: i64, kind: HintKind, message: &str) -> Option<EngineEvent> {
        if let Some(&last) = self.last_emit_us.get(&kind) {
            if dt_us(now_us, last) < self.cooldown_us {
                return None;
            }
        }
        self.last_emit_us.insert(kind, now_us);
        Some(EngineEvent::Hint {
            kind,
            message: message.to_string(),
        })
    }

    pub fn reset(&mut self) {
        self.last_emit_us.clear();
    }
}
