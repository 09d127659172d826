use std::sync::Mutex;

use chrono::Utc;
use once_cell::sync::Lazy;

/// Sortable process-local id: millisecond timestamp in the high bits, a
/// per-millisecond sequence in the low 12. Rows carry explicit ids so inserts
/// stay portable across backends that disagree about RETURNING.
pub struct IdGenerator {
    state: Mutex<(i64, i64)>,
}

impl IdGenerator {
    fn new() -> Self {
        Self {
            state: Mutex::new((0, 0)),
        }
    }

    pub fn generate_id(&self) -> i64 {
        let mut state = self.state.lock().unwrap();
        let mut now = Utc::now().timestamp_millis();
        if now <= state.0 {
            if state.1 < 0xfff {
                state.1 += 1;
                return (state.0 << 12) | state.1;
            }
            // Sequence exhausted for this millisecond; wait the clock out.
            while now <= state.0 {
                now = Utc::now().timestamp_millis();
            }
        }
        *state = (now, 0);
        now << 12
    }
}

pub static ID_GENERATOR: Lazy<IdGenerator> = Lazy::new(IdGenerator::new);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let generator = IdGenerator::new();
        let mut last = 0;
        for _ in 0..4096 {
            let id = generator.generate_id();
            assert!(id > last);
            last = id;
        }
    }
}
