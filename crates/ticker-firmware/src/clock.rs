//! Embassy-backed millisecond clock

use embassy_time::Instant;
use ticker_core::time::Clock;

#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }
}
