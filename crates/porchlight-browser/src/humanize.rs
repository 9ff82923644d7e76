//! Human-paced input gestures.
//!
//! Sites fingerprint automation by its regularity: constant keystroke
//! intervals, fixed scroll increments, zero hesitation. Every gesture here
//! draws its timing and distances from bounded random ranges instead.

use crate::driver::PageDriver;
use crate::error::Result;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Timing profile for human-paced gestures.
///
/// All ranges are inclusive milliseconds / pixels. [`Pace::instant`] zeroes
/// every delay so tests run at full speed without changing control flow.
#[derive(Debug, Clone)]
pub struct Pace {
    /// Delay between individual keystrokes
    pub type_delay_ms: (u64, u64),
    /// Pause between filling separate form fields
    pub field_pause_ms: (u64, u64),
    /// Probability of scrolling up briefly before scrolling down
    pub up_scroll_chance: f64,
    /// Size of the occasional upward scroll
    pub up_scroll_px: (i64, i64),
    /// Pause after the upward scroll
    pub up_scroll_pause_ms: (u64, u64),
    /// Size of the main downward scroll
    pub scroll_px: (i64, i64),
    /// Probability of pausing mid-scroll as if reading
    pub mid_pause_chance: f64,
    /// Length of the mid-scroll reading pause
    pub mid_pause_ms: (u64, u64),
    /// Settle time after each scroll iteration
    pub settle_ms: (u64, u64),
}

impl Default for Pace {
    fn default() -> Self {
        Self {
            type_delay_ms: (100, 300),
            field_pause_ms: (1000, 2000),
            up_scroll_chance: 0.15,
            up_scroll_px: (100, 400),
            up_scroll_pause_ms: (500, 1500),
            scroll_px: (200, 1500),
            mid_pause_chance: 0.2,
            mid_pause_ms: (1000, 3000),
            settle_ms: (2000, 7000),
        }
    }
}

impl Pace {
    /// A pace with every delay and hesitation removed, for tests.
    #[must_use]
    pub fn instant() -> Self {
        Self {
            type_delay_ms: (0, 0),
            field_pause_ms: (0, 0),
            up_scroll_chance: 0.0,
            up_scroll_px: (0, 0),
            up_scroll_pause_ms: (0, 0),
            scroll_px: (100, 100),
            mid_pause_chance: 0.0,
            mid_pause_ms: (0, 0),
            settle_ms: (0, 0),
        }
    }
}

/// Draw a duration uniformly from an inclusive millisecond range.
///
/// The RNG is scoped so it is never held across an await point.
fn jitter(range: (u64, u64)) -> Duration {
    let ms = {
        let mut rng = rand::thread_rng();
        rng.gen_range(range.0..=range.1)
    };
    Duration::from_millis(ms)
}

fn pixels(range: (i64, i64)) -> i64 {
    let mut rng = rand::thread_rng();
    rng.gen_range(range.0..=range.1)
}

fn chance(p: f64) -> bool {
    if p <= 0.0 {
        return false;
    }
    let mut rng = rand::thread_rng();
    rng.gen_bool(p)
}

/// Clear a field and type into it one character at a time.
pub async fn type_like_human(
    driver: &dyn PageDriver,
    selector: &str,
    text: &str,
    pace: &Pace,
) -> Result<()> {
    driver.clear(selector).await?;
    let mut buf = [0u8; 4];
    for ch in text.chars() {
        driver.type_text(selector, ch.encode_utf8(&mut buf)).await?;
        sleep(jitter(pace.type_delay_ms)).await;
    }
    Ok(())
}

/// Pause as a person would between form fields.
pub async fn field_pause(pace: &Pace) {
    sleep(jitter(pace.field_pause_ms)).await;
}

/// Read the current page extent.
pub async fn page_height(driver: &dyn PageDriver) -> Result<i64> {
    let value = driver.execute("document.body.scrollHeight").await?;
    Ok(value.as_i64().unwrap_or(0))
}

/// One human-like scroll step: maybe glance up, scroll a variable distance
/// down, maybe pause to read, then settle.
pub async fn human_scroll(driver: &dyn PageDriver, pace: &Pace) -> Result<()> {
    if chance(pace.up_scroll_chance) {
        let up = pixels(pace.up_scroll_px);
        driver
            .execute(&format!("window.scrollBy(0, -{up});"))
            .await?;
        sleep(jitter(pace.up_scroll_pause_ms)).await;
    }

    let down = pixels(pace.scroll_px);
    driver
        .execute(&format!("window.scrollBy(0, {down});"))
        .await?;

    if chance(pace.mid_pause_chance) {
        sleep(jitter(pace.mid_pause_ms)).await;
    }

    sleep(jitter(pace.settle_ms)).await;
    Ok(())
}

/// Bounded attempts to shake loose more content when the page extent has
/// stopped growing: jump to the bottom, force a large scroll, then jiggle
/// up and down. Returns the final observed page height.
pub async fn forced_scroll_recovery(
    driver: &dyn PageDriver,
    pace: &Pace,
    stalled_height: i64,
) -> Result<i64> {
    const ATTEMPTS: u32 = 3;

    let mut height = stalled_height;
    for attempt in 1..=ATTEMPTS {
        tracing::debug!(attempt, "forcing scroll to trigger content load");

        driver
            .execute("window.scrollTo(0, document.body.scrollHeight);")
            .await?;
        sleep(jitter(pace.settle_ms)).await;

        driver.execute("window.scrollBy(0, 2000);").await?;
        sleep(jitter(pace.settle_ms)).await;

        let loaded = page_height(driver).await?;
        if loaded > height {
            tracing::debug!(from = height, to = loaded, "forced scroll loaded content");
            return Ok(loaded);
        }

        // Up-then-down jiggle sometimes wakes lazy loaders
        driver.execute("window.scrollBy(0, -500);").await?;
        sleep(jitter(pace.up_scroll_pause_ms)).await;
        driver.execute("window.scrollBy(0, 1000);").await?;
        sleep(jitter(pace.settle_ms)).await;

        let retried = page_height(driver).await?;
        if retried > height {
            tracing::debug!(from = height, to = retried, "jiggle scroll loaded content");
            return Ok(retried);
        }
        height = retried;
    }

    Ok(height)
}
