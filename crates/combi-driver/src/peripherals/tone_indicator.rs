//! Tone indicator, driven through the device beeper.
//!
//! The beeper has no pitch or volume control; a tone is the time the
//! beeper stays on. Dropping a running [`ToneIndicator::sound`] future stops
//! the sound; a beeper left on is switched off.

use std::sync::Arc;
use std::time::Duration;

use combi_core::PeripheralKind;
use combi_protocol::Command;
use serde::{Deserialize, Serialize};

use crate::driver::Driver;
use crate::error::{DriverError, Result};
use crate::peripherals::{Peripheral, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tone {
    /// Time the beeper stays on. Zero skips the tone.
    #[serde(with = "millis")]
    pub duration: Duration,
}

impl Tone {
    pub const fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub const fn silent() -> Self {
        Self {
            duration: Duration::ZERO,
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Number of sound cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Times(u32),

    /// Until the sound future is dropped.
    Forever,
}

impl From<u32> for Repeat {
    fn from(count: u32) -> Self {
        Self::Times(count)
    }
}

/// Switches the beeper off if dropped while it is on.
struct BeeperGuard<'a> {
    driver: &'a Driver,
    on: bool,
}

impl Drop for BeeperGuard<'_> {
    fn drop(&mut self) {
        if self.on {
            // Offline or closed devices reject the command; nothing to undo.
            let _ = self.driver.post(Command::BeepOff);
        }
    }
}

#[derive(Debug)]
pub struct ToneIndicator {
    session: Session,
}

impl ToneIndicator {
    pub fn new(driver: Arc<Driver>) -> Self {
        Self {
            session: Session::new(driver, PeripheralKind::ToneIndicator),
        }
    }

    /// Play `count` cycles of `tone1`, `inter_tone_wait`, `tone2`, `delay`.
    ///
    /// Does nothing when both tones are silent. With [`Repeat::Forever`] the
    /// sound runs until the future is dropped, e.g. by `tokio::select!` or
    /// a timeout.
    ///
    /// # Errors
    ///
    /// Fails for zero repetitions, when not enabled, or when the device goes
    /// away while sounding.
    pub async fn sound(
        &self,
        tone1: Tone,
        tone2: Tone,
        inter_tone_wait: Duration,
        delay: Duration,
        count: Repeat,
    ) -> Result<()> {
        self.session.ensure_enabled()?;
        let mut remaining = match count {
            Repeat::Times(0) => {
                return Err(DriverError::invalid_argument("Tone count must be positive"));
            }
            Repeat::Times(n) => Some(n),
            Repeat::Forever => None,
        };
        if tone1.duration.is_zero() && tone2.duration.is_zero() {
            return Ok(());
        }
        while remaining != Some(0) {
            self.sound_and_wait(tone1, inter_tone_wait).await?;
            self.sound_and_wait(tone2, delay).await?;
            if let Some(n) = remaining.as_mut() {
                *n -= 1;
            }
        }
        Ok(())
    }

    async fn sound_and_wait(&self, tone: Tone, wait: Duration) -> Result<()> {
        if !tone.duration.is_zero() {
            let driver = self.session.driver();
            let mut beeper = BeeperGuard { driver, on: true };
            driver.execute(Command::BeepOn).await?;
            tokio::time::sleep(tone.duration).await;
            driver.execute(Command::BeepOff).await?;
            beeper.on = false;
        }
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }
}

impl Peripheral for ToneIndicator {
    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use combi_transport::MockTransport;

    #[tokio::test(start_paused = true)]
    async fn test_sound_cycles() {
        let (transport, handle) = MockTransport::new();
        let driver = Arc::new(Driver::with_transport(DriverConfig::new("mock"), transport));
        let mut tone = ToneIndicator::new(driver);
        tone.open().await.unwrap();
        tone.claim().await.unwrap();
        tone.set_enabled(true).await.unwrap();

        let short = Tone::new(Duration::from_millis(100));
        tone.sound(
            short,
            Tone::silent(),
            Duration::from_millis(50),
            Duration::ZERO,
            Repeat::Times(2),
        )
        .await
        .unwrap();
        assert_eq!(
            handle.commands(),
            vec![b"B1".to_vec(), b"B0".to_vec(), b"B1".to_vec(), b"B0".to_vec()]
        );

        assert!(matches!(
            tone.sound(short, short, Duration::ZERO, Duration::ZERO, Repeat::Times(0))
                .await,
            Err(DriverError::InvalidArgument(_))
        ));
        tone.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_endless_sound_stops_with_beeper_off() {
        let (transport, handle) = MockTransport::new();
        let driver = Arc::new(Driver::with_transport(DriverConfig::new("mock"), transport));
        let mut tone = ToneIndicator::new(driver);
        tone.open().await.unwrap();
        tone.claim().await.unwrap();
        tone.set_enabled(true).await.unwrap();

        // Dropped in the middle of a tone.
        let long = Tone::new(Duration::from_millis(400));
        let sounding = tone.sound(
            long,
            Tone::silent(),
            Duration::ZERO,
            Duration::from_millis(100),
            Repeat::Forever,
        );
        let result = tokio::time::timeout(Duration::from_millis(1200), sounding).await;
        assert!(result.is_err());
        tokio::time::sleep(Duration::from_millis(500)).await;

        let beeps = handle.commands();
        let on = beeps.iter().filter(|c| c.as_slice() == b"B1").count();
        assert!(on >= 2, "{:?}", beeps);
        assert_eq!(beeps.last().unwrap(), b"B0");
        tone.close().await.unwrap();
    }
}
