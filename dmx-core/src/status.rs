/// Status indicator contract. The blink timing itself lives in the firmware.
use serde::Serialize;

/// Colour codes for the status LED, format 0xRRGGBB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedColor(pub u32);

impl LedColor {
    pub const OFF: LedColor = LedColor(0x000000);
    /// Initial boot, restart pending
    pub const RED: LedColor = LedColor(0x660000);
    /// Wifi lost
    pub const ORANGE: LedColor = LedColor(0x553300);
    /// Setting up wifi, writing firmware
    pub const YELLOW: LedColor = LedColor(0x666600);
    /// Connected, ready for DMX
    pub const PINK: LedColor = LedColor(0x660066);
    /// Observing DMX for another universe
    pub const CYAN: LedColor = LedColor(0x006666);
    /// Receiving and transmitting DMX
    pub const GREEN: LedColor = LedColor(0x006600);
    /// Processing a web request
    pub const BLUE: LedColor = LedColor(0x000066);
    /// No config found, running on defaults
    pub const WHITE: LedColor = LedColor(0x666666);

    pub fn is_off(self) -> bool {
        self.0 == 0
    }

    pub fn rgb(self) -> (u8, u8, u8) {
        ((self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8)
    }
}

pub trait StatusSignal {
    /// `blink_interval_ms == 0` means solid.
    fn set_state(&mut self, color: LedColor, blink_interval_ms: u32);
}

/// Points in the update flow the indicator is told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSignal {
    /// Device is up and serving; also where a finished check returns to.
    Idle,
    CheckStarted,
    WriteStarted,
    Failed,
    SucceededRestarting,
}

impl UpdateSignal {
    pub fn led_state(self) -> (LedColor, u32) {
        match self {
            UpdateSignal::Idle => (LedColor::GREEN, 0),
            UpdateSignal::CheckStarted => (LedColor::BLUE, 250),
            UpdateSignal::WriteStarted => (LedColor::YELLOW, 100),
            UpdateSignal::Failed => (LedColor::RED, 100),
            UpdateSignal::SucceededRestarting => (LedColor::RED, 0),
        }
    }

    pub fn apply<S: StatusSignal + ?Sized>(self, status: &mut S) {
        let (color, interval) = self.led_state();
        status.set_state(color, interval);
    }
}
