use std::fmt;

/// The five face buttons of one Buzz controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Red,
    Yellow,
    Green,
    Orange,
    Blue,
}

impl Button {
    #[allow(dead_code)]
    pub const ALL: [Button; 5] = [
        Button::Red,
        Button::Yellow,
        Button::Green,
        Button::Orange,
        Button::Blue,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Button::Red => "red",
            Button::Yellow => "yellow",
            Button::Green => "green",
            Button::Orange => "orange",
            Button::Blue => "blue",
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pressed flags for the buttons of a single controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PadButtons {
    pub red: bool,
    pub yellow: bool,
    pub green: bool,
    pub orange: bool,
    pub blue: bool,
}

impl PadButtons {
    pub fn get(&self, button: Button) -> bool {
        match button {
            Button::Red => self.red,
            Button::Yellow => self.yellow,
            Button::Green => self.green,
            Button::Orange => self.orange,
            Button::Blue => self.blue,
        }
    }

    pub(crate) fn set(&mut self, button: Button, pressed: bool) {
        match button {
            Button::Red => self.red = pressed,
            Button::Yellow => self.yellow = pressed,
            Button::Green => self.green = pressed,
            Button::Orange => self.orange = pressed,
            Button::Blue => self.blue = pressed,
        }
    }
}

/// Button state of all four controllers multiplexed over one receiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuzzState {
    pub pads: [PadButtons; 4],
}

impl BuzzState {
    /// Parse controller state from a raw report.
    ///
    /// The 20 button bits live in bytes 2 to 4, LSB first, five bits per
    /// controller; bits past the end of the report read as released.
    pub fn from_report(report: &[u8]) -> Self {
        let bit = |byte: usize, mask: u8| -> bool {
            report.get(byte).map(|b| b & mask != 0).unwrap_or(false)
        };

        Self {
            pads: [
                PadButtons {
                    red: bit(2, 0x01),
                    yellow: bit(2, 0x02),
                    green: bit(2, 0x04),
                    orange: bit(2, 0x08),
                    blue: bit(2, 0x10),
                },
                PadButtons {
                    red: bit(2, 0x20),
                    yellow: bit(2, 0x40),
                    green: bit(2, 0x80),
                    orange: bit(3, 0x01),
                    blue: bit(3, 0x02),
                },
                PadButtons {
                    red: bit(3, 0x04),
                    yellow: bit(3, 0x08),
                    green: bit(3, 0x10),
                    orange: bit(3, 0x20),
                    blue: bit(3, 0x40),
                },
                PadButtons {
                    red: bit(3, 0x80),
                    yellow: bit(4, 0x01),
                    green: bit(4, 0x02),
                    orange: bit(4, 0x04),
                    blue: bit(4, 0x08),
                },
            ],
        }
    }

    #[allow(dead_code)]
    pub fn pressed(&self, controller: usize, button: Button) -> bool {
        self.pads
            .get(controller)
            .map(|pad| pad.get(button))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::{Button, BuzzState};

    #[test]
    fn pads_span_the_byte_boundaries() {
        // controller 1 straddles bytes 2 and 3, controller 3 bytes 3 and 4
        let state = BuzzState::from_report(&[0, 0, 0x20, 0x81, 0x08]);
        assert!(state.pressed(1, Button::Red));
        assert!(state.pressed(1, Button::Orange));
        assert!(state.pressed(3, Button::Red));
        assert!(state.pressed(3, Button::Blue));
        assert!(!state.pressed(0, Button::Red));
        assert!(!state.pressed(2, Button::Blue));
    }

    #[test]
    fn a_full_first_byte_presses_pad_zero_and_part_of_pad_one() {
        let state = BuzzState::from_report(&[0, 0, 0xFF, 0, 0]);
        assert_eq!(
            state.pads[0],
            super::PadButtons {
                red: true,
                yellow: true,
                green: true,
                orange: true,
                blue: true,
            }
        );
        assert!(state.pressed(1, Button::Red));
        assert!(state.pressed(1, Button::Yellow));
        assert!(state.pressed(1, Button::Green));
        assert!(!state.pressed(1, Button::Orange));
    }

    #[test]
    fn all_zero_report_is_all_released() {
        let state = BuzzState::from_report(&[0u8; 5]);
        assert_eq!(state, BuzzState::default());
    }

    #[test]
    fn short_report_reads_as_released() {
        let state = BuzzState::from_report(&[0xFF, 0xFF]);
        assert_eq!(state, BuzzState::default());
    }
}
