/// Standard pad buttons, in the order the shift register reports them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Button {
    A = 0x01,
    B = 0x02,
    Select = 0x04,
    Start = 0x08,
    Up = 0x10,
    Down = 0x20,
    Left = 0x40,
    Right = 0x80,
}

impl Button {
    pub const ALL: [Button; 8] = [
        Button::A,
        Button::B,
        Button::Select,
        Button::Start,
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
    ];

    #[inline]
    pub const fn mask(self) -> u8 {
        self as u8
    }
}

/// Two standard pads behind `$4016`/`$4017`.
///
/// The host sets live button state at any time; the game only sees it after
/// strobing `$4016` bit 0 high then low, which latches both pads into their
/// shift registers.
#[derive(Debug, Default, Clone)]
pub struct Controller {
    strobe: bool,
    state: [u8; 2],
    shift: [u8; 2],
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    /// `player` is 1 or 2; anything else is ignored.
    pub fn set_button(&mut self, player: u8, button: Button, pressed: bool) {
        let Some(state) = Self::slot(player).map(|i| &mut self.state[i]) else {
            return;
        };
        if pressed {
            *state |= button.mask();
        } else {
            *state &= !button.mask();
        }
    }

    /// Replace a pad's whole button byte.
    pub fn set_state(&mut self, player: u8, buttons: u8) {
        if let Some(i) = Self::slot(player) {
            self.state[i] = buttons;
        }
    }

    pub fn state(&self, player: u8) -> u8 {
        Self::slot(player).map_or(0, |i| self.state[i])
    }

    fn slot(player: u8) -> Option<usize> {
        match player {
            1 => Some(0),
            2 => Some(1),
            _ => None,
        }
    }

    /// Serial read; only bit 0 carries data.
    pub fn read(&mut self, addr: u16) -> u8 {
        let i = match addr {
            0x4016 => 0,
            0x4017 => 1,
            _ => return 0,
        };
        let bit = self.shift[i] & 0x01;
        self.shift[i] >>= 1;
        bit
    }

    pub fn write(&mut self, addr: u16, data: u8) {
        if addr != 0x4016 {
            return;
        }
        if data & 0x01 != 0 {
            self.strobe = true;
        } else if self.strobe {
            self.strobe = false;
            self.shift = self.state;
        }
    }
}
