use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Remote-control key codes understood by the TV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Num0,
    Num1,
    Num2,
    Num3,
    Num4,
    Num5,
    Num6,
    Num7,
    Num8,
    Num9,
    Power,
    Source,
    /// The dash/minus button.
    Plus100,
    PreviousChannel,
    VolumeUp,
    VolumeDown,
    Mute,
    ChannelList,
    ChannelDown,
    ChannelUp,
    Home,
    Guide,
    Left,
    Up,
    Right,
    Down,
    Enter,
    Return,
    Exit,
    /// The settings button.
    Menu,
    Info,
    /// The CC/VD button.
    Subtitle,
    Stop,
    Rewind,
    FastForward,
    Play,
    Pause,
    Red,
    Green,
    Yellow,
    Cyan,
}

impl Key {
    pub const ALL: [Key; 41] = [
        Key::Num0,
        Key::Num1,
        Key::Num2,
        Key::Num3,
        Key::Num4,
        Key::Num5,
        Key::Num6,
        Key::Num7,
        Key::Num8,
        Key::Num9,
        Key::Power,
        Key::Source,
        Key::Plus100,
        Key::PreviousChannel,
        Key::VolumeUp,
        Key::VolumeDown,
        Key::Mute,
        Key::ChannelList,
        Key::ChannelDown,
        Key::ChannelUp,
        Key::Home,
        Key::Guide,
        Key::Left,
        Key::Up,
        Key::Right,
        Key::Down,
        Key::Enter,
        Key::Return,
        Key::Exit,
        Key::Menu,
        Key::Info,
        Key::Subtitle,
        Key::Stop,
        Key::Rewind,
        Key::FastForward,
        Key::Play,
        Key::Pause,
        Key::Red,
        Key::Green,
        Key::Yellow,
        Key::Cyan,
    ];

    /// Wire code sent as `DataOfCmd`.
    pub fn code(self) -> &'static str {
        match self {
            Key::Num0 => "KEY_0",
            Key::Num1 => "KEY_1",
            Key::Num2 => "KEY_2",
            Key::Num3 => "KEY_3",
            Key::Num4 => "KEY_4",
            Key::Num5 => "KEY_5",
            Key::Num6 => "KEY_6",
            Key::Num7 => "KEY_7",
            Key::Num8 => "KEY_8",
            Key::Num9 => "KEY_9",
            Key::Power => "KEY_POWER",
            Key::Source => "KEY_SOURCE",
            Key::Plus100 => "KEY_PLUS100",
            Key::PreviousChannel => "KEY_PRECH",
            Key::VolumeUp => "KEY_VOLUP",
            Key::VolumeDown => "KEY_VOLDOWN",
            Key::Mute => "KEY_MUTE",
            Key::ChannelList => "KEY_CH_LIST",
            Key::ChannelDown => "KEY_CHDOWN",
            Key::ChannelUp => "KEY_CHUP",
            Key::Home => "KEY_HOME",
            Key::Guide => "KEY_GUIDE",
            Key::Left => "KEY_LEFT",
            Key::Up => "KEY_UP",
            Key::Right => "KEY_RIGHT",
            Key::Down => "KEY_DOWN",
            Key::Enter => "KEY_ENTER",
            Key::Return => "KEY_RETURN",
            Key::Exit => "KEY_EXIT",
            Key::Menu => "KEY_MENU",
            Key::Info => "KEY_INFO",
            Key::Subtitle => "KEY_SUB_TITLE",
            Key::Stop => "KEY_STOP",
            Key::Rewind => "KEY_REWIND",
            Key::FastForward => "KEY_FF",
            Key::Play => "KEY_PLAY",
            Key::Pause => "KEY_PAUSE",
            Key::Red => "KEY_RED",
            Key::Green => "KEY_GREEN",
            Key::Yellow => "KEY_YELLOW",
            Key::Cyan => "KEY_CYAN",
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown key code: {0}")]
pub struct UnknownKey(pub String);

impl FromStr for Key {
    type Err = UnknownKey;

    /// Accepts the wire code with or without the `KEY_` prefix, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let code = if upper.starts_with("KEY_") {
            upper
        } else {
            format!("KEY_{}", upper)
        };
        Key::ALL
            .into_iter()
            .find(|key| key.code() == code)
            .ok_or_else(|| UnknownKey(s.to_string()))
    }
}
