//! Named value tables
//!
//! The projector reports aspect ratio, input source and picture mode as
//! tokens. Each token maps to a fixed index; index 0 is the `n/a`
//! placeholder used before the projector has reported anything.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::protocol::ProtocolError;

macro_rules! name_table {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal {
            $( $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        pub enum $name {
            /// No value reported yet (`n/a`)
            #[default]
            Unknown,
            $(
                #[doc = concat!("`", $wire, "`")]
                $variant,
            )+
        }

        impl $name {
            /// Every entry in table order, starting with the `n/a` placeholder
            pub const ALL: &'static [$name] = &[$name::Unknown, $($name::$variant),+];

            /// Position in the name table
            pub fn index(&self) -> usize {
                *self as usize
            }

            /// Look up an entry by table position
            pub fn from_index(index: usize) -> Option<Self> {
                Self::ALL.get(index).copied()
            }

            /// Token used on the wire (`n/a` for the placeholder)
            pub fn wire_name(&self) -> &'static str {
                match self {
                    $name::Unknown => "n/a",
                    $($name::$variant => $wire,)+
                }
            }

            /// Look up an entry by its wire token
            pub fn from_wire(token: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|v| v.wire_name() == token)
            }

            /// True for the `n/a` placeholder
            pub fn is_unknown(&self) -> bool {
                matches!(self, $name::Unknown)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.wire_name())
            }
        }

        impl FromStr for $name {
            type Err = ProtocolError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_wire(s).ok_or_else(|| {
                    ProtocolError::InvalidValue(format!("unknown {}: {}", $label, s))
                })
            }
        }
    };
}

name_table! {
    /// Aspect ratio reported by `*ASP=...#`
    AspectRatio, "aspect ratio" {
        FourThree => "4:3",
        SixteenNine => "16:9",
        SixteenTen => "16:10",
        Auto => "AUTO",
        Real => "REAL",
        Letterbox => "LBOX",
        Wide => "WIDE",
        Anamorphic => "ANAM",
    }
}

name_table! {
    /// Input source reported by `*SOUR=...#`
    SourceType, "source" {
        Rgb => "RGB",
        Rgb2 => "RGB2",
        Ypbr => "YPBR",
        DviA => "DVIA",
        DviD => "DVID",
        Hdmi => "HDMI",
        Hdmi2 => "HDMI2",
        Video => "VID",
        SVideo => "SVID",
        Network => "NETWORK",
        UsbDisplay => "USBDISPLAY",
        UsbReader => "USBREADER",
    }
}

name_table! {
    /// Picture mode reported by `*APPMOD=...#`
    PictureMode, "picture mode" {
        Dynamic => "DYNAMIC",
        Preset => "PRESET",
        Srgb => "SRGB",
        Bright => "BRIGHT",
        LivingRoom => "LIVINGROOM",
        Game => "GAME",
        Cinema => "CINE",
        Standard => "STD",
        User1 => "USER1",
        User2 => "USER2",
        User3 => "USER3",
    }
}
