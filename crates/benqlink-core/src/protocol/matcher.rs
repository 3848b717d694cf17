//! Response matchers
//!
//! The projector echoes no request identifier, so a response is recognised
//! purely by its shape. A [`Matcher`] describes the shape expected for one
//! kind of command; one instance is shared by every command of that kind
//! (every aspect-ratio write expects `*ASP=<token>#`, whatever token was
//! requested).

use regex::Regex;
use std::sync::LazyLock;

use super::ProtocolError;
use crate::device::{AspectRatio, DeviceChange, PictureMode, SourceType};

static POWER_STATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*POW=(ON|OFF)#").expect("valid power pattern"));
static ASPECT_RATIO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\*ASP=(4:3|16:9|16:10|AUTO|REAL|LBOX|WIDE|ANAM)#").expect("valid aspect pattern")
});
static CURRENT_SOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\*SOUR=(RGB|RGB2|YPBR|DVIA|DVID|HDMI|HDMI2|VID|SVID|NETWORK|USBDISPLAY|USBREADER)#")
        .expect("valid source pattern")
});
static PICTURE_MODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*APPMOD=(DYNAMIC|PRESET|SRGB|BRIGHT|LIVINGROOM|GAME|CINE|STD|USER1|USER2|USER3)#")
        .expect("valid picture mode pattern")
});
static LAMP_HOURS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*LTIM=(\d+)#").expect("valid lamp hours pattern"));

/// The kinds of response the projector produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    /// `*POW=ON#` or `*POW=OFF#`
    PowerState,
    /// `*ASP=<token>#`
    AspectRatio,
    /// `*SOUR=<token>#`
    CurrentSource,
    /// `*APPMOD=<token>#`
    PictureMode,
    /// `*LTIM=<digits>#`
    LampHours,
}

impl ResponseKind {
    /// Mutually exclusive shapes, in priority order. The first one that
    /// matches a response decides it.
    pub const EXCLUSIVE: [ResponseKind; 4] = [
        ResponseKind::PowerState,
        ResponseKind::AspectRatio,
        ResponseKind::CurrentSource,
        ResponseKind::PictureMode,
    ];

    fn pattern(&self) -> &'static Regex {
        match self {
            ResponseKind::PowerState => &*POWER_STATE,
            ResponseKind::AspectRatio => &*ASPECT_RATIO,
            ResponseKind::CurrentSource => &*CURRENT_SOURCE,
            ResponseKind::PictureMode => &*PICTURE_MODE,
            ResponseKind::LampHours => &*LAMP_HOURS,
        }
    }

    /// Check whether `raw` has this response's shape
    pub fn is_match(&self, raw: &str) -> bool {
        self.pattern().is_match(raw)
    }

    /// Decode the captured value into a state change.
    ///
    /// `Ok(None)` means the response does not have this shape.
    pub fn decode(&self, raw: &str) -> Result<Option<DeviceChange>, ProtocolError> {
        let Some(captures) = self.pattern().captures(raw) else {
            return Ok(None);
        };
        let token = captures.get(1).map(|m| m.as_str()).unwrap_or_default();

        let change = match self {
            ResponseKind::PowerState => DeviceChange::PowerState(token == "ON"),
            ResponseKind::AspectRatio => DeviceChange::AspectRatio(token.parse::<AspectRatio>()?),
            ResponseKind::CurrentSource => {
                DeviceChange::CurrentSource(token.parse::<SourceType>()?)
            }
            ResponseKind::PictureMode => DeviceChange::PictureMode(token.parse::<PictureMode>()?),
            ResponseKind::LampHours => {
                let hours = token.parse::<u32>().map_err(|e| {
                    ProtocolError::InvalidResponse(format!("lamp hours '{}': {}", token, e))
                })?;
                DeviceChange::LampHours(hours)
            }
        };
        Ok(Some(change))
    }
}

/// Predicate deciding whether an incoming message answers a pending command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Any response with the given shape
    Response(ResponseKind),
    /// Exactly this message (for links that echo a request identifier)
    Exact(String),
}

impl Matcher {
    /// Check whether `raw` answers the command this matcher belongs to
    pub fn is_match(&self, raw: &str) -> bool {
        match self {
            Matcher::Response(kind) => kind.is_match(raw),
            Matcher::Exact(expected) => expected == raw,
        }
    }
}

impl From<ResponseKind> for Matcher {
    fn from(kind: ResponseKind) -> Self {
        Matcher::Response(kind)
    }
}

/// Decode every state change carried by a response.
///
/// The exclusive shapes are tried in priority order and the first match
/// wins. Lamp hours is checked on its own afterwards, whatever else matched.
pub fn decode_response(raw: &str) -> Result<Vec<DeviceChange>, ProtocolError> {
    let mut changes = Vec::with_capacity(1);

    for kind in ResponseKind::EXCLUSIVE {
        if let Some(change) = kind.decode(raw)? {
            changes.push(change);
            break;
        }
    }

    if let Some(change) = ResponseKind::LampHours.decode(raw)? {
        changes.push(change);
    }

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_shapes() {
        assert!(ResponseKind::PowerState.is_match("*POW=ON#"));
        assert!(ResponseKind::PowerState.is_match("*POW=OFF#"));
        assert!(!ResponseKind::PowerState.is_match("*POW=?#"));
        assert!(!ResponseKind::PowerState.is_match(" *POW=ON#"));
    }

    #[test]
    fn test_decode_each_kind() {
        assert_eq!(
            decode_response("*POW=OFF#").unwrap(),
            vec![DeviceChange::PowerState(false)]
        );
        assert_eq!(
            decode_response("*ASP=16:10#").unwrap(),
            vec![DeviceChange::AspectRatio(AspectRatio::SixteenTen)]
        );
        assert_eq!(
            decode_response("*SOUR=HDMI2#").unwrap(),
            vec![DeviceChange::CurrentSource(SourceType::Hdmi2)]
        );
        assert_eq!(
            decode_response("*APPMOD=USER3#").unwrap(),
            vec![DeviceChange::PictureMode(PictureMode::User3)]
        );
        assert_eq!(
            decode_response("*LTIM=1534#").unwrap(),
            vec![DeviceChange::LampHours(1534)]
        );
    }

    #[test]
    fn test_alternation_takes_longest_token() {
        // RGB must not shadow RGB2, HDMI must not shadow HDMI2
        assert_eq!(
            decode_response("*SOUR=RGB2#").unwrap(),
            vec![DeviceChange::CurrentSource(SourceType::Rgb2)]
        );
    }

    #[test]
    fn test_unrelated_and_sentinel_decode_to_nothing() {
        assert!(decode_response("*Block item#").unwrap().is_empty());
        assert!(decode_response("*ASP=SQUARE#").unwrap().is_empty());
        assert!(decode_response("").unwrap().is_empty());
    }

    #[test]
    fn test_lamp_hours_overflow_is_invalid() {
        let err = decode_response("*LTIM=99999999999#").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidResponse(_)));
    }

    #[test]
    fn test_exact_matcher() {
        let m = Matcher::Exact("*ID=7#".to_string());
        assert!(m.is_match("*ID=7#"));
        assert!(!m.is_match("*ID=8#"));
        assert!(Matcher::from(ResponseKind::LampHours).is_match("*LTIM=0#"));
    }
}
