//! Protocol commands
//!
//! Defines the commands the projector understands and the response each one
//! is expected to produce.

use serde::{Deserialize, Serialize};

use super::{Matcher, ProtocolError, ResponseKind};
use crate::device::{AspectRatio, PictureMode, SourceType};

const POWER_STATE_QUERY: &str = "*POW=?#";
const POWER_STATE_ON: &str = "*POW=ON#";
const POWER_STATE_OFF: &str = "*POW=OFF#";
const ASPECT_RATIO_QUERY: &str = "*ASP=?#";
const CURRENT_SOURCE_QUERY: &str = "*SOUR=?#";
const PICTURE_MODE_QUERY: &str = "*APPMOD=?#";
const LAMP_HOURS_QUERY: &str = "*LTIM=?#";

/// Semantic projector commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Query power state (`*POW=?#`)
    QueryPowerState,

    /// Switch the lamp on or off
    SetPowerState(bool),

    /// Query aspect ratio (`*ASP=?#`)
    QueryAspectRatio,

    /// Select an aspect ratio
    SetAspectRatio(AspectRatio),

    /// Query input source (`*SOUR=?#`)
    QueryCurrentSource,

    /// Select an input source
    SetCurrentSource(SourceType),

    /// Query picture mode (`*APPMOD=?#`)
    QueryPictureMode,

    /// Select a picture mode
    SetPictureMode(PictureMode),

    /// Query lamp hours (`*LTIM=?#`)
    QueryLampHours,
}

impl Command {
    /// Build the wire text for this command.
    ///
    /// Writes use the query template with `?` replaced by the value token.
    /// The `n/a` placeholder cannot be written.
    pub fn wire_text(&self) -> Result<String, ProtocolError> {
        let text = match self {
            Command::QueryPowerState => POWER_STATE_QUERY.to_string(),
            Command::SetPowerState(true) => POWER_STATE_ON.to_string(),
            Command::SetPowerState(false) => POWER_STATE_OFF.to_string(),
            Command::QueryAspectRatio => ASPECT_RATIO_QUERY.to_string(),
            Command::SetAspectRatio(v) => fill(ASPECT_RATIO_QUERY, v.wire_name(), v.is_unknown())?,
            Command::QueryCurrentSource => CURRENT_SOURCE_QUERY.to_string(),
            Command::SetCurrentSource(v) => {
                fill(CURRENT_SOURCE_QUERY, v.wire_name(), v.is_unknown())?
            }
            Command::QueryPictureMode => PICTURE_MODE_QUERY.to_string(),
            Command::SetPictureMode(v) => fill(PICTURE_MODE_QUERY, v.wire_name(), v.is_unknown())?,
            Command::QueryLampHours => LAMP_HOURS_QUERY.to_string(),
        };
        Ok(text)
    }

    /// The response kind this command produces
    pub fn response_kind(&self) -> ResponseKind {
        match self {
            Command::QueryPowerState | Command::SetPowerState(_) => ResponseKind::PowerState,
            Command::QueryAspectRatio | Command::SetAspectRatio(_) => ResponseKind::AspectRatio,
            Command::QueryCurrentSource | Command::SetCurrentSource(_) => {
                ResponseKind::CurrentSource
            }
            Command::QueryPictureMode | Command::SetPictureMode(_) => ResponseKind::PictureMode,
            Command::QueryLampHours => ResponseKind::LampHours,
        }
    }

    /// Matcher for the expected response
    pub fn matcher(&self) -> Matcher {
        Matcher::Response(self.response_kind())
    }
}

fn fill(template: &str, token: &str, placeholder: bool) -> Result<String, ProtocolError> {
    if placeholder {
        return Err(ProtocolError::InvalidValue(format!(
            "cannot send placeholder value for {}",
            template
        )));
    }
    Ok(template.replace('?', token))
}

/// Wrap wire text with the carriage returns the projector expects
pub fn frame(wire_text: &str) -> String {
    format!("\r{}\r", wire_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_text() {
        assert_eq!(Command::QueryPowerState.wire_text().unwrap(), "*POW=?#");
        assert_eq!(Command::QueryLampHours.wire_text().unwrap(), "*LTIM=?#");
        assert_eq!(Command::QueryPictureMode.wire_text().unwrap(), "*APPMOD=?#");
    }

    #[test]
    fn test_write_text() {
        assert_eq!(Command::SetPowerState(true).wire_text().unwrap(), "*POW=ON#");
        assert_eq!(Command::SetPowerState(false).wire_text().unwrap(), "*POW=OFF#");
        assert_eq!(
            Command::SetAspectRatio(AspectRatio::Auto).wire_text().unwrap(),
            "*ASP=AUTO#"
        );
        assert_eq!(
            Command::SetCurrentSource(SourceType::Hdmi2).wire_text().unwrap(),
            "*SOUR=HDMI2#"
        );
        assert_eq!(
            Command::SetPictureMode(PictureMode::Cinema).wire_text().unwrap(),
            "*APPMOD=CINE#"
        );
    }

    #[test]
    fn test_placeholder_rejected() {
        let err = Command::SetAspectRatio(AspectRatio::Unknown)
            .wire_text()
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidValue(_)));
    }

    #[test]
    fn test_shared_matcher_per_kind() {
        assert_eq!(
            Command::SetAspectRatio(AspectRatio::Wide).matcher(),
            Command::QueryAspectRatio.matcher()
        );
    }

    #[test]
    fn test_frame() {
        assert_eq!(frame("*POW=?#"), "\r*POW=?#\r");
    }
}
