//! Highlight interchange formats
//!
//! The storage collaborator speaks two representations of a highlight, and
//! both must round-trip losslessly:
//!
//! - flattened, as persisted: `{ "highlightStart": 6, "highlightEnd": 11,
//!   "highlightBackward": false }`
//! - nested, as used in memory: `{ "highlight": [ { "characterRange":
//!   { "start": 6, "end": 11 }, "backward": false } ] }`
//!
//! The nested form is a one-element list for historical reasons (selection
//! libraries report a list of character ranges per selection); an envelope
//! holding anything but exactly one entry is a boundary-contract violation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{CharacterRange, Highlight};

/// Wire format errors
#[derive(Debug, Error)]
pub enum WireError {
    #[error("Envelope must hold exactly one highlight, got {0}")]
    InvalidEnvelope(usize),
}

/// Flattened interchange form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireHighlight {
    #[serde(rename = "highlightStart")]
    pub start: usize,
    #[serde(rename = "highlightEnd")]
    pub end: usize,
    #[serde(rename = "highlightBackward")]
    pub backward: bool,
}

/// Nested in-memory interchange form: a one-element list of highlights
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightEnvelope {
    pub highlight: Vec<Highlight>,
}

impl HighlightEnvelope {
    pub fn new(highlight: Highlight) -> Self {
        Self {
            highlight: vec![highlight],
        }
    }

    /// Unwrap the envelope, enforcing the exactly-one contract
    pub fn into_highlight(self) -> Result<Highlight, WireError> {
        match self.highlight.as_slice() {
            [only] => Ok(*only),
            other => Err(WireError::InvalidEnvelope(other.len())),
        }
    }
}

impl From<Highlight> for WireHighlight {
    fn from(highlight: Highlight) -> Self {
        Self {
            start: highlight.start(),
            end: highlight.end(),
            backward: highlight.backward,
        }
    }
}

impl From<WireHighlight> for Highlight {
    fn from(wire: WireHighlight) -> Self {
        Highlight::new(CharacterRange::new(wire.start, wire.end), wire.backward)
    }
}

impl From<WireHighlight> for HighlightEnvelope {
    fn from(wire: WireHighlight) -> Self {
        HighlightEnvelope::new(wire.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Highlight {
        Highlight::new(CharacterRange::new(6, 11), true)
    }

    #[test]
    fn test_flat_json_field_names() {
        let wire: WireHighlight = sample().into();
        let json = serde_json::to_string(&wire).unwrap();

        assert!(json.contains("\"highlightStart\":6"));
        assert!(json.contains("\"highlightEnd\":11"));
        assert!(json.contains("\"highlightBackward\":true"));
    }

    #[test]
    fn test_nested_json_shape() {
        let envelope = HighlightEnvelope::new(sample());
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["highlight"][0]["characterRange"]["start"], 6);
        assert_eq!(json["highlight"][0]["characterRange"]["end"], 11);
        assert_eq!(json["highlight"][0]["backward"], true);
    }

    #[test]
    fn test_flatten_unflatten_round_trip() {
        let original = sample();

        let wire: WireHighlight = original.into();
        let back: Highlight = wire.into();
        assert_eq!(original, back);

        let envelope: HighlightEnvelope = wire.into();
        assert_eq!(envelope.into_highlight().unwrap(), original);
    }

    #[test]
    fn test_envelope_round_trips_through_json() {
        let envelope = HighlightEnvelope::new(sample());
        let json = serde_json::to_string(&envelope).unwrap();
        let parsed: HighlightEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn test_envelope_rejects_wrong_cardinality() {
        let empty = HighlightEnvelope { highlight: vec![] };
        assert!(matches!(
            empty.into_highlight(),
            Err(WireError::InvalidEnvelope(0))
        ));

        let double = HighlightEnvelope {
            highlight: vec![sample(), sample()],
        };
        assert!(matches!(
            double.into_highlight(),
            Err(WireError::InvalidEnvelope(2))
        ));
    }
}
