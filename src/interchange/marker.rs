pub(crate) enum MarkerType {
    Segment,
    StandAlone,
}

/// Markers the baseline codec reads or writes. Every other marker code is either rejected or
/// skipped by the decoder, see [`classify`].
#[derive(Debug, Copy, Clone, PartialEq, Hash, Eq)]
pub enum Marker {
    /// Start of Frame, baseline DCT
    SOF0 = 0xC0,

    /// Huffman table specification
    DHT = 0xC4,

    /// Start of image
    SOI = 0xD8,

    /// End of image
    EOI = 0xD9,

    /// Start of scan
    SOS = 0xDA,

    /// Define quantization table(s)
    DQT = 0xDB,

    /// Define restart interval
    DRI = 0xDD,

    /// Application 0, the JFIF header
    APP0 = 0xE0,

    /// Comment
    COM = 0xFE,
}

/// What the decoder does with a marker code it has no [`Marker`] for.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Unknown {
    /// A frame type other than baseline (SOF1..SOF15) or arithmetic conditioning.
    UnsupportedFrame,
    /// RSTn or TEM: no body.
    StandAlone,
    /// A segment whose declared length is skipped.
    Skippable,
}

impl Marker {
    pub(crate) const PREFIX: u8 = 0xFF;

    pub fn from_u8(code: u8) -> Option<Self> {
        use Marker::*;

        Some(match code {
            0xC0 => SOF0,
            0xC4 => DHT,
            0xD8 => SOI,
            0xD9 => EOI,
            0xDA => SOS,
            0xDB => DQT,
            0xDD => DRI,
            0xE0 => APP0,
            0xFE => COM,
            _ => return None,
        })
    }

    pub(crate) fn is_segment(&self) -> MarkerType {
        match self {
            Marker::SOI | Marker::EOI => MarkerType::StandAlone,
            _ => MarkerType::Segment,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Marker::SOF0 => "SOF0",
            Marker::DHT => "DHT",
            Marker::SOI => "SOI",
            Marker::EOI => "EOI",
            Marker::SOS => "SOS",
            Marker::DQT => "DQT",
            Marker::DRI => "DRI",
            Marker::APP0 => "APP0",
            Marker::COM => "COM",
        }
    }
}

pub(crate) fn classify(code: u8) -> Unknown {
    match code {
        // SOF1..SOF15 and DAC; 0xC4 (DHT) is a known marker
        0xC1..=0xCF => Unknown::UnsupportedFrame,
        0x01 | 0xD0..=0xD7 => Unknown::StandAlone,
        _ => Unknown::Skippable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u8() {
        assert_eq!(Marker::from_u8(0xD8), Some(Marker::SOI));
        assert_eq!(Marker::from_u8(0xC4), Some(Marker::DHT));
        assert_eq!(Marker::from_u8(0xC2), None);
        assert_eq!(Marker::from_u8(Marker::COM as u8), Some(Marker::COM));
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(0xC2), Unknown::UnsupportedFrame);
        assert_eq!(classify(0xCC), Unknown::UnsupportedFrame);
        assert_eq!(classify(0xD3), Unknown::StandAlone);
        assert_eq!(classify(0xE1), Unknown::Skippable);
        assert!(matches!(Marker::SOI.is_segment(), MarkerType::StandAlone));
        assert!(matches!(Marker::DQT.is_segment(), MarkerType::Segment));
    }
}
