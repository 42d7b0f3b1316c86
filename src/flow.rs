//! Gas flow rates. The BVT3000 valve block only knows 16 calibrated rates,
//! selected by a 4-bit code.

use std::fmt;

use tracing::warn;

use crate::error::{Error, Result};
use crate::frame::Mnemonic;

/// Calibrated flow rate in l/h for each code.
pub const FLOW_RATES: [f64; 16] = [
    0.0, 135.0, 270.0, 400.0, 535.0, 670.0, 800.0, 935.0, 1070.0, 1200.0, 1335.0, 1470.0, 1600.0,
    1735.0, 1870.0, 2000.0,
];

pub const MAX_FLOW_RATE: f64 = 2000.0;

/// Relative deviation above which a quantized request is reported.
const ADJUSTMENT_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct FlowCode(u8);

impl FlowCode {
    pub fn new(code: u8) -> Result<Self> {
        if usize::from(code) >= FLOW_RATES.len() {
            return Err(Error::out_of_range("flow code", f64::from(code), 0.0, 15.0));
        }
        Ok(Self(code))
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    pub fn rate(self) -> f64 {
        FLOW_RATES[usize::from(self.0)]
    }

    /// `>` followed by the four code bits, MSB first.
    pub fn to_wire(self) -> String {
        format!(">{:04b}", self.0)
    }

    pub(crate) fn from_wire(mnemonic: Mnemonic, payload: &str) -> Result<Self> {
        let unexpected = || Error::UnexpectedReply {
            mnemonic,
            payload: payload.to_owned(),
        };
        let bits = payload.strip_prefix('>').ok_or_else(unexpected)?;
        let bits = bits.get(..4).ok_or_else(unexpected)?;
        let mut code = 0u8;
        for bit in bits.bytes() {
            code = match bit {
                b'0' => code << 1,
                b'1' => (code << 1) | 1,
                _ => return Err(unexpected()),
            };
        }
        Ok(Self(code))
    }
}

impl fmt::Display for FlowCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The requested rate could not be matched within 1%.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    pub requested: f64,
    pub actual: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantized {
    pub code: FlowCode,
    pub adjustment: Option<Adjustment>,
}

/// Picks the code closest to `requested`; exact midpoints go to the upper
/// code.
pub fn encode(requested: f64) -> Result<Quantized> {
    if requested.is_nan() || requested < 0.0 || requested > MAX_FLOW_RATE {
        return Err(Error::out_of_range("flow rate", requested, 0.0, MAX_FLOW_RATE));
    }

    let mut index = 0;
    for (upper, pair) in FLOW_RATES.windows(2).enumerate().map(|(i, pair)| (i + 1, pair)) {
        let (low, high) = (pair[0], pair[1]);
        if requested >= low && requested <= high {
            index = if requested < 0.5 * (low + high) {
                upper - 1
            } else {
                upper
            };
            break;
        }
    }

    let actual = FLOW_RATES[index];
    let adjustment = (requested != 0.0
        && ((requested - actual) / requested).abs() > ADJUSTMENT_TOLERANCE)
        .then_some(Adjustment { requested, actual });
    if let Some(adjustment) = adjustment {
        warn!(
            requested = adjustment.requested,
            actual = adjustment.actual,
            "flow rate had to be adjusted"
        );
    }

    #[allow(clippy::cast_possible_truncation)]
    let code = FlowCode(index as u8);
    Ok(Quantized { code, adjustment })
}

pub fn decode(code: u8) -> Result<f64> {
    FlowCode::new(code).map(FlowCode::rate)
}

#[cfg(test)]
mod tests {
    use super::{decode, encode, FlowCode, FLOW_RATES};
    use crate::constants::AF;
    use crate::error::Error;

    fn code_of(rate: f64) -> u8 {
        encode(rate).expect("rate in range").code.value()
    }

    #[test]
    fn table_ends_map_to_first_and_last_code() {
        assert_eq!(code_of(0.0), 0);
        assert_eq!(code_of(2000.0), 15);
    }

    #[test]
    fn rejects_out_of_range_requests() {
        for rate in [-1.0, 2001.0, f64::NAN] {
            let err = encode(rate).expect_err("should be rejected");
            assert!(matches!(err, Error::OutOfRange { .. }));
        }
    }

    #[test]
    fn midpoint_goes_up_and_below_goes_down() {
        for i in 1..FLOW_RATES.len() {
            let midpoint = 0.5 * (FLOW_RATES[i - 1] + FLOW_RATES[i]);
            assert_eq!(usize::from(code_of(midpoint)), i, "midpoint {midpoint}");
            assert_eq!(usize::from(code_of(midpoint - 0.01)), i - 1);
        }
    }

    #[test]
    fn decode_of_encode_stays_within_half_spacing() {
        let mut rate = 0.0;
        while rate <= 2000.0 {
            let actual = decode(code_of(rate)).expect("valid code");
            let i = FLOW_RATES
                .iter()
                .position(|&point| point >= rate)
                .expect("inside table")
                .max(1);
            let half_spacing = 0.5 * (FLOW_RATES[i] - FLOW_RATES[i - 1]);
            assert!((actual - rate).abs() <= half_spacing, "rate {rate}");
            rate += 7.5;
        }
    }

    #[test]
    fn exact_table_value_has_no_adjustment() {
        let quantized = encode(1600.0).expect("in range");
        assert_eq!(quantized.code.value(), 12);
        assert!(quantized.adjustment.is_none());
    }

    #[test]
    fn coarse_request_reports_adjustment() {
        let quantized = encode(1650.0).expect("in range");
        assert_eq!(quantized.code.value(), 12);
        let adjustment = quantized.adjustment.expect("more than 1% off");
        assert_eq!(adjustment.requested, 1650.0);
        assert_eq!(adjustment.actual, 1600.0);
    }

    #[test]
    fn decode_checks_code_bounds() {
        assert_eq!(decode(15).expect("valid"), 2000.0);
        assert!(decode(16).is_err());
    }

    #[test]
    fn wire_form_is_msb_first_bits() {
        let code = FlowCode::new(12).expect("valid");
        assert_eq!(code.to_wire(), ">1100");
        assert_eq!(FlowCode::from_wire(AF, ">1100").expect("bits"), code);
        assert_eq!(FlowCode::from_wire(AF, ">0001").expect("bits").value(), 1);
        assert!(FlowCode::from_wire(AF, "1100").is_err());
        assert!(FlowCode::from_wire(AF, ">11").is_err());
        assert!(FlowCode::from_wire(AF, ">1201").is_err());
    }
}
