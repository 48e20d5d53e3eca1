//! Feed Codec
//!
//! Decodes Finnhub text frames into domain ticks and encodes control frames.
//!
//! Decoding is lenient per record: a `trade` frame with one malformed record
//! still yields ticks for the other records. Skipped records are reported
//! back so the caller can log and count them.

use crate::domain::streaming::{Symbol, Tick, now_millis};

use super::messages::{ControlFrame, FeedMessage, TradeRecord};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Frame or record is not valid JSON for its expected shape.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record symbol is empty or contains whitespace/control characters.
    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),
}

/// Decoded inbound frame.
#[derive(Debug, Default)]
pub struct DecodedFrame {
    /// Valid ticks, in frame order.
    pub ticks: Vec<Tick>,
    /// Records that were skipped, with the reason.
    pub rejected: Vec<CodecError>,
    /// Feed-level error message, if the frame was an error frame.
    pub feed_error: Option<String>,
}

/// JSON codec for the Finnhub stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedCodec;

impl FeedCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// Records without a timestamp are stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame itself is not a JSON object with a
    /// `type` field.
    pub fn decode(&self, text: &str) -> Result<DecodedFrame, CodecError> {
        self.decode_at(text, now_millis())
    }

    /// Decode one text frame, stamping records without a timestamp with `now_ms`.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame itself is not a JSON object with a
    /// `type` field.
    pub fn decode_at(&self, text: &str, now_ms: i64) -> Result<DecodedFrame, CodecError> {
        let mut frame = DecodedFrame::default();

        match serde_json::from_str::<FeedMessage>(text)? {
            FeedMessage::Trade { data } => {
                for value in data {
                    match Self::decode_record(value, now_ms) {
                        Ok(tick) => frame.ticks.push(tick),
                        Err(e) => frame.rejected.push(e),
                    }
                }
            }
            FeedMessage::Error { msg } => frame.feed_error = Some(msg),
            FeedMessage::Ping | FeedMessage::Unknown => {}
        }

        Ok(frame)
    }

    fn decode_record(value: serde_json::Value, now_ms: i64) -> Result<Tick, CodecError> {
        let record: TradeRecord = serde_json::from_value(value)?;
        let symbol =
            Symbol::parse(&record.symbol).ok_or(CodecError::InvalidSymbol(record.symbol))?;
        Ok(Tick::new(
            symbol,
            record.price,
            record.timestamp_ms.unwrap_or(now_ms),
        ))
    }

    /// Encode a control frame as JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, frame: &ControlFrame) -> Result<String, CodecError> {
        Ok(serde_json::to_string(frame)?)
    }
}
