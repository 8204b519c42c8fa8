use crate::error::EncodeError;
use crate::frame::FrameData;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use serde::Serialize;
use std::io::Cursor;

const DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// A still frame encoded for transport
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub frame_id: u64,
    pub captured_at: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    /// `data:image/jpeg;base64,...`
    pub image: String,
}

/// Body of the outbound `video_frame` event
#[derive(Debug, Serialize)]
pub struct FramePayload<'a> {
    pub image: &'a str,
}

impl EncodedFrame {
    pub fn payload(&self) -> FramePayload<'_> {
        FramePayload { image: &self.image }
    }
}

/// Encode an RGB24 frame as a JPEG data URI at a fixed quality
pub fn encode_frame(frame: &FrameData, quality: u8) -> Result<EncodedFrame, EncodeError> {
    if !frame.validate_size() {
        return Err(EncodeError::InvalidBuffer {
            width: frame.width,
            height: frame.height,
            len: frame.data.len(),
        });
    }

    let mut buffer = Cursor::new(Vec::with_capacity(16 * 1024));
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder.encode(&frame.data, frame.width, frame.height, ColorType::Rgb8)?;
    let jpeg = buffer.into_inner();

    Ok(EncodedFrame {
        frame_id: frame.id,
        captured_at: DateTime::<Utc>::from(frame.timestamp),
        width: frame.width,
        height: frame.height,
        image: format!("{}{}", DATA_URI_PREFIX, STANDARD.encode(jpeg)),
    })
}

/// Strip the data-URI header and decode the JPEG bytes
pub fn decode_data_uri(uri: &str) -> Option<Vec<u8>> {
    let encoded = match uri.split_once(',') {
        Some((_, body)) => body,
        None => uri,
    };
    STANDARD.decode(encoded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn rgb_frame(width: u32, height: u32) -> FrameData {
        FrameData::new(
            9,
            SystemTime::now(),
            vec![200u8; (width * height * 3) as usize],
            width,
            height,
        )
    }

    #[test]
    fn test_encode_produces_jpeg_data_uri() {
        let encoded = encode_frame(&rgb_frame(16, 8), 80).unwrap();
        assert!(encoded.image.starts_with("data:image/jpeg;base64,"));
        assert_eq!((encoded.width, encoded.height), (16, 8));
        assert_eq!(encoded.frame_id, 9);

        let jpeg = decode_data_uri(&encoded.image).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_encode_rejects_short_buffer() {
        let frame = FrameData::new(1, SystemTime::now(), vec![0u8; 5], 16, 8);
        assert!(matches!(
            encode_frame(&frame, 80),
            Err(EncodeError::InvalidBuffer { len: 5, .. })
        ));
    }

    #[test]
    fn test_quality_changes_output_size() {
        let mut data = Vec::with_capacity(64 * 48 * 3);
        for i in 0..(64 * 48) {
            data.extend_from_slice(&[(i % 251) as u8, (i * 7 % 253) as u8, (i * 13 % 241) as u8]);
        }
        let frame = FrameData::new(3, SystemTime::now(), data, 64, 48);

        let low = decode_data_uri(&encode_frame(&frame, 10).unwrap().image).unwrap();
        let high = decode_data_uri(&encode_frame(&frame, 95).unwrap().image).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_payload_serializes_image_field() {
        let encoded = encode_frame(&rgb_frame(8, 8), 80).unwrap();
        let json = serde_json::to_value(encoded.payload()).unwrap();
        assert_eq!(json["image"].as_str(), Some(encoded.image.as_str()));
    }
}
