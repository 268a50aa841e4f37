//! Decoding of transport-encoded chat images.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use common::ChatError;
use image::DynamicImage;

/// Decode a base64 image, optionally wrapped in a `data:` URL.
///
/// Whitespace inside the payload is ignored. Both malformed base64 and
/// undecodable image bytes yield `ImageDecodeError`.
pub fn decode_image(data: &str) -> Result<DynamicImage, ChatError> {
    let payload = strip_data_url(data.trim())?;
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();

    let bytes = STANDARD.decode(compact.as_bytes()).map_err(ChatError::image_decode)?;
    image::load_from_memory(&bytes).map_err(ChatError::image_decode)
}

fn strip_data_url(data: &str) -> Result<&str, ChatError> {
    let Some(rest) = data.strip_prefix("data:") else {
        return Ok(data);
    };
    match rest.split_once(',') {
        Some((header, payload)) if header.ends_with(";base64") => Ok(payload),
        Some(_) => Err(ChatError::image_decode("data URL is not base64 encoded")),
        None => Err(ChatError::image_decode("malformed data URL")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_base64() -> String {
        let mut bytes = Vec::new();
        DynamicImage::new_rgb8(2, 2)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        STANDARD.encode(bytes)
    }

    #[test]
    fn test_decode_plain_base64() {
        let image = decode_image(&png_base64()).unwrap();
        assert_eq!(image.width(), 2);
    }

    #[test]
    fn test_decode_data_url_with_whitespace() {
        let encoded = png_base64();
        let (a, b) = encoded.split_at(encoded.len() / 2);
        let data = format!("data:image/png;base64,{}\n{}", a, b);
        assert!(decode_image(&data).is_ok());
    }

    #[test]
    fn test_invalid_base64() {
        let err = decode_image("not base64 at all!!").unwrap_err();
        assert_eq!(err.code(), "image_decode_error");
    }

    #[test]
    fn test_valid_base64_invalid_image() {
        let err = decode_image(&STANDARD.encode(b"definitely not a png")).unwrap_err();
        assert_eq!(err.code(), "image_decode_error");
    }

    #[test]
    fn test_non_base64_data_url() {
        let err = decode_image("data:text/plain,hello").unwrap_err();
        assert!(err.to_string().contains("not base64"));
    }
}
