//! Binary codec for the opaque track identifier the nodes hand out.
//!
//! The wire form is a base64 string over a big-endian binary layout: a 4-byte
//! header (size + flags), a version byte when the "versioned" flag is set,
//! then the track fields. Sources may append extra fields through the `_with`
//! variants, which hand the raw writer/reader to a caller-supplied hook.

mod reader;
mod writer;

pub use reader::TrackReader;
pub use writer::TrackWriter;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{Error, Result};
use crate::track::TrackInfo;

/// Flag bit marking a message that carries an explicit version byte.
pub const TRACK_INFO_VERSIONED: u8 = 1;
/// Current format version written on encode.
pub const TRACK_INFO_VERSION: u8 = 2;

/// Encode track metadata into the binary wire form.
pub fn encode_track(info: &TrackInfo) -> Result<Vec<u8>> {
    encode_track_with(info, |_, _| Ok(()))
}

/// Encode with a source-specific extension hook appended after the standard
/// fields, before the trailing position marker.
pub fn encode_track_with<F>(info: &TrackInfo, details: F) -> Result<Vec<u8>>
where
    F: FnOnce(&TrackInfo, &mut TrackWriter) -> Result<()>,
{
    let mut writer = TrackWriter::new();

    writer.write_u8(TRACK_INFO_VERSION);
    writer.write_utf(&info.title)?;
    writer.write_utf(&info.author)?;
    writer.write_i64(info.length as i64);
    writer.write_utf(&info.identifier)?;
    writer.write_bool(info.is_stream);
    writer.write_nullable_text(info.uri.as_deref())?;
    writer.write_utf(&info.source_name)?;

    details(info, &mut writer)?;

    // Position marker, always zero on encode and skipped on decode.
    writer.write_i64(0);

    writer.commit(TRACK_INFO_VERSIONED)
}

/// Encode straight to the base64 form the REST and socket surfaces use.
pub fn encode_track_base64(info: &TrackInfo) -> Result<String> {
    Ok(BASE64.encode(encode_track(info)?))
}

/// Decode the binary wire form back into track metadata.
///
/// `is_seekable` is synthesized as the negation of the stream flag; the
/// trailing position marker is ignored.
pub fn decode_track(data: &[u8]) -> Result<TrackInfo> {
    decode_track_with(data, |_, _| Ok(()))
}

/// Decode with a source-specific extension hook, invoked with the source name
/// and the reader positioned right after the standard fields.
pub fn decode_track_with<F>(data: &[u8], details: F) -> Result<TrackInfo>
where
    F: FnOnce(&str, &mut TrackReader<'_>) -> Result<()>,
{
    let mut reader = TrackReader::new(data)?;

    let version = if reader.flags() & TRACK_INFO_VERSIONED != 0 {
        reader.read_u8()?
    } else {
        1
    };
    if version > TRACK_INFO_VERSION {
        return Err(Error::Codec(format!(
            "unsupported track format version {version}"
        )));
    }

    let title = reader.read_utf()?;
    let author = reader.read_utf()?;
    let length = reader.read_i64()? as u64;
    let identifier = reader.read_utf()?;
    let is_stream = reader.read_bool()?;
    let uri = reader.read_nullable_text()?;
    let source_name = reader.read_utf()?;

    let info = TrackInfo {
        title,
        author,
        length,
        identifier,
        is_stream,
        is_seekable: !is_stream,
        uri,
        source_name,
    };
    details(&info.source_name, &mut reader)?;

    Ok(info)
}

/// Decode from the base64 wire form.
pub fn decode_track_base64(encoded: &str) -> Result<TrackInfo> {
    let raw = BASE64
        .decode(encoded)
        .map_err(|err| Error::Codec(format!("invalid base64: {err}")))?;
    decode_track(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> TrackInfo {
        TrackInfo {
            title: "Never Gonna Give You Up".into(),
            author: "Rick Astley".into(),
            length: 212_000,
            identifier: "dQw4w9WgXcQ".into(),
            is_stream: false,
            is_seekable: true,
            uri: Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ".into()),
            source_name: "youtube".into(),
        }
    }

    #[test]
    fn round_trip_preserves_fields() {
        let info = sample();
        let decoded = decode_track(&encode_track(&info).unwrap()).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn round_trip_base64() {
        let info = sample();
        let decoded = decode_track_base64(&encode_track_base64(&info).unwrap()).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn round_trip_with_awkward_strings() {
        let mut info = sample();
        // NUL, a 2-byte range char, a 3-byte BMP char, and a non-BMP emoji
        // that must survive as a surrogate pair.
        info.title = "a\u{0}b \u{00e9} \u{3042} \u{1F3B5}".into();
        info.author = String::new();
        info.uri = None;
        let decoded = decode_track(&encode_track(&info).unwrap()).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn stream_flag_drives_seekable() {
        let mut info = sample();
        info.is_stream = true;
        info.is_seekable = false;
        let decoded = decode_track(&encode_track(&info).unwrap()).unwrap();
        assert!(decoded.is_stream);
        assert!(!decoded.is_seekable);
    }

    #[test]
    fn declared_size_mismatch_is_rejected() {
        let mut encoded = encode_track(&sample()).unwrap();
        // Truncate the body without touching the header.
        encoded.truncate(encoded.len() - 1);
        assert!(matches!(decode_track(&encoded), Err(Error::Codec(_))));

        // Corrupt the declared size instead.
        let mut encoded = encode_track(&sample()).unwrap();
        encoded[3] = encoded[3].wrapping_add(1);
        assert!(matches!(decode_track(&encoded), Err(Error::Codec(_))));
    }

    #[test]
    fn short_buffer_is_rejected() {
        assert!(matches!(decode_track(&[0, 0]), Err(Error::Codec(_))));
    }

    #[test]
    fn extension_hook_round_trips_extra_fields() {
        let info = sample();
        let encoded = encode_track_with(&info, |_, writer| {
            writer.write_utf("probe-data")?;
            Ok(())
        })
        .unwrap();

        let mut probed = None;
        let decoded = decode_track_with(&encoded, |source, reader| {
            assert_eq!(source, "youtube");
            probed = Some(reader.read_utf()?);
            Ok(())
        })
        .unwrap();
        assert_eq!(decoded, info);
        assert_eq!(probed.as_deref(), Some("probe-data"));
    }

    #[test]
    fn modified_utf8_nul_is_two_bytes() {
        let mut writer = TrackWriter::new();
        writer.write_utf("\u{0}").unwrap();
        let message = writer.commit(0).unwrap();
        // 4-byte header, 2-byte length prefix, then the C0 80 pair.
        assert_eq!(&message[4..], &[0x00, 0x02, 0xC0, 0x80]);
    }
}
