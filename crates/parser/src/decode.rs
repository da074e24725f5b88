//! Body decoding with response charset hints and safe fallback.
//!
//! Order: the `charset=` parameter from `Content-Type` (strict), then strict
//! UTF-8, then Latin-1, then UTF-8 with replacement characters.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use models::FetchedDoc;

pub fn decode_body(fetched: &FetchedDoc) -> String {
    let Some(bytes) = fetched.body_bytes.as_deref() else {
        return String::new();
    };

    if let Some(labeled) = charset_from_content_type(fetched.header("content-type")) {
        if let Some(decoded) = labeled.decode_without_bom_handling_and_without_replacement(bytes) {
            return decoded.into_owned();
        }
    }
    if let Some(decoded) = UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        return decoded.into_owned();
    }
    if let Some(decoded) = WINDOWS_1252.decode_without_bom_handling_and_without_replacement(bytes) {
        return decoded.into_owned();
    }
    let (decoded, _, _) = UTF_8.decode(bytes);
    decoded.into_owned()
}

fn charset_from_content_type(content_type: Option<&str>) -> Option<&'static Encoding> {
    let mime: mime::Mime = content_type?.parse().ok()?;
    let charset = mime.get_param(mime::CHARSET)?;
    Encoding::for_label(charset.as_str().as_bytes())
}
