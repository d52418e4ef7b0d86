use crate::error::StreamError;

/// Media type a replacement stream must declare.
pub const MIXED_REPLACE_MIME: &str = "multipart/x-mixed-replace";

/// Extract the boundary token from a `Content-Type` header value.
///
/// The declared media type must be `multipart/x-mixed-replace` and a
/// `boundary` parameter must be present; anything else is a stream-level
/// failure, not a per-frame one. Quoted boundary values are unquoted.
pub fn boundary_from_content_type(content_type: &str) -> Result<String, StreamError> {
    let mut parts = content_type.split(';');

    let media_type = parts.next().unwrap_or_default().trim();
    if !media_type.eq_ignore_ascii_case(MIXED_REPLACE_MIME) {
        return Err(StreamError::InvalidContentType {
            content_type: content_type.to_string(),
        });
    }

    for param in parts {
        let Some((name, value)) = param.split_once('=') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("boundary") {
            let token = value.trim().trim_matches('"');
            if token.is_empty() {
                break;
            }
            return Ok(token.to_string());
        }
    }

    Err(StreamError::MissingBoundary {
        content_type: content_type.to_string(),
    })
}
