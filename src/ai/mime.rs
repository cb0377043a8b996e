/// Sniffs the MIME type of generated media from its leading bytes.
pub fn detect_media_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, 0x50, 0x4E, 0x47, ..] => "image/png",
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => "image/webp",
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x41, 0x56, 0x45, ..] => "audio/wav",
        [_, _, _, _, 0x66, 0x74, 0x79, 0x70, ..] => "video/mp4",
        _ => {
            tracing::warn!(
                "Unrecognized media format (first 4 bytes: {:02X?}), falling back to application/octet-stream",
                &bytes[..bytes.len().min(4)]
            );
            "application/octet-stream"
        }
    }
}

/// Prefers the MIME type the backend declared, sniffing only when it is blank.
pub fn resolve_mime(declared: &str, bytes: &[u8]) -> String {
    if declared.trim().is_empty() {
        detect_media_mime(bytes).to_string()
    } else {
        declared.to_string()
    }
}
