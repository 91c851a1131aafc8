/// Checks the first bytes of `data` against the magic number known for
/// `mime`. Returns `None` when the MIME type has no known signature (the
/// check is skipped, per spec.md §4.2 step 2), `Some(true)` on a match and
/// `Some(false)` on a mismatch.
pub fn check(mime: &str, data: &[u8]) -> Option<bool> {
    let signature: &[u8] = match mime {
        "image/jpeg" => &[0xFF, 0xD8, 0xFF],
        "image/png" => &[0x89, 0x50, 0x4E, 0x47],
        "image/gif" => &[0x47, 0x49, 0x46],
        "image/webp" => &[0x52, 0x49, 0x46, 0x46],
        "application/pdf" => &[0x25, 0x50, 0x44, 0x46],
        _ => return None,
    };
    Some(data.starts_with(signature))
}
