/// Decoded pixel dimensions, or `None` when they could not be determined
/// (callers that require fail-closed semantics, like JPEG, must not treat
/// `None` the same as "not checked").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Reads width/height from a PNG IHDR chunk (spec.md §4.2 step 3):
/// big-endian `u32` width at offset 16, height at offset 20.
pub fn png_dimensions(data: &[u8]) -> Option<Dimensions> {
    if data.len() < 24 {
        return None;
    }
    let width = u32::from_be_bytes(data[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(data[20..24].try_into().ok()?);
    Some(Dimensions { width, height })
}

/// Scans for a baseline/progressive SOF marker (`FF C0`, `FF C1`, `FF C2`)
/// and reads big-endian 16-bit height/width at offsets +5/+7 from the
/// marker. Returns `None` if no SOF marker is found — callers must fail
/// closed on `None` per spec.md §4.2 step 3.
pub fn jpeg_dimensions(data: &[u8]) -> Option<Dimensions> {
    let mut i = 0usize;
    while i + 1 < data.len() {
        if data[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = data[i + 1];
        if marker == 0xC0 || marker == 0xC1 || marker == 0xC2 {
            let start = i + 2;
            if start + 9 > data.len() {
                return None;
            }
            // start..start+2 is segment length, start+2 is precision.
            let height = u16::from_be_bytes(data[start + 3..start + 5].try_into().ok()?);
            let width = u16::from_be_bytes(data[start + 5..start + 7].try_into().ok()?);
            return Some(Dimensions { width: width as u32, height: height as u32 });
        }
        i += 2;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut data = vec![0u8; 24];
        data[0..8].copy_from_slice(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
        data[16..20].copy_from_slice(&width.to_be_bytes());
        data[20..24].copy_from_slice(&height.to_be_bytes());
        data
    }

    #[test]
    fn reads_png_dimensions() {
        let data = png_header(4096, 2160);
        assert_eq!(png_dimensions(&data), Some(Dimensions { width: 4096, height: 2160 }));
    }

    #[test]
    fn jpeg_without_sof_is_none() {
        let data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        assert_eq!(jpeg_dimensions(&data), None);
    }

    #[test]
    fn reads_jpeg_dimensions_from_sof0() {
        // FF D8 (SOI), FF C0 (SOF0), len(2B, ignored), precision(1B),
        // height(2B), width(2B)
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xC0, 0x00, 0x11, 0x08];
        data.extend_from_slice(&800u16.to_be_bytes()); // height
        data.extend_from_slice(&600u16.to_be_bytes()); // width
        assert_eq!(jpeg_dimensions(&data), Some(Dimensions { width: 600, height: 800 }));
    }
}
