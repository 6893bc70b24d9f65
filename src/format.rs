//! Output pixel formats and raw Bayer conversion
//!
//! The sensor delivers 8-bit Bayer data in a GRBG mosaic:
//!
//! ```text
//! row 0: G R G R ...
//! row 1: B G B G ...
//! ```
//!
//! Conversion is bilinear with clamped borders; it favors clarity over the
//! hand-unrolled interpolation of the original C driver.

/// Caller-visible pixel format of completed frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Raw sensor mosaic, one byte per pixel
    Bayer,
    /// Demosaiced, 3 bytes per pixel, blue first
    Bgr,
    /// Demosaiced, 3 bytes per pixel, red first
    Rgb,
    /// Luma only, one byte per pixel
    Gray,
}

impl OutputFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            OutputFormat::Bayer | OutputFormat::Gray => 1,
            OutputFormat::Bgr | OutputFormat::Rgb => 3,
        }
    }
}

/// Convert one assembled raw frame into `format`, appending to `out`.
///
/// `raw` must hold exactly `width * height` bytes; `out` is cleared first.
pub(crate) fn convert(
    format: OutputFormat,
    width: u32,
    height: u32,
    raw: &[u8],
    out: &mut Vec<u8>,
) {
    debug_assert_eq!(raw.len(), (width * height) as usize);
    out.clear();
    match format {
        OutputFormat::Bayer => out.extend_from_slice(raw),
        OutputFormat::Rgb => demosaic(width, height, raw, out, |r, g, b, out| {
            out.extend_from_slice(&[r, g, b]);
        }),
        OutputFormat::Bgr => demosaic(width, height, raw, out, |r, g, b, out| {
            out.extend_from_slice(&[b, g, r]);
        }),
        OutputFormat::Gray => demosaic(width, height, raw, out, |r, g, b, out| {
            // Integer luma: (r + 2g + b) / 4
            let y = (r as u16 + 2 * g as u16 + b as u16) / 4;
            out.push(y as u8);
        }),
    }
}

fn demosaic<F>(width: u32, height: u32, raw: &[u8], out: &mut Vec<u8>, mut emit: F)
where
    F: FnMut(u8, u8, u8, &mut Vec<u8>),
{
    let w = width as i64;
    let h = height as i64;
    let at = |x: i64, y: i64| -> u16 {
        let x = x.clamp(0, w - 1);
        let y = y.clamp(0, h - 1);
        raw[(y * w + x) as usize] as u16
    };
    // Average of the horizontal, vertical or diagonal neighbors
    let cross = |x: i64, y: i64| (at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1)) / 4;
    let horiz = |x: i64, y: i64| (at(x - 1, y) + at(x + 1, y)) / 2;
    let vert = |x: i64, y: i64| (at(x, y - 1) + at(x, y + 1)) / 2;
    let diag =
        |x: i64, y: i64| (at(x - 1, y - 1) + at(x + 1, y - 1) + at(x - 1, y + 1) + at(x + 1, y + 1)) / 4;

    for y in 0..h {
        for x in 0..w {
            let even_row = y % 2 == 0;
            let even_col = x % 2 == 0;
            let (r, g, b) = match (even_row, even_col) {
                // G site on an R row
                (true, true) => (horiz(x, y), at(x, y), vert(x, y)),
                // R site
                (true, false) => (at(x, y), cross(x, y), diag(x, y)),
                // B site
                (false, true) => (diag(x, y), cross(x, y), at(x, y)),
                // G site on a B row
                (false, false) => (vert(x, y), at(x, y), horiz(x, y)),
            };
            emit(r as u8, g as u8, b as u8, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(OutputFormat::Bayer.bytes_per_pixel(), 1);
        assert_eq!(OutputFormat::Gray.bytes_per_pixel(), 1);
        assert_eq!(OutputFormat::Rgb.bytes_per_pixel(), 3);
        assert_eq!(OutputFormat::Bgr.bytes_per_pixel(), 3);
    }

    #[test]
    fn test_bayer_passthrough() {
        let raw = vec![1u8, 2, 3, 4];
        let mut out = Vec::new();
        convert(OutputFormat::Bayer, 2, 2, &raw, &mut out);
        assert_eq!(out, raw);
    }

    #[test]
    fn test_output_sizes() {
        let raw = vec![0u8; 4 * 4];
        let mut out = Vec::new();
        convert(OutputFormat::Rgb, 4, 4, &raw, &mut out);
        assert_eq!(out.len(), 4 * 4 * 3);
        convert(OutputFormat::Gray, 4, 4, &raw, &mut out);
        assert_eq!(out.len(), 4 * 4);
    }

    #[test]
    fn test_uniform_field_stays_uniform() {
        // A flat sensor field must demosaic to a flat image
        let raw = vec![0x80u8; 4 * 4];
        let mut out = Vec::new();
        convert(OutputFormat::Rgb, 4, 4, &raw, &mut out);
        assert!(out.iter().all(|&v| v == 0x80));
        convert(OutputFormat::Gray, 4, 4, &raw, &mut out);
        assert!(out.iter().all(|&v| v == 0x80));
    }

    #[test]
    fn test_rgb_bgr_are_swapped() {
        let raw: Vec<u8> = (0..16u8).collect();
        let mut rgb = Vec::new();
        let mut bgr = Vec::new();
        convert(OutputFormat::Rgb, 4, 4, &raw, &mut rgb);
        convert(OutputFormat::Bgr, 4, 4, &raw, &mut bgr);
        for (p_rgb, p_bgr) in rgb.chunks(3).zip(bgr.chunks(3)) {
            assert_eq!(p_rgb[0], p_bgr[2]);
            assert_eq!(p_rgb[1], p_bgr[1]);
            assert_eq!(p_rgb[2], p_bgr[0]);
        }
    }
}
