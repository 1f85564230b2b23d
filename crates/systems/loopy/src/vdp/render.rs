//! Renderer boundary, capture unit and colour conversion

use emu_core::wordops::store_be16;

use super::{Vdp, DISPLAY_WIDTH};

/// Draws one visible line from VDP state.
///
/// `line` receives the composited ARGB1555 output (bit 15 set for opaque
/// pixels). `screen_a` receives the 8-bit screen A indices, which the
/// capture unit can sample.
pub trait LineRenderer {
    fn draw_line(
        &mut self,
        vdp: &Vdp,
        y: usize,
        line: &mut [u16; DISPLAY_WIDTH],
        screen_a: &mut [u8; DISPLAY_WIDTH],
    );
}

/// Paints backdrop A and leaves screen A empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct BackdropRenderer;

impl LineRenderer for BackdropRenderer {
    fn draw_line(
        &mut self,
        vdp: &Vdp,
        _y: usize,
        line: &mut [u16; DISPLAY_WIDTH],
        screen_a: &mut [u8; DISPLAY_WIDTH],
    ) {
        line.fill(vdp.regs().backdrops[0] | 0x8000);
        screen_a.fill(0);
    }
}

/// Copy a finished line into the capture buffer. Formats 0 and 1 store
/// 15-bit colour big-endian; formats 2 and 3 store screen A indices.
pub(super) fn capture_line(
    capture: &mut [u8],
    format: u8,
    line: &[u16; DISPLAY_WIDTH],
    screen_a: &[u8; DISPLAY_WIDTH],
) {
    match format {
        0 | 1 => {
            for (x, color) in line.iter().enumerate() {
                store_be16(capture, x * 2, *color);
            }
        }
        _ => capture[..DISPLAY_WIDTH].copy_from_slice(screen_a),
    }
}

/// Expand a 1-5-5-5 pixel to opaque 0xFFRRGGBB.
pub fn argb1555_to_argb8888(pixel: u16) -> u32 {
    let expand = |c: u16| {
        let c = u32::from(c & 0x1F);
        (c << 3) | (c >> 2)
    };
    let r = expand(pixel >> 10);
    let g = expand(pixel >> 5);
    let b = expand(pixel);
    0xFF00_0000 | (r << 16) | (g << 8) | b
}
