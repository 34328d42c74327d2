//! Occupancy grid to viewer raster conversion.
//!
//! Grids arrive as row-major `i8` cells: `-1` unknown, `0..=100` occupancy
//! probability. Viewers get a grayscale image, shipped as a base64-encoded
//! binary PGM so it fits in a JSON envelope.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use tracing::warn;

/// Gray value for unknown cells. Sits between free (white) and occupied
/// (black) so unexplored space reads as a neutral tone.
const UNKNOWN_TONE: u8 = 205;

/// Map one occupancy cell to a gray value.
///
/// Free (0) renders white, fully occupied (100) black, with a strictly
/// monotonic ramp in between. Anything outside the documented range is
/// treated as unknown.
fn cell_tone(cell: i8) -> u8 {
    match cell {
        0..=100 => 255 - ((cell as u16 * 255) / 100) as u8,
        _ => UNKNOWN_TONE,
    }
}

/// Render a grid into grayscale pixels, bottom row first so the map origin
/// renders bottom-left.
///
/// A grid whose length disagrees with `width_cells * height_cells` is a
/// producer bug but not fatal: the grid is resized to the declared shape
/// (padding with unknown) and a warning logged.
pub fn rasterize(grid: &[i8], width_cells: u32, height_cells: u32) -> Vec<u8> {
    let expected = width_cells as usize * height_cells as usize;
    let mut cells;
    let cells = if grid.len() == expected {
        grid
    } else {
        warn!(
            "Occupancy grid length {} does not match {}x{} cells; resizing defensively",
            grid.len(),
            width_cells,
            height_cells
        );
        cells = grid.to_vec();
        cells.resize(expected, -1);
        cells.as_slice()
    };

    let width = width_cells as usize;
    let mut pixels = Vec::with_capacity(expected);
    for row in (0..height_cells as usize).rev() {
        for col in 0..width {
            pixels.push(cell_tone(cells[row * width + col]));
        }
    }
    pixels
}

/// Encode grayscale pixels as a binary PGM (P5) and base64 the result for
/// JSON transport.
pub fn encode_pgm(pixels: &[u8], width_cells: u32, height_cells: u32) -> String {
    let header = format!("P5\n{} {}\n255\n", width_cells, height_cells);
    let mut image = Vec::with_capacity(header.len() + pixels.len());
    image.extend_from_slice(header.as_bytes());
    image.extend_from_slice(pixels);
    BASE64.encode(image)
}

/// Full grid-to-transport conversion.
pub fn render(grid: &[i8], width_cells: u32, height_cells: u32) -> String {
    let pixels = rasterize(grid, width_cells, height_cells);
    encode_pgm(&pixels, width_cells, height_cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_maps_to_mid_tone() {
        assert_eq!(cell_tone(-1), UNKNOWN_TONE);
        assert_eq!(cell_tone(-128), UNKNOWN_TONE);
        assert_eq!(cell_tone(101), UNKNOWN_TONE);
    }

    #[test]
    fn occupancy_ramp_is_monotonic() {
        assert_eq!(cell_tone(0), 255);
        assert_eq!(cell_tone(100), 0);
        let mut previous = cell_tone(0);
        for cell in 1..=100i8 {
            let tone = cell_tone(cell);
            assert!(
                tone <= previous,
                "tone increased between {} and {}",
                cell - 1,
                cell
            );
            previous = tone;
        }
        // Distinct endpoints and midpoint keep the ramp visibly graded.
        assert!(cell_tone(50) < cell_tone(0));
        assert!(cell_tone(100) < cell_tone(50));
    }

    #[test]
    fn raster_flips_rows() {
        // 2x2 grid: bottom row [0, 100], top row [-1, 50].
        let grid = [0, 100, -1, 50];
        let pixels = rasterize(&grid, 2, 2);
        // Top of the image is the grid's last row.
        assert_eq!(pixels[0], UNKNOWN_TONE);
        assert_eq!(pixels[1], cell_tone(50));
        assert_eq!(pixels[2], 255);
        assert_eq!(pixels[3], 0);
    }

    #[test]
    fn length_mismatch_is_resized_not_fatal() {
        let short = [0i8, 100];
        let pixels = rasterize(&short, 2, 2);
        assert_eq!(pixels.len(), 4);
        // Padded cells render as unknown; they land in the flipped top row.
        assert_eq!(pixels[0], UNKNOWN_TONE);
        assert_eq!(pixels[1], UNKNOWN_TONE);

        let long = [0i8; 9];
        assert_eq!(rasterize(&long, 2, 2).len(), 4);
    }

    #[test]
    fn pgm_round_trips_through_base64() {
        let encoded = render(&[0, 100, -1, 50], 2, 2);
        let image = BASE64.decode(encoded).expect("valid base64");
        assert!(image.starts_with(b"P5\n2 2\n255\n"));
        assert_eq!(image.len(), "P5\n2 2\n255\n".len() + 4);
    }
}
