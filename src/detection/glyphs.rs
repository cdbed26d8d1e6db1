//! Built-in block font used to synthesize symbol templates.
//!
//! Every glyph is a 5x7 cell grid whose ink forms one 4-connected shape, so
//! a rendered glyph survives component extraction as a single region.

use image::{Rgba, RgbaImage};

use crate::models::{BoundingBox, Symbol};

pub const GLYPH_COLUMNS: u32 = 5;
pub const GLYPH_ROWS: u32 = 7;

const INK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);

type Bitmap = [&'static str; GLYPH_ROWS as usize];

const ZERO: Bitmap = ["#####", "#...#", "#...#", "#...#", "#...#", "#...#", "#####"];
const ONE: Bitmap = [".##..", "..#..", "..#..", "..#..", "..#..", "..#..", ".###."];
const TWO: Bitmap = ["#####", "....#", "....#", "#####", "#....", "#....", "#####"];
const THREE: Bitmap = ["#####", "....#", "....#", ".####", "....#", "....#", "#####"];
const FOUR: Bitmap = ["#...#", "#...#", "#...#", "#####", "....#", "....#", "....#"];
const FIVE: Bitmap = ["#####", "#....", "#....", "#####", "....#", "....#", "#####"];
const SIX: Bitmap = ["#####", "#....", "#....", "#####", "#...#", "#...#", "#####"];
const SEVEN: Bitmap = ["#####", "....#", "....#", "..###", "....#", "....#", "....#"];
const EIGHT: Bitmap = ["#####", "#...#", "#...#", "#####", "#...#", "#...#", "#####"];
const NINE: Bitmap = ["#####", "#...#", "#...#", "#####", "....#", "....#", "#####"];
const MINUS: Bitmap = [".....", ".....", ".....", "#####", ".....", ".....", "....."];

const DIGITS: [Bitmap; 10] = [ZERO, ONE, TWO, THREE, FOUR, FIVE, SIX, SEVEN, EIGHT, NINE];

fn bitmap(symbol: Symbol) -> &'static Bitmap {
    match symbol {
        Symbol::Digit(d) => &DIGITS[d.value() as usize],
        Symbol::Minus => &MINUS,
    }
}

/// Whether cell (`col`, `row`) of the glyph carries ink
pub fn is_ink(symbol: Symbol, col: u32, row: u32) -> bool {
    bitmap(symbol)[row as usize].as_bytes()[col as usize] == b'#'
}

/// Size of a glyph cell rendered at `scale`
pub fn cell_size(scale: u32) -> (u32, u32) {
    (GLYPH_COLUMNS * scale, GLYPH_ROWS * scale)
}

/// Largest integer scale whose cell fits in `width` x `height`
pub fn fitting_scale(width: u32, height: u32) -> u32 {
    (width / GLYPH_COLUMNS).min(height / GLYPH_ROWS).max(1)
}

/// Ink extent of a glyph at `scale`, relative to the cell's top-left corner
pub fn ink_bounds(symbol: Symbol, scale: u32) -> BoundingBox {
    let mut min = (GLYPH_COLUMNS, GLYPH_ROWS);
    let mut max = (0, 0);
    for row in 0..GLYPH_ROWS {
        for col in 0..GLYPH_COLUMNS {
            if is_ink(symbol, col, row) {
                min = (min.0.min(col), min.1.min(row));
                max = (max.0.max(col), max.1.max(row));
            }
        }
    }
    BoundingBox::new(
        min.0 * scale,
        min.1 * scale,
        (max.0 - min.0 + 1) * scale,
        (max.1 - min.1 + 1) * scale,
    )
}

/// Paint a glyph with its cell's top-left corner at (`x`, `y`).
/// Ink falling outside the canvas is clipped.
pub fn draw_glyph(canvas: &mut RgbaImage, symbol: Symbol, x: u32, y: u32, scale: u32) {
    let (cw, ch) = canvas.dimensions();
    for row in 0..GLYPH_ROWS {
        for col in 0..GLYPH_COLUMNS {
            if !is_ink(symbol, col, row) {
                continue;
            }
            for dy in 0..scale {
                for dx in 0..scale {
                    let px = x + col * scale + dx;
                    let py = y + row * scale + dy;
                    if px < cw && py < ch {
                        canvas.put_pixel(px, py, INK);
                    }
                }
            }
        }
    }
}

/// Paint a string of symbols left to right, `gap` pixels between cells.
/// Characters outside the alphabet leave an empty cell.
pub fn draw_text(canvas: &mut RgbaImage, text: &str, x: u32, y: u32, scale: u32, gap: u32) {
    let (cell_w, _) = cell_size(scale);
    for (i, c) in text.chars().enumerate() {
        if let Some(symbol) = Symbol::from_char(c) {
            draw_glyph(canvas, symbol, x + i as u32 * (cell_w + gap), y, scale);
        }
    }
}

/// Blank white page
pub fn blank_page(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, PAPER)
}

/// A glyph alone on a white cell of `5 * scale` x `7 * scale` pixels
pub fn render_glyph(symbol: Symbol, scale: u32) -> RgbaImage {
    let (w, h) = cell_size(scale);
    let mut canvas = blank_page(w, h);
    draw_glyph(&mut canvas, symbol, 0, 0, scale);
    canvas
}
