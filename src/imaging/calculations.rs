//! Pure geometry for canvases and frame strips.
//!
//! All functions here are pure and testable without any I/O or images.

use super::backend::Dimensions;

/// Columns of the standard sprite sheet grid.
pub const GRID_COLUMNS: u32 = 13;
/// Rows of the standard sprite sheet grid.
pub const GRID_ROWS: u32 = 21;
/// Edge length of one grid cell in pixels.
pub const CELL_SIZE: u32 = 64;

/// Canvas covering a `columns` × `rows` grid of square cells.
///
/// ```
/// # use layersheet::imaging::grid_canvas;
/// let canvas = grid_canvas(13, 21, 64);
/// assert_eq!((canvas.width, canvas.height), (832, 1344));
/// ```
pub const fn grid_canvas(columns: u32, rows: u32, cell: u32) -> Dimensions {
    Dimensions::new(columns * cell, rows * cell)
}

/// The standard 832×1344 sheet.
pub const STANDARD_SHEET: Dimensions = grid_canvas(GRID_COLUMNS, GRID_ROWS, CELL_SIZE);

/// Size of a horizontal strip built from `frames`: widths add up, the
/// tallest frame sets the height.
pub fn strip_dimensions(frames: &[Dimensions]) -> Dimensions {
    frames.iter().fold(Dimensions::default(), |acc, frame| {
        Dimensions::new(
            acc.width.saturating_add(frame.width),
            acc.height.max(frame.height),
        )
    })
}

/// Left edge of each frame in a strip: the running sum of earlier widths.
pub fn frame_offsets(frames: &[Dimensions]) -> Vec<u32> {
    frames
        .iter()
        .scan(0u32, |x, frame| {
            let offset = *x;
            *x = x.saturating_add(frame.width);
            Some(offset)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_sheet_is_832_by_1344() {
        assert_eq!(STANDARD_SHEET, Dimensions::new(832, 1344));
    }

    #[test]
    fn strip_sums_widths_and_takes_max_height() {
        let frames = [
            Dimensions::new(576, 256),
            Dimensions::new(512, 256),
            Dimensions::new(384, 64),
        ];
        assert_eq!(strip_dimensions(&frames), Dimensions::new(1472, 256));
    }

    #[test]
    fn empty_strip_is_zero_sized() {
        assert_eq!(strip_dimensions(&[]), Dimensions::new(0, 0));
        assert!(frame_offsets(&[]).is_empty());
    }

    #[test]
    fn offsets_are_cumulative() {
        let frames = [
            Dimensions::new(10, 1),
            Dimensions::new(20, 1),
            Dimensions::new(5, 1),
        ];
        assert_eq!(frame_offsets(&frames), vec![0, 10, 30]);
    }
}
