//! Which items a virtual list renders.
//!
//! Items have a fixed height and, optionally, a fixed width. With a width
//! they tile into as many columns as fit the container. The rendered range
//! covers every visible row plus `row_chunk_size` rows of lookahead, starts
//! on a chunk boundary, and is padded before and after so the scroll
//! extent matches the full list.

use json_store::Element;

use crate::options::VirtualOptions;

/// Container measurements in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Geometry {
    pub width: f64,
    pub height: f64,
    pub scroll_top: f64,
}

impl Geometry {
    pub fn read(container: &Element) -> Self {
        Self {
            width: sanitize(container.client_width()),
            height: sanitize(container.client_height()),
            scroll_top: sanitize(container.scroll_top()),
        }
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Items `start..end` of the (filtered) list are rendered, with
/// `top_buffer` and `bottom_buffer` pixels of padding around them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub start: usize,
    pub end: usize,
    pub columns: usize,
    pub top_buffer: f64,
    pub bottom_buffer: f64,
}

impl Window {
    /// Everything rendered, no padding.
    pub fn full(len: usize) -> Self {
        Self {
            start: 0,
            end: len,
            columns: 1,
            top_buffer: 0.0,
            bottom_buffer: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Compute the window of a virtual list of `len` items.
///
/// ```
/// use json_store_list::{virtual_window, Geometry, VirtualOptions};
///
/// let geometry = Geometry { width: 0.0, height: 300.0, scroll_top: 600.0 };
/// let window = virtual_window(1000, &VirtualOptions::new(30.0), 1, geometry);
/// assert_eq!((window.start, window.end), (20, 31));
/// assert_eq!(window.top_buffer, 600.0);
/// assert_eq!(window.bottom_buffer, (1000.0 - 31.0) * 30.0);
/// ```
pub fn virtual_window(len: usize, options: &VirtualOptions, row_chunk_size: usize, geometry: Geometry) -> Window {
    let item_height = options.height;
    if !(item_height.is_finite() && item_height > 0.0) {
        return Window::full(len);
    }
    let chunk = row_chunk_size.max(1);
    let columns = match options.width {
        Some(width) if width.is_finite() && width > 0.0 => ((geometry.width / width).floor() as usize).max(1),
        _ => 1,
    };

    // Float to usize casts saturate; everything after them must too.
    let total_rows = len.div_ceil(columns);
    let rows = ((geometry.height / item_height).ceil() as usize).saturating_add(chunk);
    let max_top_row = total_rows.saturating_add(1).saturating_sub(rows);
    let mut top_row = ((geometry.scroll_top / item_height).floor() as usize).min(max_top_row);
    top_row -= top_row % chunk;

    let start = top_row.saturating_mul(columns).min(len);
    let end = start.saturating_add(rows.saturating_mul(columns)).min(len);
    Window {
        start,
        end,
        columns,
        top_buffer: top_row as f64 * item_height,
        bottom_buffer: total_rows.saturating_sub(rows.saturating_add(top_row)) as f64 * item_height,
    }
}
