use std::sync::Arc;

use image::RgbaImage;

use crate::{GridDims, Result, Rgb};

/// Per-cell color lookup derived from an uploaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorGrid {
    dims: GridDims,
    cells: Vec<Rgb>,
}

impl ColorGrid {
    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn get(&self, row: usize, column: usize) -> Option<Rgb> {
        if row >= self.dims.rows || column >= self.dims.columns {
            return None;
        }
        self.cells.get(row * self.dims.columns + column).copied()
    }
}

/// Downsamples `image` to a `columns x rows` grid by area-averaging the
/// source pixels under each cell. Pixels are weighted by their alpha, so a
/// fully transparent region averages to black.
pub fn sample(image: &RgbaImage, columns: usize, rows: usize) -> ColorGrid {
    let dims = GridDims {
        columns: columns.max(1),
        rows: rows.max(1),
    };
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return ColorGrid {
            dims,
            cells: vec![Rgb::default(); dims.cell_count()],
        };
    }

    let step_x = width as f64 / dims.columns as f64;
    let step_y = height as f64 / dims.rows as f64;
    let mut cells = Vec::with_capacity(dims.cell_count());

    for row in 0..dims.rows {
        let y0 = row as f64 * step_y;
        let y1 = y0 + step_y;
        for column in 0..dims.columns {
            let x0 = column as f64 * step_x;
            let x1 = x0 + step_x;
            cells.push(average_region(image, x0, x1, y0, y1));
        }
    }

    ColorGrid { dims, cells }
}

fn average_region(image: &RgbaImage, x0: f64, x1: f64, y0: f64, y1: f64) -> Rgb {
    let (width, height) = image.dimensions();
    let mut sum = [0.0f64; 3];
    let mut weight = 0.0f64;

    let px_end = (x1.ceil() as u32).min(width);
    let py_end = (y1.ceil() as u32).min(height);
    for py in (y0.floor() as u32)..py_end {
        let cover_y = overlap(py as f64, y0, y1);
        for px in (x0.floor() as u32)..px_end {
            let cover = cover_y * overlap(px as f64, x0, x1);
            if cover <= 0.0 {
                continue;
            }
            let pixel = image.get_pixel(px, py).0;
            let w = cover * pixel[3] as f64 / 255.0;
            sum[0] += pixel[0] as f64 * w;
            sum[1] += pixel[1] as f64 * w;
            sum[2] += pixel[2] as f64 * w;
            weight += w;
        }
    }

    if weight <= 0.0 {
        return Rgb::default();
    }
    let channel = |value: f64| (value / weight).round().clamp(0.0, 255.0) as u8;
    Rgb::new(channel(sum[0]), channel(sum[1]), channel(sum[2]))
}

/// Length of `[pixel, pixel + 1)` that lies inside `[start, end)`.
fn overlap(pixel: f64, start: f64, end: f64) -> f64 {
    ((pixel + 1.0).min(end) - pixel.max(start)).max(0.0)
}

/// Holds the current image asset and the grid derived from it.
///
/// The grid is rebuilt lazily the first time it is requested at a new
/// resolution or after the image changes; otherwise the cached one is handed
/// out unchanged.
#[derive(Debug, Default)]
pub struct ColorFieldSampler {
    image: Option<Arc<RgbaImage>>,
    cached: Option<ColorGrid>,
}

impl ColorFieldSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes an uploaded image. On failure the previous image stays active.
    pub fn load(&mut self, bytes: &[u8]) -> Result<()> {
        let decoded = image::load_from_memory(bytes)?.into_rgba8();
        tracing::info!(
            width = decoded.width(),
            height = decoded.height(),
            "image asset accepted"
        );
        self.set_image(decoded);
        Ok(())
    }

    pub fn set_image(&mut self, image: RgbaImage) {
        self.image = Some(Arc::new(image));
        self.cached = None;
    }

    pub fn clear(&mut self) {
        self.image = None;
        self.cached = None;
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    /// Color grid at `dims`, or `None` without an image.
    pub fn grid(&mut self, dims: GridDims) -> Option<&ColorGrid> {
        let image = self.image.as_ref()?;
        let stale = self
            .cached
            .as_ref()
            .map(|grid| grid.dims() != dims)
            .unwrap_or(true);
        if stale {
            tracing::debug!(columns = dims.columns, rows = dims.rows, "resampling color grid");
            self.cached = Some(sample(image, dims.columns, dims.rows));
        }
        self.cached.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgba};

    use super::*;

    fn split_image() -> RgbaImage {
        // Left half red, right half blue.
        RgbaImage::from_fn(8, 4, |x, _| {
            if x < 4 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        })
    }

    fn png_bytes(image: &RgbaImage) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn averages_source_regions() {
        let grid = sample(&split_image(), 2, 1);
        assert_eq!(grid.get(0, 0), Some(Rgb::new(255, 0, 0)));
        assert_eq!(grid.get(0, 1), Some(Rgb::new(0, 0, 255)));

        let blended = sample(&split_image(), 1, 1);
        assert_eq!(blended.get(0, 0), Some(Rgb::new(128, 0, 128)));
    }

    #[test]
    fn fractional_regions_are_weighted() {
        // Three columns over eight pixels: the middle one straddles the edge.
        let grid = sample(&split_image(), 3, 1);
        assert_eq!(grid.get(0, 0), Some(Rgb::new(255, 0, 0)));
        let middle = grid.get(0, 1).unwrap();
        assert!((127..=128).contains(&middle.r), "{middle:?}");
        assert!((127..=128).contains(&middle.b), "{middle:?}");
        assert_eq!(middle.g, 0);
        assert_eq!(grid.get(0, 2), Some(Rgb::new(0, 0, 255)));
    }

    #[test]
    fn upsamples_small_images() {
        let tiny = RgbaImage::from_pixel(1, 1, Rgba([10, 20, 30, 255]));
        let grid = sample(&tiny, 84, 40);
        assert_eq!(grid.dims(), GridDims { columns: 84, rows: 40 });
        assert_eq!(grid.get(39, 83), Some(Rgb::new(10, 20, 30)));
        assert_eq!(grid.get(40, 0), None);
    }

    #[test]
    fn sampling_is_deterministic() {
        let image = RgbaImage::from_fn(37, 23, |x, y| {
            Rgba([(x * 7) as u8, (y * 11) as u8, ((x + y) * 3) as u8, 255])
        });
        assert_eq!(sample(&image, 12, 40), sample(&image, 12, 40));
    }

    #[test]
    fn transparent_pixels_average_to_black() {
        let clear = RgbaImage::from_pixel(4, 4, Rgba([200, 200, 200, 0]));
        assert_eq!(sample(&clear, 2, 2).get(1, 1), Some(Rgb::default()));
    }

    #[test]
    fn grid_is_cached_until_resolution_changes() {
        let mut sampler = ColorFieldSampler::new();
        assert!(sampler.grid(GridDims::for_ink_density(7.0)).is_none());

        sampler.load(&png_bytes(&split_image())).unwrap();
        let first = sampler.grid(GridDims::for_ink_density(7.0)).cloned().unwrap();
        assert_eq!(first.dims().columns, 84);

        let resized = sampler.grid(GridDims::for_ink_density(2.0)).cloned().unwrap();
        assert_eq!(resized.dims().columns, 24);
        assert_eq!(resized.dims().rows, 40);

        sampler.clear();
        assert!(sampler.grid(GridDims::for_ink_density(2.0)).is_none());
    }

    #[test]
    fn failed_upload_keeps_previous_image() {
        let mut sampler = ColorFieldSampler::new();
        sampler.load(&png_bytes(&split_image())).unwrap();

        let err = sampler.load(b"definitely not an image").unwrap_err();
        assert!(matches!(err, crate::VisualizerError::ImageLoad(_)));
        assert!(sampler.has_image());
        assert!(sampler.grid(GridDims { columns: 2, rows: 1 }).is_some());
    }
}
