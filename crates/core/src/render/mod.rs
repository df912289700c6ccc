//! Drawing surfaces the engine renders into.

use crate::Rgb;

/// How a draw call combines with what is already on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    /// Plain alpha compositing.
    #[default]
    SourceOver,
    /// `1 - (1 - dst)(1 - src)`. Overlaps brighten, never occlude.
    Screen,
}

/// 2D raster target.
///
/// Coordinates are in surface units with the origin at the top-left corner.
pub trait Canvas {
    /// Current `(width, height)`. Either may be zero before layout.
    fn size(&self) -> (usize, usize);

    fn clear(&mut self, color: Rgb);

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), color: Rgb, alpha: f32);

    fn fill_circle(&mut self, center: (f32, f32), radius: f32, color: Rgb, alpha: f32, blend: BlendMode);

    /// Axis-aligned square of side `side` centered on `center`.
    fn fill_square(&mut self, center: (f32, f32), side: f32, color: Rgb, alpha: f32, blend: BlendMode);
}

/// Recorded draw call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawCommand {
    Clear(Rgb),
    Line {
        from: (f32, f32),
        to: (f32, f32),
        color: Rgb,
        alpha: f32,
    },
    Circle {
        center: (f32, f32),
        radius: f32,
        color: Rgb,
        alpha: f32,
        blend: BlendMode,
    },
    Square {
        center: (f32, f32),
        side: f32,
        color: Rgb,
        alpha: f32,
        blend: BlendMode,
    },
}

/// Canvas that only records what it was asked to draw.
#[derive(Debug, Clone, Default)]
pub struct DrawList {
    width: usize,
    height: usize,
    commands: Vec<DrawCommand>,
}

impl DrawList {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
        }
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn take(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Circles and squares, skipping background work.
    pub fn shapes(&self) -> impl Iterator<Item = &DrawCommand> {
        self.commands
            .iter()
            .filter(|command| matches!(command, DrawCommand::Circle { .. } | DrawCommand::Square { .. }))
    }
}

impl Canvas for DrawList {
    fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn clear(&mut self, color: Rgb) {
        self.commands.push(DrawCommand::Clear(color));
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), color: Rgb, alpha: f32) {
        self.commands.push(DrawCommand::Line {
            from,
            to,
            color,
            alpha,
        });
    }

    fn fill_circle(&mut self, center: (f32, f32), radius: f32, color: Rgb, alpha: f32, blend: BlendMode) {
        self.commands.push(DrawCommand::Circle {
            center,
            radius,
            color,
            alpha,
            blend,
        });
    }

    fn fill_square(&mut self, center: (f32, f32), side: f32, color: Rgb, alpha: f32, blend: BlendMode) {
        self.commands.push(DrawCommand::Square {
            center,
            side,
            color,
            alpha,
            blend,
        });
    }
}

/// Opaque software surface storing RGB channels in `[0, 1]`.
#[derive(Debug, Clone, Default)]
pub struct Raster {
    width: usize,
    height: usize,
    pixels: Vec<[f32; 3]>,
}

impl Raster {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0.0; 3]; width * height],
        }
    }

    /// Resizes the surface, discarding its contents.
    pub fn resize(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.pixels = vec![[0.0; 3]; width * height];
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgb> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let [r, g, b] = self.pixels[y * self.width + x];
        let channel = |value: f32| (value * 255.0).round().clamp(0.0, 255.0) as u8;
        Some(Rgb::new(channel(r), channel(g), channel(b)))
    }

    /// Mean luma over the surface, `0.0` when empty.
    pub fn mean_luma(&self) -> f32 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let total: f32 = self
            .pixels
            .iter()
            .map(|[r, g, b]| 0.2126 * r + 0.7152 * g + 0.0722 * b)
            .sum();
        total / self.pixels.len() as f32
    }

    fn blend_pixel(&mut self, x: usize, y: usize, color: [f32; 3], alpha: f32, blend: BlendMode) {
        let alpha = alpha.clamp(0.0, 1.0);
        if alpha == 0.0 || x >= self.width || y >= self.height {
            return;
        }
        let dst = &mut self.pixels[y * self.width + x];
        for channel in 0..3 {
            let src = color[channel];
            let under = dst[channel];
            let composed = match blend {
                BlendMode::SourceOver => src,
                BlendMode::Screen => 1.0 - (1.0 - under) * (1.0 - src),
            };
            dst[channel] = under + (composed - under) * alpha;
        }
    }

    /// Blends every pixel whose center satisfies `inside` (offsets relative
    /// to `center`). Shapes too small to contain any pixel center deposit
    /// their area into the pixel under `center` instead.
    fn fill_shape(
        &mut self,
        center: (f32, f32),
        extent: f32,
        area: f32,
        color: Rgb,
        alpha: f32,
        blend: BlendMode,
        inside: impl Fn(f32, f32) -> bool,
    ) {
        let finite = extent.is_finite() && center.0.is_finite() && center.1.is_finite();
        if self.width == 0 || self.height == 0 || !finite {
            return;
        }
        let rgb = color.to_unit();
        let x0 = (center.0 - extent).floor().max(0.0) as usize;
        let y0 = (center.1 - extent).floor().max(0.0) as usize;
        let x1 = ((center.0 + extent).ceil().max(0.0) as usize).min(self.width);
        let y1 = ((center.1 + extent).ceil().max(0.0) as usize).min(self.height);

        let mut hit = false;
        for y in y0..y1 {
            for x in x0..x1 {
                if inside(x as f32 + 0.5 - center.0, y as f32 + 0.5 - center.1) {
                    self.blend_pixel(x, y, rgb, alpha, blend);
                    hit = true;
                }
            }
        }

        if !hit && area < 1.0 {
            let x = center.0.floor();
            let y = center.1.floor();
            if x >= 0.0 && y >= 0.0 {
                self.blend_pixel(x as usize, y as usize, rgb, alpha * area, blend);
            }
        }
    }
}

impl Canvas for Raster {
    fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn clear(&mut self, color: Rgb) {
        let rgb = color.to_unit();
        self.pixels.iter_mut().for_each(|pixel| *pixel = rgb);
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), color: Rgb, alpha: f32) {
        let rgb = color.to_unit();
        let dx = to.0 - from.0;
        let dy = to.1 - from.1;
        let steps = dx.abs().max(dy.abs()).ceil();
        if !steps.is_finite() {
            return;
        }
        let steps = steps.max(1.0) as usize;
        for step in 0..=steps {
            let t = step as f32 / steps as f32;
            let x = from.0 + dx * t;
            let y = from.1 + dy * t;
            if x >= 0.0 && y >= 0.0 {
                self.blend_pixel(x as usize, y as usize, rgb, alpha, BlendMode::SourceOver);
            }
        }
    }

    fn fill_circle(&mut self, center: (f32, f32), radius: f32, color: Rgb, alpha: f32, blend: BlendMode) {
        let radius = radius.max(0.0);
        let area = std::f32::consts::PI * radius * radius;
        let limit = radius * radius;
        self.fill_shape(center, radius, area, color, alpha, blend, |dx, dy| {
            dx * dx + dy * dy <= limit
        });
    }

    fn fill_square(&mut self, center: (f32, f32), side: f32, color: Rgb, alpha: f32, blend: BlendMode) {
        let half = side.max(0.0) / 2.0;
        self.fill_shape(center, half, side * side, color, alpha, blend, |dx, dy| {
            dx.abs() <= half && dy.abs() <= half
        });
    }
}
