//! Turns a parsed descriptor plus the decoded source dimensions into the
//! two backend passes: one fused crop/resize/colorspace/encode pass and an
//! optional flip/rotate pass.
//!
//! All percent math floors. Configured maxima reject explicit sizes with a
//! 400 and silently scale `max` requests down by the tightest of the three
//! ratios (width, height, sqrt of area).

use image::DynamicImage;

use crate::codec::{self, Gravity, Rect, RotateParams, TransformParams};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::iiif::params::{QualitySpec, RegionSpec, SizeSpec, TransformDescriptor};

/// The configured output limits; zero means unlimited.
#[derive(Debug, Clone, Copy, Default)]
pub struct Maxima {
    pub width: u32,
    pub height: u32,
    pub area: u64,
}

impl Maxima {
    pub fn unlimited() -> Self {
        Self::default()
    }
}

impl From<&AppConfig> for Maxima {
    fn from(config: &AppConfig) -> Self {
        Self {
            width: config.max_width,
            height: config.max_height,
            area: config.max_area,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformPlan {
    pub pass1: TransformParams,
    pub pass2: RotateParams,
}

impl TransformPlan {
    /// Dimensions of the final image, after the rotation pass.
    pub fn output_dimensions(&self) -> (u32, u32) {
        let (w, h) = (self.pass1.width, self.pass1.height);
        if self.pass2.angle == 90 || self.pass2.angle == 270 {
            (h, w)
        } else {
            (w, h)
        }
    }
}

/// Floors, with a tiny epsilon so ratios that should cancel exactly
/// (e.g. 2318 · (300/2318)) don't land one pixel short.
fn scaled(value: f64) -> u32 {
    ((value + 1e-9).floor() as u32).max(1)
}

pub fn plan(
    desc: &TransformDescriptor,
    src_w: u32,
    src_h: u32,
    maxima: &Maxima,
) -> Result<TransformPlan> {
    if !desc.format.is_save_supported() {
        return Err(Error::FormatUnsupported(
            format!("{:?}", desc.format).to_lowercase(),
        ));
    }

    let (rect, gravity) = resolve_region(&desc.region, src_w, src_h)?;
    let (out_w, out_h) = resolve_size(&desc.size, rect.w, rect.h, maxima)?;

    let full_rect = Rect { x: 0, y: 0, w: src_w, h: src_h };
    let full_extent = rect == full_rect;

    Ok(TransformPlan {
        pass1: TransformParams {
            crop: if full_extent { None } else { Some(rect) },
            gravity,
            width: out_w,
            height: out_h,
            grayscale: desc.quality == QualitySpec::Gray,
            format: desc.format,
        },
        pass2: RotateParams {
            flip: desc.rotation.flip,
            angle: desc.rotation.angle,
        },
    })
}

/// Runs both passes against a decoded source and exports encoded bytes.
pub fn render(img: DynamicImage, plan: &TransformPlan) -> Result<Vec<u8>> {
    let img = codec::process(img, &plan.pass1);
    let img = if plan.pass2.is_identity() {
        img
    } else {
        codec::rotate(img, &plan.pass2)
    };
    codec::encode(&img, plan.pass1.format)
}

fn resolve_region(region: &RegionSpec, src_w: u32, src_h: u32) -> Result<(Rect, Gravity)> {
    match region {
        RegionSpec::Full => Ok((Rect { x: 0, y: 0, w: src_w, h: src_h }, Gravity::Centre)),
        RegionSpec::Square | RegionSpec::Smart => {
            let side = src_w.min(src_h);
            let rect = Rect {
                x: (src_w - side) / 2,
                y: (src_h - side) / 2,
                w: side,
                h: side,
            };
            let gravity = if matches!(region, RegionSpec::Smart) {
                Gravity::Smart
            } else {
                Gravity::Centre
            };
            Ok((rect, gravity))
        }
        RegionSpec::Pixels { x, y, w, h } => {
            if u64::from(*x) + u64::from(*w) > u64::from(src_w)
                || u64::from(*y) + u64::from(*h) > u64::from(src_h)
            {
                return Err(Error::Region(format!("{},{},{},{}", x, y, w, h)));
            }
            Ok((Rect { x: *x, y: *y, w: *w, h: *h }, Gravity::Centre))
        }
        RegionSpec::Percent { x, y, w, h } => {
            let rect = Rect {
                x: (src_w as f64 * x / 100.0).floor() as u32,
                y: (src_h as f64 * y / 100.0).floor() as u32,
                w: (src_w as f64 * w / 100.0).floor() as u32,
                h: (src_h as f64 * h / 100.0).floor() as u32,
            };
            if rect.w == 0 || rect.h == 0 || rect.x + rect.w > src_w || rect.y + rect.h > src_h
            {
                return Err(Error::Region(format!("pct:{},{},{},{}", x, y, w, h)));
            }
            Ok((rect, Gravity::Centre))
        }
    }
}

/// Applies the size spec to the selected region, then the maxima: explicit
/// sizes over a limit are rejected, `max` is scaled down silently and never
/// upscales beyond the region.
fn resolve_size(
    size: &SizeSpec,
    region_w: u32,
    region_h: u32,
    maxima: &Maxima,
) -> Result<(u32, u32)> {
    let (rw, rh) = (region_w as f64, region_h as f64);

    let (out_w, out_h) = match size {
        SizeSpec::Max => {
            let (w, h) = clamp_to_maxima(region_w, region_h, maxima);
            return Ok((w, h));
        }
        SizeSpec::PctScale(p) => (scaled(rw * p / 100.0), scaled(rh * p / 100.0)),
        SizeSpec::Force { w, h } => (*w, *h),
        SizeSpec::ConfinedFit { w, h } => {
            let ratio = (*w as f64 / rw).min(*h as f64 / rh);
            (scaled(rw * ratio), scaled(rh * ratio))
        }
        SizeSpec::ForceWidth(w) => (*w, scaled(*w as f64 * rh / rw)),
        SizeSpec::ForceHeight(h) => (scaled(*h as f64 * rw / rh), *h),
    };

    let over_width = maxima.width > 0 && out_w > maxima.width;
    let over_height = maxima.height > 0 && out_h > maxima.height;
    let over_area = maxima.area > 0 && u64::from(out_w) * u64::from(out_h) > maxima.area;

    if over_width || over_height || over_area {
        return Err(Error::MaxSize {
            max_width: maxima.width,
            max_height: maxima.height,
            max_area: maxima.area,
        });
    }

    Ok((out_w, out_h))
}

fn clamp_to_maxima(w: u32, h: u32, maxima: &Maxima) -> (u32, u32) {
    let mut ratio = 1.0f64;

    if maxima.width > 0 && w > maxima.width {
        ratio = ratio.min(maxima.width as f64 / w as f64);
    }
    if maxima.height > 0 && h > maxima.height {
        ratio = ratio.min(maxima.height as f64 / h as f64);
    }
    let area = u64::from(w) * u64::from(h);
    if maxima.area > 0 && area > maxima.area {
        ratio = ratio.min((maxima.area as f64 / area as f64).sqrt());
    }

    if ratio >= 1.0 {
        (w, h)
    } else {
        (scaled(w as f64 * ratio), scaled(h as f64 * ratio))
    }
}
