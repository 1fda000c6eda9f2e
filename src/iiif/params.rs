//! Strict parsing of the five IIIF 2.1 request segments.
//!
//! Grammar failures are 400s naming the offending segment; features the
//! service knows about but does not implement (arbitrary rotation, bitonal
//! quality, some formats) are 501s. Bounds that depend on the source
//! dimensions are left to the planner.

use crate::codec::OutputFormat;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum RegionSpec {
    Full,
    Square,
    /// Extension: like `square` but with the backend's feature gravity.
    Smart,
    Pixels { x: u32, y: u32, w: u32, h: u32 },
    Percent { x: f64, y: f64, w: f64, h: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SizeSpec {
    Max,
    /// `pct:p`, p > 0. May exceed 100 (sizeAboveFull).
    PctScale(f64),
    /// `w,h`: stretch to exactly those dimensions.
    Force { w: u32, h: u32 },
    /// `!w,h`: fit within the box, preserving aspect.
    ConfinedFit { w: u32, h: u32 },
    /// `w,`: width fixed, height follows aspect.
    ForceWidth(u32),
    /// `,h`: height fixed, width follows aspect.
    ForceHeight(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationSpec {
    /// Mirror on the vertical axis, applied before the rotation.
    pub flip: bool,
    /// Degrees clockwise, already reduced to one of 0, 90, 180, 270.
    pub angle: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualitySpec {
    /// `color`, `default` and `native` all mean "leave it alone".
    Default,
    Gray,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformDescriptor {
    pub region: RegionSpec,
    pub size: SizeSpec,
    pub rotation: RotationSpec,
    pub quality: QualitySpec,
    pub format: OutputFormat,
}

impl TransformDescriptor {
    pub fn parse(
        region: &str,
        size: &str,
        rotation: &str,
        quality: &str,
        format: &str,
    ) -> Result<Self> {
        Ok(Self {
            region: parse_region(region)?,
            size: parse_size(size)?,
            rotation: parse_rotation(rotation)?,
            quality: parse_quality(quality)?,
            format: parse_format(format)?,
        })
    }
}

fn parse_region(region: &str) -> Result<RegionSpec> {
    match region {
        "full" => return Ok(RegionSpec::Full),
        "square" => return Ok(RegionSpec::Square),
        "smart" => return Ok(RegionSpec::Smart),
        _ => {}
    }

    let bad = || Error::Region(region.to_string());

    if let Some(rest) = region.strip_prefix("pct:") {
        let parts: Vec<&str> = rest.split(',').collect();
        if parts.len() != 4 {
            return Err(bad());
        }
        let mut values = [0f64; 4];
        for (i, part) in parts.iter().enumerate() {
            values[i] = part.parse().map_err(|_| bad())?;
        }
        let [x, y, w, h] = values;
        if x < 0.0 || y < 0.0 || w <= 0.0 || h <= 0.0 {
            return Err(bad());
        }
        if x > 100.0 || y > 100.0 || w > 100.0 || h > 100.0 {
            return Err(bad());
        }
        return Ok(RegionSpec::Percent { x, y, w, h });
    }

    let parts: Vec<&str> = region.split(',').collect();
    if parts.len() != 4 {
        return Err(bad());
    }
    let mut values = [0u32; 4];
    for (i, part) in parts.iter().enumerate() {
        values[i] = part.parse().map_err(|_| bad())?;
    }
    let [x, y, w, h] = values;
    if w == 0 || h == 0 {
        return Err(bad());
    }
    Ok(RegionSpec::Pixels { x, y, w, h })
}

fn parse_size(size: &str) -> Result<SizeSpec> {
    if size == "max" || size == "full" {
        return Ok(SizeSpec::Max);
    }

    let bad = || Error::Size(size.to_string());

    if let Some(rest) = size.strip_prefix("pct:") {
        let pct: f64 = rest.parse().map_err(|_| bad())?;
        if pct <= 0.0 {
            return Err(bad());
        }
        return Ok(SizeSpec::PctScale(pct));
    }

    let confined = size.starts_with('!');
    let trimmed = size.trim_start_matches('!');

    let (w, h) = match trimmed.split_once(',') {
        Some(pair) => pair,
        None => return Err(bad()),
    };
    if h.contains(',') {
        return Err(bad());
    }

    match (w.is_empty(), h.is_empty()) {
        (false, false) => {
            let w: u32 = w.parse().map_err(|_| bad())?;
            let h: u32 = h.parse().map_err(|_| bad())?;
            if w == 0 || h == 0 {
                return Err(bad());
            }
            if confined {
                Ok(SizeSpec::ConfinedFit { w, h })
            } else {
                Ok(SizeSpec::Force { w, h })
            }
        }
        (false, true) if !confined => {
            let w: u32 = w.parse().map_err(|_| bad())?;
            if w == 0 {
                return Err(bad());
            }
            Ok(SizeSpec::ForceWidth(w))
        }
        (true, false) if !confined => {
            let h: u32 = h.parse().map_err(|_| bad())?;
            if h == 0 {
                return Err(bad());
            }
            Ok(SizeSpec::ForceHeight(h))
        }
        _ => Err(bad()),
    }
}

fn parse_rotation(rotation: &str) -> Result<RotationSpec> {
    let flip = rotation.starts_with('!');
    let digits = rotation.trim_start_matches('!');

    let angle: i64 = digits
        .parse()
        .map_err(|_| Error::Rotation(rotation.to_string()))?;

    let angle = angle.rem_euclid(360);
    if angle % 90 != 0 {
        return Err(Error::RotationUnsupported(rotation.to_string()));
    }

    Ok(RotationSpec {
        flip,
        angle: angle as i32,
    })
}

fn parse_quality(quality: &str) -> Result<QualitySpec> {
    match quality {
        "color" | "default" | "native" => Ok(QualitySpec::Default),
        "gray" => Ok(QualitySpec::Gray),
        "bitonal" => Err(Error::QualityUnsupported),
        other => Err(Error::Quality(other.to_string())),
    }
}

fn parse_format(format: &str) -> Result<OutputFormat> {
    let format = OutputFormat::from_extension(format)?;
    if !format.is_save_supported() {
        return Err(Error::FormatUnsupported(format!("{:?}", format).to_lowercase()));
    }
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_keywords() {
        assert_eq!(parse_region("full"), Ok(RegionSpec::Full));
        assert_eq!(parse_region("square"), Ok(RegionSpec::Square));
        assert_eq!(parse_region("smart"), Ok(RegionSpec::Smart));
    }

    #[test]
    fn region_pixels() {
        assert_eq!(
            parse_region("84,318,1000,2000"),
            Ok(RegionSpec::Pixels { x: 84, y: 318, w: 1000, h: 2000 })
        );
        assert!(parse_region("10").is_err());
        assert!(parse_region("10,10").is_err());
        assert!(parse_region("10,10,10").is_err());
        assert!(parse_region("10,10,10,10,10").is_err());
        assert!(parse_region("-10,10,10,10").is_err());
        assert!(parse_region("10,10,0,0").is_err());
        assert!(parse_region("a,b,c,d").is_err());
        assert!(parse_region("10,10,10,").is_err());
    }

    #[test]
    fn region_percent() {
        assert_eq!(
            parse_region("pct:10,10,80,80"),
            Ok(RegionSpec::Percent { x: 10.0, y: 10.0, w: 80.0, h: 80.0 })
        );
        assert_eq!(
            parse_region("pct:0,0,100,100"),
            Ok(RegionSpec::Percent { x: 0.0, y: 0.0, w: 100.0, h: 100.0 })
        );
        assert!(parse_region("pct:10,10,80").is_err());
        assert!(parse_region("pct:-1,0,50,50").is_err());
        assert!(parse_region("pct:0,0,0,50").is_err());
        assert!(parse_region("pct:0,0,101,50").is_err());
        assert!(parse_region("frac:0,0,50,50").is_err());
    }

    #[test]
    fn size_keywords_and_pct() {
        assert_eq!(parse_size("max"), Ok(SizeSpec::Max));
        assert_eq!(parse_size("full"), Ok(SizeSpec::Max));
        assert_eq!(parse_size("pct:50"), Ok(SizeSpec::PctScale(50.0)));
        assert_eq!(parse_size("pct:150"), Ok(SizeSpec::PctScale(150.0)));
        assert!(parse_size("pct:0").is_err());
        assert!(parse_size("pct:-1").is_err());
        assert!(parse_size("pct:").is_err());
    }

    #[test]
    fn size_dimensions() {
        assert_eq!(parse_size("400,300"), Ok(SizeSpec::Force { w: 400, h: 300 }));
        assert_eq!(
            parse_size("!400,300"),
            Ok(SizeSpec::ConfinedFit { w: 400, h: 300 })
        );
        assert_eq!(parse_size("400,"), Ok(SizeSpec::ForceWidth(400)));
        assert_eq!(parse_size(",300"), Ok(SizeSpec::ForceHeight(300)));
        assert!(parse_size("10").is_err());
        assert!(parse_size("0,0").is_err());
        assert!(parse_size("0,300").is_err());
        assert!(parse_size(",").is_err());
        assert!(parse_size("!400,").is_err());
        assert!(parse_size("a,b").is_err());
        assert!(parse_size("10,10,10").is_err());
    }

    #[test]
    fn rotation_grammar() {
        assert_eq!(
            parse_rotation("0"),
            Ok(RotationSpec { flip: false, angle: 0 })
        );
        assert_eq!(
            parse_rotation("!90"),
            Ok(RotationSpec { flip: true, angle: 90 })
        );
        assert_eq!(
            parse_rotation("360"),
            Ok(RotationSpec { flip: false, angle: 0 })
        );
        assert_eq!(
            parse_rotation("450"),
            Ok(RotationSpec { flip: false, angle: 90 })
        );
        assert_eq!(
            parse_rotation("-90"),
            Ok(RotationSpec { flip: false, angle: 270 })
        );
        assert!(matches!(parse_rotation("flip"), Err(Error::Rotation(_))));
        assert!(matches!(
            parse_rotation("1"),
            Err(Error::RotationUnsupported(_))
        ));
        assert!(matches!(
            parse_rotation("45"),
            Err(Error::RotationUnsupported(_))
        ));
    }

    #[test]
    fn quality_grammar() {
        assert_eq!(parse_quality("color"), Ok(QualitySpec::Default));
        assert_eq!(parse_quality("default"), Ok(QualitySpec::Default));
        assert_eq!(parse_quality("native"), Ok(QualitySpec::Default));
        assert_eq!(parse_quality("gray"), Ok(QualitySpec::Gray));
        assert_eq!(parse_quality("bitonal"), Err(Error::QualityUnsupported));
        assert!(matches!(parse_quality("sepia"), Err(Error::Quality(_))));
    }

    #[test]
    fn full_descriptor() {
        let desc =
            TransformDescriptor::parse("full", "!400,300", "!90", "gray", "png").unwrap();
        assert_eq!(desc.region, RegionSpec::Full);
        assert_eq!(desc.size, SizeSpec::ConfinedFit { w: 400, h: 300 });
        assert_eq!(desc.rotation, RotationSpec { flip: true, angle: 90 });
        assert_eq!(desc.quality, QualitySpec::Gray);
        assert_eq!(desc.format, OutputFormat::Png);
    }
}
