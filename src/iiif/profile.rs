//! The `info.json` document: image technical properties as JSON-LD.

use serde::Serialize;

use crate::config::AppConfig;

const CONTEXT: &str = "http://iiif.io/api/image/2/context.json";
const PROTOCOL: &str = "http://iiif.io/api/image";
const LEVEL2: &str = "http://iiif.io/api/image/2/level2.json";

/// Everything level 2 requires plus the extensions this service ships
/// (`regionSmart` mirrors the non-standard `smart` region).
const SUPPORTS: &[&str] = &[
    "cors",
    "jsonldMediaType",
    "mirroring",
    "regionByPct",
    "regionByPx",
    "regionSquare",
    "regionSmart",
    "rotationBy90s",
    "sizeAboveFull",
    "sizeByConfinedWh",
    "sizeByDistortedWh",
    "sizeByH",
    "sizeByPct",
    "sizeByW",
    "sizeByWh",
];

#[derive(Debug, Serialize)]
pub struct ImageInfo {
    #[serde(rename = "@context")]
    pub context: &'static str,
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub type_: &'static str,
    pub protocol: &'static str,
    pub width: u32,
    pub height: u32,
    /// A compliance level URI followed by the service's own profile.
    pub profile: (&'static str, ImageProfile),
}

#[derive(Debug, Serialize)]
pub struct ImageProfile {
    #[serde(rename = "@context")]
    pub context: &'static str,
    #[serde(rename = "@type")]
    pub type_: &'static str,
    pub formats: &'static [&'static str],
    pub qualities: &'static [&'static str],
    #[serde(rename = "maxWidth", skip_serializing_if = "is_zero_u32")]
    pub max_width: u32,
    #[serde(rename = "maxHeight", skip_serializing_if = "is_zero_u32")]
    pub max_height: u32,
    #[serde(rename = "maxArea", skip_serializing_if = "is_zero_u64")]
    pub max_area: u64,
    pub supports: &'static [&'static str],
}

fn is_zero_u32(value: &u32) -> bool {
    *value == 0
}

fn is_zero_u64(value: &u64) -> bool {
    *value == 0
}

impl ImageInfo {
    pub fn new(
        scheme: &str,
        host: &str,
        identifier: &str,
        width: u32,
        height: u32,
        config: &AppConfig,
    ) -> Self {
        Self {
            context: CONTEXT,
            id: format!("{}://{}/{}", scheme, host, identifier),
            type_: "iiif:Image",
            protocol: PROTOCOL,
            width,
            height,
            profile: (
                LEVEL2,
                ImageProfile {
                    context: CONTEXT,
                    type_: "iiif:ImageProfile",
                    formats: &["jpg", "png", "tif", "webp"],
                    qualities: &["gray", "default"],
                    max_width: config.max_width,
                    max_height: config.max_height,
                    max_area: config.max_area,
                    supports: SUPPORTS,
                },
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(config: &AppConfig) -> serde_json::Value {
        let info = ImageInfo::new("https", "example.org", "images/test.png", 600, 400, config);
        serde_json::to_value(&info).unwrap()
    }

    #[test]
    fn document_shape() {
        let value = info(&AppConfig::default());

        assert_eq!(value["@context"], CONTEXT);
        assert_eq!(value["@id"], "https://example.org/images/test.png");
        assert_eq!(value["@type"], "iiif:Image");
        assert_eq!(value["protocol"], PROTOCOL);
        assert_eq!(value["width"], 600);
        assert_eq!(value["height"], 400);

        let profile = value["profile"].as_array().unwrap();
        assert_eq!(profile[0], LEVEL2);
        assert_eq!(profile[1]["@type"], "iiif:ImageProfile");
        assert_eq!(
            profile[1]["formats"],
            serde_json::json!(["jpg", "png", "tif", "webp"])
        );
        assert_eq!(profile[1]["qualities"], serde_json::json!(["gray", "default"]));
    }

    #[test]
    fn unlimited_maxima_are_omitted() {
        let value = info(&AppConfig::default());
        let profile = &value["profile"][1];
        assert!(profile.get("maxWidth").is_none());
        assert!(profile.get("maxHeight").is_none());
        assert!(profile.get("maxArea").is_none());
    }

    #[test]
    fn configured_maxima_are_published() {
        let config = AppConfig {
            max_width: 2000,
            max_height: 3000,
            max_area: 5_000_000,
            ..AppConfig::default()
        };
        let value = info(&config);
        let profile = &value["profile"][1];
        assert_eq!(profile["maxWidth"], 2000);
        assert_eq!(profile["maxHeight"], 3000);
        assert_eq!(profile["maxArea"], 5_000_000);
    }

    #[test]
    fn smart_region_support_is_advertised() {
        let value = info(&AppConfig::default());
        let supports = value["profile"][1]["supports"].as_array().unwrap();
        assert!(supports.contains(&serde_json::json!("regionSmart")));
        assert!(supports.contains(&serde_json::json!("rotationBy90s")));
        assert!(supports.contains(&serde_json::json!("mirroring")));
    }
}
