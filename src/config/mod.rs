use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ByteSizeError {
    #[error("empty byte-size value")]
    Empty,
    #[error("invalid byte-size value: {0:?}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub templates: String,
    pub images: String,
    /// 0 means unlimited, as do the two below.
    pub max_width: u32,
    pub max_height: u32,
    pub max_area: u64,
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// HTTP max-age, in seconds.
    pub http: u64,
    /// Source group budget, e.g. "128MB".
    pub images: String,
    /// Derivative group budget.
    pub thumbnails: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            templates: "templates".to_string(),
            images: "public".to_string(),
            max_width: 0,
            max_height: 0,
            max_area: 0,
            cache: CacheConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            http: 3600,
            images: "128MB".to_string(),
            thumbnails: "64MB".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn images_size(&self) -> usize {
        parse_bytes(&self.images).unwrap_or(128 << 20)
    }

    pub fn thumbnails_size(&self) -> usize {
        parse_bytes(&self.thumbnails).unwrap_or(64 << 20)
    }
}

/// Parses a human byte-size string ("64K", "128MB", "1GiB") into bytes.
///
/// Suffixes are 1024-based whether spelled SI or IEC, matching the
/// `bytefmt` convention the configuration format comes from.
pub fn parse_bytes(value: &str) -> Result<usize, ByteSizeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ByteSizeError::Empty);
    }

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);

    let number: f64 = number
        .parse()
        .map_err(|_| ByteSizeError::Invalid(value.to_string()))?;

    let multiplier: u64 = match suffix.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1 << 10,
        "M" | "MB" | "MIB" => 1 << 20,
        "G" | "GB" | "GIB" => 1 << 30,
        "T" | "TB" | "TIB" => 1 << 40,
        _ => return Err(ByteSizeError::Invalid(value.to_string())),
    };

    if number < 0.0 {
        return Err(ByteSizeError::Invalid(value.to_string()));
    }

    Ok((number * multiplier as f64) as usize)
}
