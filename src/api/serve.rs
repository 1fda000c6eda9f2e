//! Byte-serving responders with conditional-GET and range support.

use std::io::Cursor;

use chrono::{DateTime, Utc};
use rocket::http::{ContentType, Header, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use sha1::{Digest, Sha1};

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

pub fn http_date(time: &DateTime<Utc>) -> String {
    time.format(HTTP_DATE).to_string()
}

pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

/// Strong ETag over the request path, quoted per RFC 7232.
pub fn etag_for(path: &str) -> String {
    format!("\"{:x}\"", Sha1::digest(path.as_bytes()))
}

/// True when the conditional headers say the client's copy is current.
/// `If-None-Match` wins over `If-Modified-Since`.
fn not_modified(req: &Request<'_>, etag: &str, mod_time: &DateTime<Utc>) -> bool {
    let headers = req.headers();

    if let Some(candidates) = headers.get_one("If-None-Match") {
        return candidates
            .split(',')
            .any(|c| c.trim() == etag || c.trim() == "*");
    }

    if let Some(since) = headers.get_one("If-Modified-Since") {
        if let Some(since) = parse_http_date(since) {
            return mod_time.timestamp() <= since.timestamp();
        }
    }

    false
}

/// A single `bytes=` range resolved against a body length.
#[derive(Debug, PartialEq, Eq)]
enum RangeOutcome {
    /// No Range header, or one we choose to ignore (multipart).
    Whole,
    Partial { from: usize, to: usize },
    Unsatisfiable,
}

fn resolve_range(header: Option<&str>, len: usize) -> RangeOutcome {
    let spec = match header.and_then(|h| h.strip_prefix("bytes=")) {
        Some(spec) => spec,
        None => return RangeOutcome::Whole,
    };

    // Multipart ranges are not supported; serving the whole body is a
    // valid response to any Range request.
    if spec.contains(',') {
        return RangeOutcome::Whole;
    }

    let (start, end) = match spec.split_once('-') {
        Some(pair) => pair,
        None => return RangeOutcome::Whole,
    };

    let (from, to) = if start.is_empty() {
        // Suffix form: the final n bytes.
        let n: usize = match end.parse() {
            Ok(n) => n,
            Err(_) => return RangeOutcome::Whole,
        };
        if n == 0 || n > len {
            return RangeOutcome::Unsatisfiable;
        }
        (len - n, len - 1)
    } else {
        let from: usize = match start.parse() {
            Ok(from) => from,
            Err(_) => return RangeOutcome::Whole,
        };
        let to = match end.parse::<usize>() {
            Ok(to) => to,
            Err(_) if end.is_empty() => len.saturating_sub(1),
            Err(_) => return RangeOutcome::Whole,
        };
        (from, to)
    };

    if from > to || to >= len {
        return RangeOutcome::Unsatisfiable;
    }

    RangeOutcome::Partial { from, to }
}

/// An encoded derivative ready for the wire.
pub struct ImageResponse {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub mod_time: DateTime<Utc>,
    pub etag: String,
    pub filename: String,
    pub attachment: bool,
}

impl<'r> Responder<'r, 'static> for ImageResponse {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let mut response = Response::build();
        response.header(Header::new("Accept-Ranges", "bytes"));
        response.header(Header::new("ETag", self.etag.clone()));
        response.header(Header::new("Last-Modified", http_date(&self.mod_time)));

        if not_modified(req, &self.etag, &self.mod_time) {
            response.status(Status::NotModified);
            return response.ok();
        }

        // The original spelled it "attachement"; clients cope.
        let disposition = if self.attachment { "attachement" } else { "inline" };
        response.header(Header::new(
            "Content-Disposition",
            format!("{}; filename={}", disposition, self.filename),
        ));
        response.header(Header::new("Content-Type", self.content_type));

        let len = self.bytes.len();
        match resolve_range(req.headers().get_one("Range"), len) {
            RangeOutcome::Whole => {
                response.sized_body(len, Cursor::new(self.bytes));
            }
            RangeOutcome::Partial { from, to } => {
                response.status(Status::PartialContent);
                response.header(Header::new(
                    "Content-Range",
                    format!("bytes {}-{}/{}", from, to, len),
                ));
                response.sized_body(to - from + 1, Cursor::new(self.bytes[from..=to].to_vec()));
            }
            RangeOutcome::Unsatisfiable => {
                response.status(Status::RangeNotSatisfiable);
                response.header(Header::new("Content-Range", format!("bytes */{}", len)));
            }
        }

        response.ok()
    }
}

/// The `info.json` document with its caching headers.
pub struct InfoResponse {
    pub body: Vec<u8>,
    pub mod_time: DateTime<Utc>,
    pub etag: String,
    pub max_age: u64,
}

impl<'r> Responder<'r, 'static> for InfoResponse {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let mut response = Response::build();
        response.header(Header::new("Accept-Ranges", "bytes"));
        response.header(Header::new("ETag", self.etag.clone()));
        response.header(Header::new("Last-Modified", http_date(&self.mod_time)));
        response.header(Header::new(
            "Cache-Control",
            format!("max-age={}, public", self.max_age),
        ));
        response.header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, HEAD, OPTIONS",
        ));

        if not_modified(req, &self.etag, &self.mod_time) {
            response.status(Status::NotModified);
            return response.ok();
        }

        let accept = req.headers().get_one("Accept").unwrap_or("");
        if accept.contains("application/ld+json") {
            response.header(ContentType::new("application", "ld+json"));
        } else {
            response.header(ContentType::JSON);
        }

        response.sized_body(self.body.len(), Cursor::new(self.body));
        response.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn http_dates_round_trip() {
        let time = Utc.with_ymd_and_hms(2017, 5, 4, 12, 30, 45).unwrap();
        let formatted = http_date(&time);
        assert_eq!(formatted, "Thu, 04 May 2017 12:30:45 GMT");
        assert_eq!(parse_http_date(&formatted), Some(time));
        assert_eq!(parse_http_date("not a date"), None);
    }

    #[test]
    fn etags_are_quoted_sha1_hex() {
        let etag = etag_for("/lena.jpg/info.json");
        assert!(etag.starts_with('"') && etag.ends_with('"'));
        assert_eq!(etag.len(), 42);
        assert_eq!(etag, etag_for("/lena.jpg/info.json"));
        assert_ne!(etag, etag_for("/other.jpg/info.json"));
    }

    #[test]
    fn ranges_resolve() {
        assert_eq!(resolve_range(None, 100), RangeOutcome::Whole);
        assert_eq!(
            resolve_range(Some("bytes=0-9"), 100),
            RangeOutcome::Partial { from: 0, to: 9 }
        );
        assert_eq!(
            resolve_range(Some("bytes=10-"), 100),
            RangeOutcome::Partial { from: 10, to: 99 }
        );
        assert_eq!(
            resolve_range(Some("bytes=-10"), 100),
            RangeOutcome::Partial { from: 90, to: 99 }
        );
        assert_eq!(
            resolve_range(Some("bytes=90-110"), 100),
            RangeOutcome::Unsatisfiable
        );
        assert_eq!(
            resolve_range(Some("bytes=50-40"), 100),
            RangeOutcome::Unsatisfiable
        );
        assert_eq!(
            resolve_range(Some("bytes=-200"), 100),
            RangeOutcome::Unsatisfiable
        );
        // Multipart ranges are ignored rather than honored.
        assert_eq!(resolve_range(Some("bytes=0-1,5-6"), 100), RangeOutcome::Whole);
        assert_eq!(resolve_range(Some("chunks=0-1"), 100), RangeOutcome::Whole);
    }
}
