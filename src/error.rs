use rocket::http::Status;
use thiserror::Error;

/// Everything a request can fail with, mapped onto the HTTP status space.
///
/// Variants carry rendered text rather than source errors so that values
/// stay `Clone`: a cache loader's failure is broadcast to every waiter of
/// the same key.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("IIIF 2.1 `region` argument is not recognized: {0:?}")]
    Region(String),

    #[error("IIIF 2.1 `size` argument is not recognized: {0:?}")]
    Size(String),

    #[error("the given `size` is out of the limits {max_width}x{max_height} (or area {max_area})")]
    MaxSize {
        max_width: u32,
        max_height: u32,
        max_area: u64,
    },

    #[error("IIIF 2.1 `rotation` argument is not recognized: {0:?}")]
    Rotation(String),

    #[error("cannot rotate by an angle that isn't a multiple of 90: {0:?}")]
    RotationUnsupported(String),

    #[error("IIIF 2.1 `quality` argument is not recognized: {0:?}")]
    Quality(String),

    #[error("the `bitonal` quality is not available")]
    QualityUnsupported,

    #[error("IIIF 2.1 `format` argument is not yet recognized: {0:?}")]
    Format(String),

    #[error("cannot output the format {0:?} as of yet")]
    FormatUnsupported(String),

    #[error("cannot read the format {0:?} as of yet")]
    FormatReadUnsupported(String),

    #[error("cannot open this file: {0:?}")]
    Unreadable(String),

    #[error("image not found: {0:?}")]
    NotFound(String),

    #[error("upstream returned {status} for {url:?}")]
    Upstream { status: u16, url: String },

    #[error("the image couldn't be processed: {0}")]
    Internal(String),
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Error::Region(_)
            | Error::Size(_)
            | Error::MaxSize { .. }
            | Error::Rotation(_)
            | Error::Quality(_)
            | Error::Format(_)
            | Error::Unreadable(_) => Status::BadRequest,
            Error::RotationUnsupported(_)
            | Error::QualityUnsupported
            | Error::FormatUnsupported(_)
            | Error::FormatReadUnsupported(_) => Status::NotImplemented,
            Error::NotFound(_) => Status::NotFound,
            Error::Upstream { status, .. } => {
                Status::from_code(*status).unwrap_or(Status::BadGateway)
            }
            Error::Internal(_) => Status::InternalServerError,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(Error::Region("x".into()).status(), Status::BadRequest);
        assert_eq!(
            Error::RotationUnsupported("1".into()).status(),
            Status::NotImplemented
        );
        assert_eq!(Error::NotFound("a.png".into()).status(), Status::NotFound);
        assert_eq!(
            Error::Upstream {
                status: 404,
                url: "http://example/missing.png".into()
            }
            .status(),
            Status::NotFound
        );
        assert_eq!(
            Error::Upstream {
                status: 503,
                url: "http://example/x.png".into()
            }
            .status(),
            Status::ServiceUnavailable
        );
        assert_eq!(Error::Internal("boom".into()).status(), Status::InternalServerError);
    }
}
