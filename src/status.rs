//! HTTP status codes the framework itself produces.
//!
//! ```rust
//! use trellis::{Response, Status};
//!
//! let res = Response::status(Status::NoContent);
//! assert_eq!(res.status_code(), 204);
//! ```

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Ok,                  // 200
    Created,             // 201
    NoContent,           // 204
    MovedPermanently,    // 301
    Found,               // 302
    BadRequest,          // 400
    NotFound,            // 404
    MethodNotAllowed,    // 405
    InternalServerError, // 500
    ServiceUnavailable,  // 503
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Self::Ok                  => 200,
            Self::Created             => 201,
            Self::NoContent           => 204,
            Self::MovedPermanently    => 301,
            Self::Found               => 302,
            Self::BadRequest          => 400,
            Self::NotFound            => 404,
            Self::MethodNotAllowed    => 405,
            Self::InternalServerError => 500,
            Self::ServiceUnavailable  => 503,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok                  => "OK",
            Self::Created             => "Created",
            Self::NoContent           => "No Content",
            Self::MovedPermanently    => "Moved Permanently",
            Self::Found               => "Found",
            Self::BadRequest          => "Bad Request",
            Self::NotFound            => "Not Found",
            Self::MethodNotAllowed    => "Method Not Allowed",
            Self::InternalServerError => "Internal Server Error",
            Self::ServiceUnavailable  => "Service Unavailable",
        }
    }
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        s.code()
    }
}
