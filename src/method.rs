//! HTTP method as a typed enum.
//!
//! Only the methods a route table can register are modelled. Anything else
//! is refused by the server with `405 Method Not Allowed` before routing.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum Method {
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
}

impl Method {
    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete  => "DELETE",
            Self::Get     => "GET",
            Self::Head    => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch   => "PATCH",
            Self::Post    => "POST",
            Self::Put     => "PUT",
        }
    }
}

/// Parses a method name in any letter case (`"get"`, `"GET"`).
impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DELETE"  => Ok(Self::Delete),
            "GET"     => Ok(Self::Get),
            "HEAD"    => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "PATCH"   => Ok(Self::Patch),
            "POST"    => Ok(Self::Post),
            "PUT"     => Ok(Self::Put),
            _         => Err(Error::InvalidArgument(format!("unsupported HTTP method [{s}]"))),
        }
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = Error;

    fn try_from(m: &http::Method) -> Result<Self, Self::Error> {
        m.as_str().parse()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_any_case() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("Post".parse::<Method>().unwrap(), Method::Post);
        assert!("BREW".parse::<Method>().is_err());
    }

    #[test]
    fn converts_from_http() {
        assert_eq!(Method::try_from(&http::Method::PUT).unwrap(), Method::Put);
        assert!(Method::try_from(&http::Method::CONNECT).is_err());
    }
}
