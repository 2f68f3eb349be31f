// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

use std::error;
use std::fmt;

use crate::pkcs11::*;
use crate::token::TokenError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    origin: Option<Box<dyn error::Error + Send + Sync>>,
    errmsg: Option<String>,
    ckrv: CK_RV,
    reqlen: Option<usize>,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[non_exhaustive]
pub enum ErrorKind {
    /* A Cryptoki-style error, see ckrv Error field */
    CkError,
    /* A lookup failed, see errmsg */
    NotFound,
    /* Other error, see origin */
    Nested,
}

impl Error {
    pub fn ck_rv(ckrv: CK_RV) -> Error {
        Error {
            kind: ErrorKind::CkError,
            origin: None,
            errmsg: None,
            ckrv,
            reqlen: None,
        }
    }

    pub fn ck_rv_from_error<E>(ckrv: CK_RV, error: E) -> Error
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Error {
            kind: ErrorKind::CkError,
            origin: Some(error.into()),
            errmsg: None,
            ckrv,
            reqlen: None,
        }
    }

    pub fn ck_rv_with_errmsg(ckrv: CK_RV, errmsg: String) -> Error {
        Error {
            kind: ErrorKind::CkError,
            origin: None,
            errmsg: Some(errmsg),
            ckrv,
            reqlen: None,
        }
    }

    pub fn not_found(errmsg: String) -> Error {
        Error {
            kind: ErrorKind::NotFound,
            origin: None,
            errmsg: Some(errmsg),
            ckrv: CKR_GENERAL_ERROR,
            reqlen: None,
        }
    }

    pub fn other_error<E>(error: E) -> Error
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Error {
            kind: ErrorKind::Nested,
            origin: Some(error.into()),
            errmsg: None,
            ckrv: CKR_GENERAL_ERROR,
            reqlen: None,
        }
    }

    /// The caller buffer cannot hold `reqlen` bytes of output
    pub fn buf_too_small(reqlen: usize) -> Error {
        Error {
            kind: ErrorKind::CkError,
            origin: None,
            errmsg: None,
            ckrv: CKR_BUFFER_TOO_SMALL,
            reqlen: Some(reqlen),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn rv(&self) -> CK_RV {
        self.ckrv
    }

    /// Length the caller must provide, set only for CKR_BUFFER_TOO_SMALL
    pub fn required_len(&self) -> Option<usize> {
        self.reqlen
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            ErrorKind::CkError => {
                if let Some(ref e) = self.errmsg {
                    write!(f, "{}", e)
                } else if let Some(len) = self.reqlen {
                    write!(f, "CKR_BUFFER_TOO_SMALL: {} bytes required", len)
                } else {
                    write!(f, "CK_RV {:#x}", self.ckrv)
                }
            }
            ErrorKind::NotFound => match self.errmsg {
                Some(ref e) => write!(f, "not found: {}", e),
                None => write!(f, "not found"),
            },
            ErrorKind::Nested => match self.origin {
                Some(ref e) => e.fmt(f),
                None => write!(f, "CK_RV {:#x}", self.ckrv),
            },
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.origin {
            Some(ref e) => Some(e.as_ref()),
            None => None,
        }
    }
}

impl From<CK_RV> for Error {
    fn from(ckrv: CK_RV) -> Error {
        Error::ck_rv(ckrv)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Error {
        Error::other_error(error)
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(error: std::num::TryFromIntError) -> Error {
        Error::ck_rv_from_error(CKR_GENERAL_ERROR, error)
    }
}

impl From<openssl::error::ErrorStack> for Error {
    fn from(error: openssl::error::ErrorStack) -> Error {
        Error::ck_rv_from_error(CKR_FUNCTION_FAILED, error)
    }
}

impl From<TokenError> for Error {
    fn from(error: TokenError) -> Error {
        let ckrv = match error {
            TokenError::AuthenticationRequired => CKR_USER_NOT_LOGGED_IN,
            TokenError::Device(_) => CKR_DEVICE_ERROR,
        };
        Error::ck_rv_from_error(ckrv, error)
    }
}

/// Maps an error from an external library to a Cryptoki error code
#[macro_export]
macro_rules! map_err {
    ($map:expr, $err:tt) => {{
        $map.map_err(|e| $crate::error::Error::ck_rv_from_error($err, e))
    }};
}
