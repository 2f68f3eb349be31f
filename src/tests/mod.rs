// Copyright 2025 The pivmech Authors
// See LICENSE.txt file for terms

pub use crate::accumulator::*;
pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::hash::{self, HashSpec};
pub use crate::key::*;
pub use crate::padding::*;
pub use crate::pkcs11::*;
pub use crate::token::*;
pub use crate::Provider;

#[macro_use]
mod util;
pub use self::util::*;

mod token;
pub use self::token::*;

mod accumulator;
mod config;
mod ecc;
