//! Password verification and host cloaking.

mod cloak;
mod password;

pub use cloak::cloak_hostname;
pub use password::{decode_password, generate_password, verify_password};
