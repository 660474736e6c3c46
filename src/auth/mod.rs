//! Authentication for the welltick API
//!
//! - `jwt` - HS256 bearer tokens naming the user in `sub`
//! - `password` - argon2id hashing of account passwords

pub mod jwt;
pub mod password;

pub use jwt::{extract_token_from_header, Claims, JwtValidator};
pub use password::{hash_password, verify_password};
