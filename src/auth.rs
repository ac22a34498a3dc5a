//! Signed session cookies.
//!
//! Login exchanges a password for a `token` cookie of the form
//! `<user>:<hex hmac-sha256(user, secret)>`. Verification recomputes the
//! tag, so sessions are stateless — no server-side session table. A
//! tampered or absent cookie simply downgrades the caller to anonymous;
//! routes decide what anonymous is allowed to see.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::AuthConfig;

type HmacSha256 = Hmac<Sha256>;

/// Cookie carrying the session token.
pub const TOKEN_COOKIE: &str = "token";

/// Check a login attempt. Returns the matched user name.
///
/// When `user` is omitted the password is checked against every
/// configured account, preserving the original single-password login
/// form.
pub fn check_password<'a>(
    config: &'a AuthConfig,
    user: Option<&str>,
    password: &str,
) -> Option<&'a str> {
    config
        .users
        .iter()
        .find(|u| user.map_or(true, |name| name == u.name) && u.password == password)
        .map(|u| u.name.as_str())
}

/// Mint a signed token for a user.
pub fn mint_token(user: &str, secret: &str) -> String {
    format!("{}:{}", user, sign(user, secret))
}

/// Verify a token and extract its user name. `None` on any mismatch.
pub fn verify_token(token: &str, secret: &str) -> Option<String> {
    if secret.is_empty() {
        return None;
    }
    let (user, tag) = token.split_once(':')?;
    let tag = hex::decode(tag).ok()?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(user.as_bytes());
    mac.verify_slice(&tag).ok()?;
    Some(user.to_string())
}

/// Pull the session user out of a raw `Cookie` request header.
pub fn user_from_cookie_header(header: &str, secret: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .and_then(|(_, value)| verify_token(value, secret))
}

fn sign(user: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(user.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
