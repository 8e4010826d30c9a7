//! Address splitting and the cheap pre-network checks.
//!
//! [`split_address`] takes the rightmost `@` as separator, so
//! `a@b@example.com` yields the domain `example.com`. The domain has to match
//! `^[A-Za-z0-9.-]+\.[A-Za-z]{2,}$`. The local part is copied verbatim into
//! SMTP, IMAP and POP3 commands, so control characters, whitespace and angle
//! brackets are refused there.

mod disposable;
mod error;

pub use disposable::{DISPOSABLE_DOMAINS, is_disposable};
pub use error::AddressError;

use std::sync::LazyLock;

use regex::Regex;

static DOMAIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("static domain pattern compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressParts<'a> {
    pub local: &'a str,
    pub domain: &'a str,
}

pub fn split_address(address: &str) -> Result<AddressParts<'_>, AddressError> {
    let input = address.trim();
    let (local, domain) = input.rsplit_once('@').ok_or(AddressError::MissingAt)?;
    if local.is_empty() {
        return Err(AddressError::EmptyLocal);
    }
    if let Some(found) = local.chars().find(|&c| is_forbidden_in_local(c)) {
        return Err(AddressError::InvalidLocal { found });
    }
    if !DOMAIN_PATTERN.is_match(domain) {
        return Err(AddressError::invalid_domain(domain));
    }
    Ok(AddressParts { local, domain })
}

fn is_forbidden_in_local(c: char) -> bool {
    c.is_control() || c.is_whitespace() || matches!(c, '<' | '>')
}

pub fn extract_domain(address: &str) -> Result<&str, AddressError> {
    split_address(address).map(|parts| parts.domain)
}
