use phf::phf_set;

/// Known throwaway-mail providers. Exact, case-sensitive membership only.
pub static DISPOSABLE_DOMAINS: phf::Set<&'static str> = phf_set! {
    "10minutemail.com",
    "tempmail.org",
    "guerrillamail.com",
    "mailinator.com",
    "yopmail.com",
    "temp-mail.org",
    "throwaway.email",
    "maildrop.cc",
    "getnada.com",
    "trashmail.com",
};

pub fn is_disposable(domain: &str) -> bool {
    DISPOSABLE_DOMAINS.contains(domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_provider_is_disposable() {
        assert!(is_disposable("mailinator.com"));
        assert!(is_disposable("maildrop.cc"));
    }

    #[test]
    fn membership_is_exact() {
        assert!(!is_disposable("gmail.com"));
        assert!(!is_disposable("Mailinator.com"));
        assert!(!is_disposable("sub.mailinator.com"));
    }
}
