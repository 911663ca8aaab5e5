use std::collections::BTreeSet;

/// Membership oracle consulted before admitting a DNS record.
///
/// The monitor treats this as an external collaborator: any implementation
/// works, and running without one admits every domain.
pub trait DomainOracle {
    fn is_whitelisted(&self, name: &str) -> bool;
}

/// Domain list loaded from newline-separated text.
///
/// A name is whitelisted when it equals a listed domain or is a subdomain
/// of one; suffix matching stops at label boundaries, so `www.foo.com`
/// matches `foo.com` but `foobar.org` does not match `bar.org`.
///
/// # Examples
/// ```
/// use passivetap_core::whitelist::{DomainOracle, DomainWhitelist};
///
/// let whitelist = DomainWhitelist::parse("foo.com\nbar.org");
/// assert!(whitelist.is_whitelisted("mail.foo.com"));
/// assert!(!whitelist.is_whitelisted("foobar.org"));
/// ```
#[derive(Debug, Default, Clone)]
pub struct DomainWhitelist {
    domains: BTreeSet<String>,
}

impl DomainWhitelist {
    pub fn parse(contents: &str) -> Self {
        let domains = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();
        Self { domains }
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

impl DomainOracle for DomainWhitelist {
    fn is_whitelisted(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let name = name.to_ascii_lowercase();
        let mut suffix = name.as_str();
        loop {
            if self.domains.contains(suffix) {
                return true;
            }
            match suffix.find('.') {
                Some(dot) => suffix = &suffix[dot + 1..],
                None => return false,
            }
        }
    }
}
