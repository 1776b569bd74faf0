//! Guarded values
//!
//! Every resolved value lives inside a [`Guarded`] that remembers whether it
//! is sensitive. The payload sits in a [`SecretBox`], so it is zeroized on
//! drop. There is no `Display` impl and `Debug` prints the mask for
//! sensitive values, so the only ways to read the value are
//! [`Guarded::disclose`] (which masks sensitive values) and
//! [`ExposeSecret::expose_secret`] (which says what it does).

use secrecy::{ExposeSecret, SecretBox};
use std::fmt;
use zeroize::Zeroize;

/// A value tagged with its effective sensitivity
pub struct Guarded<T: Zeroize> {
    value: SecretBox<T>,
    sensitive: bool,
}

impl<T: Zeroize> Guarded<T> {
    /// Wrap a value with a sensitivity decision already made
    pub fn new(value: T, sensitive: bool) -> Self {
        Self {
            value: SecretBox::new(Box::new(value)),
            sensitive,
        }
    }

    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    /// Read the value for display: sensitive values come back as the mask
    pub fn disclose<'a>(&'a self, mask: &'a str) -> Disclosed<'a, T> {
        if self.sensitive {
            Disclosed::Masked(mask)
        } else {
            Disclosed::Plain(self.value.expose_secret())
        }
    }
}

/// Access the raw value regardless of sensitivity.
///
/// Only for handing values to a child process; never for output.
impl<T: Zeroize> ExposeSecret<T> for Guarded<T> {
    fn expose_secret(&self) -> &T {
        self.value.expose_secret()
    }
}

impl<T: Zeroize + Clone> Clone for Guarded<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.expose_secret().clone(), self.sensitive)
    }
}

impl<T: Zeroize + fmt::Debug> fmt::Debug for Guarded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sensitive {
            f.debug_tuple("Guarded").field(&"[REDACTED]").finish()
        } else {
            f.debug_tuple("Guarded")
                .field(self.value.expose_secret())
                .finish()
        }
    }
}

/// The outcome of a masking decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Disclosed<'a, T> {
    Masked(&'a str),
    Plain(&'a T),
}

impl<T> Disclosed<'_, T> {
    pub fn is_masked(&self) -> bool {
        matches!(self, Disclosed::Masked(_))
    }
}

impl<T: fmt::Display> fmt::Display for Disclosed<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disclosed::Masked(mask) => f.write_str(mask),
            Disclosed::Plain(value) => value.fmt(f),
        }
    }
}
