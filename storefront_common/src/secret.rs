use std::{
    fmt,
    fmt::{Debug, Display},
};

/// Wraps configuration values (API keys, signing secrets) so that they never end up in logs by accident.
#[derive(Clone, Default)]
pub struct Secret<T>
where T: Clone + Default
{
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn reveal(&self) -> &T {
        &self.value
    }
}

impl<T: Clone + Default + AsRef<[u8]>> Secret<T> {
    pub fn is_empty(&self) -> bool {
        self.value.as_ref().is_empty()
    }

    /// Compares the secret against a candidate value without short-circuiting on the first differing byte.
    /// An empty secret never matches.
    pub fn matches(&self, candidate: &[u8]) -> bool {
        let value = self.value.as_ref();
        if value.is_empty() || value.len() != candidate.len() {
            return false;
        }
        value.iter().zip(candidate).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
    }
}

impl<T: Clone + Default> Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<T: Clone + Default> Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}
