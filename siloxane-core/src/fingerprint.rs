use serde::Serialize;
use std::fmt;

mod sealed {
    pub trait Sealed {}

    impl Sealed for crate::descriptor::TypeDescriptor {}
    impl Sealed for crate::descriptor::Schema {}
    impl Sealed for crate::config::MarshalConfig {}
}

/// Values with a fingerprint. Implemented for types made only of strings,
/// sets, maps and enums, whose CBOR encoding cannot fail.
pub trait Fingerprinted: Serialize + fmt::Debug + sealed::Sealed {}

impl Fingerprinted for crate::descriptor::TypeDescriptor {}
impl Fingerprinted for crate::descriptor::Schema {}
impl Fingerprinted for crate::config::MarshalConfig {}

/// A 32-byte Blake3 hash identifying a schema or a configuration by content.
///
/// Computed over the CBOR encoding of the value, so two structurally equal
/// schemas share a fingerprint regardless of where they were built.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Computes the fingerprint of raw bytes.
    pub fn from_data(data: &[u8]) -> Self {
        Fingerprint(*blake3::hash(data).as_bytes())
    }

    /// Computes the fingerprint of a schema, descriptor or configuration.
    pub fn of<T: Fingerprinted>(value: &T) -> Self {
        let mut bytes = Vec::new();
        match ciborium::into_writer(value, &mut bytes) {
            Ok(()) => Self::from_data(&bytes),
            Err(_) => Self::from_debug(value),
        }
    }

    /// Hashes the debug rendering, in a domain separate from CBOR input.
    fn from_debug(value: &impl fmt::Debug) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"siloxane:debug:");
        hasher.update(format!("{value:?}").as_bytes());
        Fingerprint(*hasher.finalize().as_bytes())
    }

    /// Returns the fingerprint as a byte slice.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarshalConfig;
    use crate::descriptor::{Described, TypeDescriptor};

    #[test]
    fn fingerprint_deterministic() {
        let d1 = <Vec<f32>>::descriptor();
        let d2 = <Vec<f32>>::descriptor();
        assert_eq!(Fingerprint::of(&d1), Fingerprint::of(&d2));
    }

    #[test]
    fn fingerprint_differs_by_structure() {
        let d1 = <Vec<f32>>::descriptor();
        let d2 = <Vec<f64>>::descriptor();
        let d3 = TypeDescriptor::optional(<Vec<f32>>::descriptor());
        assert_ne!(Fingerprint::of(&d1), Fingerprint::of(&d2));
        assert_ne!(Fingerprint::of(&d1), Fingerprint::of(&d3));
    }

    #[test]
    fn debug_fallback_is_distinct() {
        let a = Fingerprint::from_debug(&<Vec<f32>>::descriptor());
        let b = Fingerprint::from_debug(&<Vec<f64>>::descriptor());
        assert_ne!(a, b);
        assert_ne!(a, Fingerprint::from_data(&[]));
        assert_ne!(a, Fingerprint::of(&<Vec<f32>>::descriptor()));
    }

    #[test]
    fn configs_are_fingerprinted_by_content() {
        let strict = MarshalConfig::new().strict(true);
        assert_eq!(Fingerprint::of(&strict), Fingerprint::of(&strict.clone()));
        assert_ne!(Fingerprint::of(&strict), Fingerprint::of(&MarshalConfig::new()));
    }

    #[test]
    fn fingerprint_display() {
        let f = Fingerprint::from_data(b"test");
        assert_eq!(format!("{}", f).len(), 64);
    }
}
