//! Base dispatch shared by every transform.

use crate::error::Result;
use crate::sample::Sample;
use std::time::Instant;

/// An operation on a [`Sample`].
///
/// Implementors provide [`apply_transform`](Transform::apply_transform);
/// callers go through [`call`](Transform::call), which adds timing logs for
/// verbose transforms.
pub trait Transform: Send + Sync {
    fn apply_transform(&self, sample: Sample) -> Result<Sample>;

    /// Whether to log the time spent in each call.
    fn is_verbose(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    fn call(&self, sample: Sample) -> Result<Sample> {
        if !self.is_verbose() {
            return self.apply_transform(sample);
        }
        log::info!("applying {}", self.name());
        let start = Instant::now();
        let result = self.apply_transform(sample);
        log::info!("{} took {:.3?}", self.name(), start.elapsed());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct Passthrough {
        verbose: bool,
    }

    impl Transform for Passthrough {
        fn apply_transform(&self, sample: Sample) -> Result<Sample> {
            Ok(sample)
        }

        fn is_verbose(&self) -> bool {
            self.verbose
        }
    }

    struct Failing;

    impl Transform for Failing {
        fn apply_transform(&self, _: Sample) -> Result<Sample> {
            Err(Error::InvalidArgument("boom".into()))
        }
    }

    #[test]
    fn test_name_is_short_type_name() {
        assert_eq!(Passthrough { verbose: false }.name(), "Passthrough");
    }

    #[test]
    fn test_call_delegates() {
        for verbose in [false, true] {
            let out = Passthrough { verbose }.call(Sample::new()).unwrap();
            assert!(out.is_empty());
        }
    }

    #[test]
    fn test_call_propagates_errors() {
        let err = Failing.call(Sample::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
