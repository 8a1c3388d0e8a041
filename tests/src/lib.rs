// This is a meta-package for organizing the test structure
// of the Conductor project.

// Conductor Tests
//
// The scenario suites live in `integrations/`; enable the `integrations`
// feature to pull them in from here.

/// Re-export test modules for easier access
pub mod tests {
    #[cfg(feature = "integrations")]
    pub use conductor_integration_tests as integrations;
}

// This package exists primarily for organizational purposes
#[cfg(test)]
mod test {
    #[test]
    fn meta_package_builds() {
        let name = env!("CARGO_PKG_NAME");
        assert_eq!(name, "conductor-tests");
    }
}
