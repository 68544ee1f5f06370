//! Panic-injection hooks (feature: `failpoints`).
//!
//! The macro expands to nothing unless the feature is enabled. When enabled,
//! a point panics only while its name is armed, so unrelated code sharing the
//! process is unaffected.

#[cfg(feature = "failpoints")]
mod registry {
    use std::collections::HashSet;

    use once_cell::sync::Lazy;
    use parking_lot::Mutex;

    static ARMED: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

    pub fn arm(name: &str) {
        ARMED.lock().insert(name.to_string());
    }

    pub fn disarm(name: &str) {
        ARMED.lock().remove(name);
    }

    pub fn is_armed(name: &str) -> bool {
        ARMED.lock().contains(name)
    }
}

#[cfg(feature = "failpoints")]
pub use registry::{arm, disarm, is_armed};

#[cfg(feature = "failpoints")]
#[macro_export]
macro_rules! fail_point {
    ($name:expr) => {{
        if $crate::failpoints::is_armed($name) {
            panic!("failpoint triggered: {}", $name);
        }
    }};
}

#[cfg(not(feature = "failpoints"))]
#[macro_export]
macro_rules! fail_point {
    ($name:expr) => {
        // no-op
        let _ = $name;
    };
}
