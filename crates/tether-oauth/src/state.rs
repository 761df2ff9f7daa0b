//! CSRF state utilities for OAuth 2.0

use rand::{thread_rng, Rng};

/// Generate a random state string for CSRF protection
///
/// Creates a 32-character random string using URL-safe characters
/// (A-Z, a-z, 0-9). The state is stored with the flow before the surface
/// opens and verified when the provider callback arrives.
pub fn generate_state() -> String {
    let mut rng = thread_rng();
    (0..32)
        .map(|_| {
            let idx = rng.gen_range(0..62);
            match idx {
                0..=25 => (b'A' + idx) as char,
                26..=51 => (b'a' + (idx - 26)) as char,
                _ => (b'0' + (idx - 52)) as char,
            }
        })
        .collect()
}
