//! Scannable ticket codes.
//!
//! A code is the current Unix time in nanoseconds followed by a random number
//! below 1000, all decimal digits. The store's unique index on `ticket.code`
//! is the final guard against collisions across processes.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

const MAX_LEN: usize = 32;

#[derive(Debug, Clone, Copy, Default)]
pub struct CodeGenerator;

impl CodeGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let suffix = rand::thread_rng().gen_range(0..1000);
        format!("{nanos}{suffix}")
    }

    /// `count` codes, pairwise distinct.
    pub fn generate_batch(&self, count: usize) -> Vec<String> {
        let mut seen = HashSet::with_capacity(count);
        let mut codes = Vec::with_capacity(count);
        while codes.len() < count {
            let code = self.generate();
            if seen.insert(code.clone()) {
                codes.push(code);
            }
        }
        codes
    }
}

/// Whether `code` could have been produced by [`CodeGenerator`].
pub fn is_well_formed(code: &str) -> bool {
    !code.is_empty() && code.len() <= MAX_LEN && code.bytes().all(|b| b.is_ascii_digit())
}
