use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Platform-internal packages that are never on the library classpath
pub const KNOWN_UNRESOLVABLE_PREFIXES: &[&str] = &["sun/misc/", "jdk/internal/misc/"];

/// Diagnostics sink shared by all shrinker phases
///
/// Each distinct message is reported once. References into the
/// known-unresolvable packages and names matching a `-dontwarn` pattern are
/// counted as suppressed and only logged at debug level.
#[derive(Debug, Default)]
pub struct ShrinkerLogger {
    dont_warn: Vec<Regex>,
    warnings: AtomicUsize,
    suppressed: AtomicUsize,
    reported: Mutex<HashSet<String>>,
}

impl ShrinkerLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patterns matched against internal class names
    pub fn with_dont_warn(mut self, patterns: Vec<Regex>) -> Self {
        self.dont_warn = patterns;
        self
    }

    pub fn is_known_unresolvable(name: &str) -> bool {
        KNOWN_UNRESOLVABLE_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
    }

    fn is_suppressed(&self, class_name: &str) -> bool {
        Self::is_known_unresolvable(class_name)
            || self.dont_warn.iter().any(|p| p.is_match(class_name))
    }

    fn report(&self, subject: &str, message: String) {
        if !self.reported.lock().insert(message.clone()) {
            return;
        }
        if self.is_suppressed(subject) {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            debug!("{} (suppressed)", message);
        } else {
            self.warnings.fetch_add(1, Ordering::Relaxed);
            warn!("{}", message);
        }
    }

    pub fn invalid_class_reference(&self, from: &str, to: &str) {
        self.report(to, format!("{} references unknown class: {}", from, to));
    }

    pub fn invalid_member_reference(&self, from: &str, to: &str) {
        let owner = to.split('.').next().unwrap_or(to);
        self.report(owner, format!("{} references unknown class member: {}", from, to));
    }

    pub fn unresolvable_supertype(&self, class: &str, missing: &str) {
        self.report(
            missing,
            format!("{}: cannot resolve supertype {}", class, missing),
        );
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.load(Ordering::Relaxed)
    }

    pub fn suppressed_count(&self) -> usize {
        self.suppressed.load(Ordering::Relaxed)
    }
}
