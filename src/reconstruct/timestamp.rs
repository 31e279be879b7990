use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// Turns `2022-09-16T19:20:04.702Z` into `19:20 16/09/22`.
///
/// Only years 2000-2099 are recognised. Anything else comes back unchanged.
pub fn display_timestamp(raw: &str) -> Cow<'_, str> {
    static ISO_UTC: Lazy<Regex> = Lazy::new(|| {
        RegexBuilder::new(r"^20(\d{2})-(\d{2})-(\d{2})T(.+):.+Z")
            .case_insensitive(true)
            .build()
            .expect("valid timestamp pattern")
    });
    ISO_UTC.replace(raw, "$4 $3/$2/$1")
}
