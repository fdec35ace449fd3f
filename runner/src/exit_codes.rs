//! Stable exit codes for `labrunner` commands.

/// Command succeeded; for `play`, the lab reached `#end`.
pub const OK: u8 = 0;
/// Invalid input: unreadable or schema-invalid lab, lint errors, bad script or config.
pub const INVALID: u8 = 1;
/// `labrunner play` ran every submission but the lab is not finished.
pub const INCOMPLETE: u8 = 2;
