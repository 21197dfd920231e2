//! Built-in settings (lowest layer)

use relink_store::RecapturePolicy;
use serde_json::{json, Value};

/// Cache file used when neither config nor `--db` names one
pub const DEFAULT_DB: &str = "link.db";

/// Build attempts before the warming loop gives up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Values every other layer is merged over
pub fn builtin_layer() -> Value {
    json!({
        "db": DEFAULT_DB,
        "log_level": 0,
        "max_attempts": DEFAULT_MAX_ATTEMPTS,
        "recapture": RecapturePolicy::default().to_string(),
    })
}
