use serde_json::{json, Value};

use crate::error::FinderError;

/// Builds a standardized error payload string for tool errors.
/// First line: short human-readable message.
/// Then a JSON object with fields: code, message, details.
pub fn build_error_payload(code: &str, message: &str, details: Value) -> String {
    let obj = json!({
        "code": code,
        "message": message,
        "details": details,
    });
    let mut out = String::new();
    out.push_str(message);
    out.push('\n');
    out.push_str(&obj.to_string());
    out
}

/// Payload for a `FinderError`, with its path (when known) and a hint.
pub fn finder_error_payload(err: &FinderError) -> String {
    let hint = match err {
        FinderError::MissingInput(_) => "Fill in the folder URL, the access token and the keyword.",
        FinderError::FolderAccess { .. } => {
            "Check that the access token is valid and the folder exists."
        }
        FinderError::Download { .. } => "The file may have been moved or deleted; try again.",
        FinderError::NotPdf { .. } | FinderError::Pdf { .. } => {
            "Try re-saving the PDF to simplify its structure."
        }
        _ => "Please try again later.",
    };

    let mut details = json!({ "hint": hint });
    if let Some(path) = err.path() {
        details["path"] = Value::String(path.to_string());
    }

    build_error_payload(err.code(), &err.to_string(), details)
}
