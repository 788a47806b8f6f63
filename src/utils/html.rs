// src/utils/html.rs

/// Strips markup from user-supplied text (nicknames, titles, question text)
/// before it is stored and broadcast to every client in a room.
///
/// Whitelist-based: harmless formatting tags survive, `<script>` and its
/// content, event-handler attributes and the like are removed.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input.trim())
}

/// Cleans text and rejects it if nothing is left.
pub fn clean_required(field: &str, input: &str) -> Result<String, crate::error::AppError> {
    let cleaned = clean_html(input);
    if cleaned.trim().is_empty() {
        return Err(crate::error::AppError::BadRequest(format!(
            "{} must not be empty",
            field
        )));
    }
    Ok(cleaned)
}
