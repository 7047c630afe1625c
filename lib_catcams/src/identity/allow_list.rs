//! Email allow-list matching.

/// Returns true when `email` may enter.
///
/// An empty list is open access. Otherwise the email must equal an entry
/// exactly, or end with an entry that starts with `@`.
pub fn is_allowed<S: AsRef<str>>(email: &str, allow_list: &[S]) -> bool {
    if allow_list.is_empty() {
        return true;
    }

    allow_list.iter().any(|allowed| {
        let allowed = allowed.as_ref();
        if allowed.starts_with('@') {
            email.ends_with(allowed)
        } else {
            email == allowed
        }
    })
}
