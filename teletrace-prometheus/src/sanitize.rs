/// Returns a string usable as a Prometheus metric or label name: any
/// character outside `[A-Za-z0-9_]` becomes `_`, and a leading digit is
/// escaped with a `_` prefix.
pub(crate) fn sanitize<T: AsRef<str>>(raw: T) -> String {
    let escaped = raw
        .as_ref()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' });

    let prefix = if raw
        .as_ref()
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_digit())
    {
        "_"
    } else {
        ""
    };

    prefix.chars().chain(escaped).collect()
}
