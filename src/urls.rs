//! URL helpers

use url::Url;

/// First value of query parameter `name`, `None` if absent or `url` is malformed
///
/// ```
/// # use utilkit::urls::get_param;
/// assert_eq!(get_param("https://x.io/p?a=1&b=two", "b").as_deref(), Some("two"));
/// ```
pub fn get_param(url: &str, name: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
