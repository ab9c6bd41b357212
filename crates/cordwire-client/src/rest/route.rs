//! Rate-limit route keys.

use super::transport::Method;

/// Normalized route a quota record is stored under: the method plus the path
/// template, with the query dropped and numeric IDs replaced by `:id`.
///
/// `GET /channels/123/messages?limit=5` becomes `GET /channels/:id/messages`.
pub fn route_key(method: Method, path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let template: Vec<&str> = path
        .split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                ":id"
            } else {
                segment
            }
        })
        .collect();
    format!("{} {}", method, template.join("/"))
}
