//! Domain services: one function per endpoint, one HTTP call each.

pub mod admin;
pub mod auth;
pub mod businesses;
pub mod chats;
pub mod posts;
pub mod reviews;

/// Percent-encode an id for use as a path segment.
pub(crate) fn seg(id: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(id)
}
