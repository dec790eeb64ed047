// Linkshelf services
// Stateless or self-contained functionality: URL normalization, search, tags,
// share tokens, page metadata, crypto and settings.

pub mod crypto_service;
pub mod page_metadata;
pub mod search;
pub mod settings_engine;
pub mod share_service;
pub mod tags;
pub mod url_guard;
