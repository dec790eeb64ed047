// Linkshelf state managers
// Managers own mutable state: the local mirror of an owner's data and the signed-in session.

pub mod mirror;
pub mod session_manager;
