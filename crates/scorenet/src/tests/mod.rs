//! End-to-end tests driving whole networks through the session layer.

mod joins;
mod lifecycle;
mod support;
