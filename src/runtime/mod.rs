//! Cooperative scheduling substrate
//!
//! An [`Application`] is one operating mode: a list of components ticked in
//! turn on a single thread. The [`AppRotator`] owns the running application and
//! replaces it wholesale when it fails, which is how a hard link timeout tears
//! down and rebuilds the connectivity stack.

pub mod application;
pub mod component;
pub mod rotator;

pub use application::Application;
pub use component::{Component, ComponentState};
pub use rotator::{AppFactory, AppRotator};
