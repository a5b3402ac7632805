//! # Herald CLI
//!
//! Building blocks of the `herald` binary, exposed for tests.

pub mod app;
pub mod credentials;
pub mod loopback;
pub mod menu;
pub mod recipients;

pub use app::{App, SendOptions};
pub use credentials::{load_credentials, parse_credentials};
pub use loopback::LoopbackConnector;
pub use menu::Menu;
pub use recipients::RecipientStore;
