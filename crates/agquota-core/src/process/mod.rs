//! Process introspection: find the language server, its token and its ports.

mod command;
pub mod locator;
pub mod platform;
pub mod ports;
pub mod token;

pub use locator::{ProcessLocator, ProcessStrategy};
pub use platform::Platform;
pub use ports::{PortScanner, PortStrategy};
pub use token::{find_token, mask_token, CommandLineStrategy, TokenExtractor};
