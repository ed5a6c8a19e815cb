//! Driver module - browser session abstraction
//!
//! The collector never talks to a browser directly; it goes through the
//! [`BrowserSession`] trait so the WebDriver backend stays swappable and
//! tests can script page behavior in memory.

pub mod element;
pub mod session;
pub mod webdriver;

pub use element::ElementHandle;
pub use session::{BrowserSession, ElementRef, SessionFactory};
pub use webdriver::{WebDriverFactory, WebDriverSession};
