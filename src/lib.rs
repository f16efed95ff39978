pub mod authn;
pub mod client;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod response;
pub mod router;
pub mod session;
pub mod token;

pub use authn::{Authenticator, LoginPair};
pub use client::{Client, PolicyMode};
pub use config::{AuthnType, Config};
pub use error::Error;
pub use token::AccessToken;
