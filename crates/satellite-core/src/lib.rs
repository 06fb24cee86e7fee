pub mod client;
pub mod constants;
pub mod error;
pub mod event;
pub mod genesis;
pub mod params;
pub mod types;
pub mod validator;

pub use client::*;
pub use constants::*;
pub use error::SatelliteError;
pub use event::Event;
pub use genesis::*;
pub use params::*;
pub use types::*;
pub use validator::*;
